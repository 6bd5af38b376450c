//! Strict decoding of free-text model output
//!
//! Model responses that drive control flow are decoded against an explicit
//! table of `{token -> value}` entries plus a default. The result records
//! whether a token actually matched, so a fallback is always visible to the
//! caller instead of being an implicit string-matching accident.

use serde::Serialize;

use crate::state::{Decision, ToolChoice};

/// How a [`TokenDecoder`] picks between several matching tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// The first table entry contained in the text wins
    Priority,
    /// The entry whose token appears earliest in the text wins; ties go to
    /// table order
    EarliestOccurrence,
}

/// Outcome of decoding one model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decoded<T> {
    /// The decoded value (the table default when nothing matched)
    pub value: T,
    /// Whether a table token matched
    pub matched: bool,
    /// The normalized text that was decoded
    pub raw: String,
}

impl<T> Decoded<T> {
    pub fn is_fallback(&self) -> bool {
        !self.matched
    }
}

/// Table-driven decoder for a closed set of values.
#[derive(Debug, Clone)]
pub struct TokenDecoder<T: Copy + 'static> {
    table: &'static [(&'static str, T)],
    default: T,
    strategy: MatchStrategy,
}

impl<T: Copy + 'static> TokenDecoder<T> {
    pub const fn new(
        table: &'static [(&'static str, T)],
        default: T,
        strategy: MatchStrategy,
    ) -> Self {
        Self {
            table,
            default,
            strategy,
        }
    }

    /// Decode a response. Matching is case-insensitive on the trimmed text.
    pub fn decode(&self, text: &str) -> Decoded<T> {
        let raw = text.trim().to_lowercase();

        let hit = match self.strategy {
            MatchStrategy::Priority => self
                .table
                .iter()
                .find(|(token, _)| raw.contains(token))
                .map(|(_, value)| *value),
            MatchStrategy::EarliestOccurrence => self
                .table
                .iter()
                .enumerate()
                .filter_map(|(order, (token, value))| {
                    raw.find(token).map(|pos| (pos, order, *value))
                })
                .min_by_key(|(pos, order, _)| (*pos, *order))
                .map(|(_, _, value)| value),
        };

        match hit {
            Some(value) => Decoded {
                value,
                matched: true,
                raw,
            },
            None => Decoded {
                value: self.default,
                matched: false,
                raw,
            },
        }
    }
}

const TOOL_TABLE: &[(&str, ToolChoice)] = &[
    ("arxiv_search", ToolChoice::PaperSearch),
    ("paper_search", ToolChoice::PaperSearch),
    ("web_search", ToolChoice::WebSearch),
    ("tavily_search", ToolChoice::WebSearch),
];

const DECISION_TABLE: &[(&str, Decision)] = &[
    ("continue", Decision::Continue),
    ("rewrite", Decision::Rewrite),
];

/// Router decoder: first capability name mentioned wins, web search otherwise.
pub const TOOL_DECODER: TokenDecoder<ToolChoice> =
    TokenDecoder::new(TOOL_TABLE, ToolChoice::WebSearch, MatchStrategy::EarliestOccurrence);

/// Analyze decoder: any mention of "continue" wins, rewrite otherwise.
pub const DECISION_DECODER: TokenDecoder<Decision> =
    TokenDecoder::new(DECISION_TABLE, Decision::Rewrite, MatchStrategy::Priority);

pub fn decode_tool_choice(text: &str) -> Decoded<ToolChoice> {
    TOOL_DECODER.decode(text)
}

pub fn decode_decision(text: &str) -> Decoded<Decision> {
    DECISION_DECODER.decode(text)
}
