//! Research workflow state
//!
//! [`ResearchState`] is the single record threaded through every step of a
//! research run. Steps never mutate it directly: each one returns a
//! [`ResearchUpdate`] and the orchestrator applies it with
//! [`ResearchState::apply_update`], which produces the next state.
//!
//! The update vocabulary is deliberately narrow so the state invariants hold
//! by construction:
//! - `topic` has no update field at all
//! - subtopics can be replaced (planning) or popped from the front, never edited
//! - evidence can only be appended to `report_content`
//! - `report` is written once and ignored afterwards

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::warn;

// =============================================================================
// TOOL CHOICE
// =============================================================================
/// The search capability selected by the router step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// General web search
    WebSearch,
    /// Academic paper search (arXiv)
    PaperSearch,
}

impl ToolChoice {
    /// Capability name as presented to the language model.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolChoice::WebSearch => "web_search",
            ToolChoice::PaperSearch => "arxiv_search",
        }
    }
}

impl fmt::Display for ToolChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// DECISION
// =============================================================================
/// Verdict of the analyze step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Evidence is sufficient; move to the next subtopic
    Continue,
    /// Evidence is insufficient; refine the query and search again
    Rewrite,
    /// No subtopics remain; synthesize the report
    Write,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Continue => "continue",
            Decision::Rewrite => "rewrite",
            Decision::Write => "write",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// RESEARCH STATE
// =============================================================================
/// State of one research run.
///
/// Created once per run by [`ResearchState::new`], owned exclusively by the
/// orchestrator for the lifetime of that run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchState {
    pub(crate) topic: String,
    pub(crate) subtopics: VecDeque<String>,
    pub(crate) current_query: String,
    pub(crate) tool_choice: Option<ToolChoice>,
    pub(crate) search_results: String,
    pub(crate) report_content: String,
    pub(crate) decision: Option<Decision>,
    pub(crate) retries: u32,
    pub(crate) report: String,
}

impl ResearchState {
    /// Create the initial state for a topic with every accumulator empty.
    ///
    /// The active query starts out as the topic itself until the planner
    /// replaces it with the first subtopic.
    pub fn new(topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self {
            current_query: topic.clone(),
            topic,
            ..Default::default()
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Remaining subtopics, front first.
    pub fn subtopics(&self) -> &VecDeque<String> {
        &self.subtopics
    }

    pub fn current_query(&self) -> &str {
        &self.current_query
    }

    pub fn tool_choice(&self) -> Option<ToolChoice> {
        self.tool_choice
    }

    /// Raw payload of the most recent search call.
    pub fn search_results(&self) -> &str {
        &self.search_results
    }

    /// Evidence accepted so far, in acceptance order.
    pub fn report_content(&self) -> &str {
        &self.report_content
    }

    pub fn decision(&self) -> Option<Decision> {
        self.decision
    }

    /// Search attempts spent on the active subtopic.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// The final report; empty until the write step has run.
    pub fn report(&self) -> &str {
        &self.report
    }

    /// Whether the terminal write step has produced the report.
    pub fn is_complete(&self) -> bool {
        !self.report.is_empty()
    }

    /// Apply an update to produce the next state.
    ///
    /// This is a pure function; `self` is left untouched.
    pub fn apply_update(&self, update: ResearchUpdate) -> Self {
        let mut next = self.clone();

        if let Some(subtopics) = update.subtopics {
            next.subtopics = subtopics.into_iter().collect();
        }
        if update.advance_subtopic {
            next.subtopics.pop_front();
        }
        if let Some(query) = update.current_query {
            next.current_query = query;
        }
        if let Some(choice) = update.tool_choice {
            next.tool_choice = Some(choice);
        }
        if let Some(results) = update.search_results {
            next.search_results = results;
        }
        if let Some(evidence) = update.append_evidence {
            next.report_content.push_str(&evidence);
        }
        if let Some(decision) = update.decision {
            next.decision = Some(decision);
        }
        if let Some(retries) = update.retries {
            next.retries = retries;
        }
        if let Some(report) = update.report {
            if next.report.is_empty() {
                next.report = report;
            } else {
                warn!(
                    topic = %next.topic,
                    "Ignoring second report write; report is immutable once set"
                );
            }
        }

        next
    }
}

// =============================================================================
// RESEARCH UPDATE
// =============================================================================
/// Partial state update returned by a step.
///
/// Every field is optional; `None`/`false` leaves the state untouched. This
/// is also the payload emitted to observers for each completed step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchUpdate {
    /// Replace the subtopic list (planning)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtopics: Option<Vec<String>>,

    /// Pop the front subtopic (acceptance)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub advance_subtopic: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_query: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_results: Option<String>,

    /// Text appended to the evidence accumulator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append_evidence: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
}

impl ResearchUpdate {
    /// Create an empty (no-op) update
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if this update has no effect
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_subtopics(mut self, subtopics: Vec<String>) -> Self {
        self.subtopics = Some(subtopics);
        self
    }

    pub fn with_advance_subtopic(mut self) -> Self {
        self.advance_subtopic = true;
        self
    }

    pub fn with_current_query(mut self, query: impl Into<String>) -> Self {
        self.current_query = Some(query.into());
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn with_search_results(mut self, results: impl Into<String>) -> Self {
        self.search_results = Some(results.into());
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.append_evidence = Some(evidence.into());
        self
    }

    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_report(mut self, report: impl Into<String>) -> Self {
        self.report = Some(report.into());
        self
    }
}
