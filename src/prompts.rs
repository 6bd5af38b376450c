//! Prompt templates for the research workflow steps.
//!
//! Each step sends exactly one prompt. The router and analyze prompts
//! constrain the answer to the tokens understood by [`crate::decode`].

use chrono::Utc;

use crate::state::{Decision, ToolChoice};

/// Prompt templates for the research workflow
pub struct ResearchPrompts;

impl ResearchPrompts {
    /// Get the current date formatted for prompts
    fn current_date() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    /// Planner: split the topic into `count` subtopics, one per line.
    pub fn planner(topic: &str, count: usize) -> String {
        format!(
            r#"For context, today's date is {date}.

You are planning a research project on the topic: "{topic}".

Break the topic down into exactly {count} focused subtopics that together cover it well.
Each subtopic must be a short, self-contained search phrase.

Respond with the {count} subtopics only, one per line, with no numbering, bullets or extra text."#,
            date = Self::current_date(),
        )
    }

    /// Router: pick one of the two search capabilities for the query.
    pub fn router(query: &str) -> String {
        format!(
            r#"You must choose the best search tool for the following research query:
"{query}"

Available tools:
- {web}: general web search for news, overviews, industry, policy and practical information
- {paper}: academic paper search (arXiv) for scientific research, methods and technical results

Respond with only the tool name: either {web} or {paper}."#,
            web = ToolChoice::WebSearch.as_str(),
            paper = ToolChoice::PaperSearch.as_str(),
        )
    }

    /// Analyze: is the evidence sufficient for a report section?
    pub fn analyze(
        topic: &str,
        query: &str,
        search_results: &str,
        remaining_subtopics: usize,
    ) -> String {
        format!(
            r#"You are reviewing search results gathered for the research topic "{topic}".
The current search query was: "{query}"
Subtopics still to research after this one: {remaining_subtopics}

Search results:
{search_results}

Is this information sufficient to write a solid section of the report for this query?
Respond only with '{cont}' if it is sufficient, or '{rewrite}' if the search must be redone with a new focus."#,
            cont = Decision::Continue.as_str(),
            rewrite = Decision::Rewrite.as_str(),
        )
    }

    /// Refine: produce a better query after insufficient results.
    pub fn refine_query(
        topic: &str,
        query: &str,
        previous_results: &str,
        tool: Option<ToolChoice>,
        max_chars: usize,
    ) -> String {
        let tool_hint = match tool {
            Some(ToolChoice::PaperSearch) => format!(
                "\nThe query will be sent to {}. Write a short boolean keyword query suited to an academic search engine, for example: battery AND (recycling OR recovery).",
                ToolChoice::PaperSearch.as_str()
            ),
            _ => String::new(),
        };

        format!(
            r#"The search query "{query}" for the research topic "{topic}" did not return sufficient information.

Previous results:
{previous_results}

Work out why these results were insufficient and write a new, more specific search query that will find better information.{tool_hint}
The query must be at most {max_chars} characters.
Respond with the new query only."#
        )
    }

    /// Write: synthesize the final report from all accepted evidence.
    pub fn write(topic: &str, evidence: &str) -> String {
        format!(
            r#"For context, today's date is {date}.

Using the research material below about "{topic}", write a concise, well-structured report.

Research material:
{evidence}

Report guidelines:
- Start with a short overview of the topic
- Use clear section headings (## for sections)
- Combine the material into one coherent narrative rather than listing results
- Cite source URLs inline where the material provides them
- End with a ### Sources section listing the URLs used"#,
            date = Self::current_date(),
        )
    }
}
