//! The research workflow graph.
//!
//! ```text
//!   planner ──▶ router ──┬──▶ web_search ───┐
//!                 ▲      └──▶ arxiv_search ─┤
//!                 │                         ▼
//!                 │ continue            analyze ──write──▶ write ──▶ END
//!                 ├────────────────────────┤
//!                 │                        │ rewrite
//!                 └──── refine_query ◀─────┘
//! ```
//!
//! Steps are a closed enum and every edge is declared in [`Step::successors`],
//! so a step can only hand control to a target the graph allows.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

use crate::state::ToolChoice;

/// Sentinel name for the end of the graph.
pub const END: &str = "END";

/// A named step of the research workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Planner,
    Router,
    WebSearch,
    #[serde(rename = "arxiv_search")]
    PaperSearch,
    Analyze,
    RefineQuery,
    Write,
}

impl Step {
    /// Entry point of every run.
    pub const ENTRY: Step = Step::Planner;

    pub const ALL: [Step; 7] = [
        Step::Planner,
        Step::Router,
        Step::WebSearch,
        Step::PaperSearch,
        Step::Analyze,
        Step::RefineQuery,
        Step::Write,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Planner => "planner",
            Step::Router => "router",
            Step::WebSearch => "web_search",
            Step::PaperSearch => "arxiv_search",
            Step::Analyze => "analyze",
            Step::RefineQuery => "refine_query",
            Step::Write => "write",
        }
    }

    /// Human readable progress description.
    pub fn description(&self) -> &'static str {
        match self {
            Step::Planner => "Planning research subtopics",
            Step::Router => "Choosing the best search tool",
            Step::WebSearch => "Searching the web",
            Step::PaperSearch => "Searching arXiv",
            Step::Analyze => "Analyzing search results",
            Step::RefineQuery => "Refining the query",
            Step::Write => "Writing the report",
        }
    }

    /// The search step that runs a given tool.
    pub fn search_for(choice: ToolChoice) -> Step {
        match choice {
            ToolChoice::WebSearch => Step::WebSearch,
            ToolChoice::PaperSearch => Step::PaperSearch,
        }
    }

    /// Labeled outgoing edges of this step.
    pub fn successors(&self) -> &'static [(Transition, &'static str)] {
        match self {
            Step::Planner => &[(Transition::To(Step::Router), "")],
            Step::Router => &[
                (Transition::To(Step::WebSearch), "web_search"),
                (Transition::To(Step::PaperSearch), "arxiv_search"),
            ],
            Step::WebSearch | Step::PaperSearch => &[(Transition::To(Step::Analyze), "")],
            Step::Analyze => &[
                (Transition::To(Step::Router), "continue"),
                (Transition::To(Step::RefineQuery), "rewrite"),
                (Transition::To(Step::Write), "write"),
            ],
            Step::RefineQuery => &[(Transition::To(Step::Router), "")],
            Step::Write => &[(Transition::End, "")],
        }
    }

    /// Whether the graph has an edge from this step along `transition`.
    pub fn allows(&self, transition: Transition) -> bool {
        self.successors().iter().any(|(t, _)| *t == transition)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where control goes after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    To(Step),
    End,
}

impl Transition {
    pub fn target(&self) -> Option<Step> {
        match self {
            Transition::To(step) => Some(*step),
            Transition::End => None,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::To(step) => fmt::Display::fmt(step, f),
            Transition::End => f.write_str(END),
        }
    }
}

/// Render the workflow graph as a Mermaid flowchart.
pub fn to_mermaid() -> String {
    let mut output = String::new();
    writeln!(output, "graph TD").ok();
    writeln!(output, "    {}([{}])", Step::ENTRY, Step::ENTRY).ok();
    for step in Step::ALL.iter().skip(1) {
        writeln!(output, "    {}[{}]", step, step).ok();
    }
    writeln!(output, "    {}([{}])", END, END).ok();
    writeln!(output).ok();

    for step in Step::ALL {
        for (transition, label) in step.successors() {
            if label.is_empty() {
                writeln!(output, "    {} --> {}", step, transition).ok();
            } else {
                writeln!(output, "    {} -->|{}| {}", step, label, transition).ok();
            }
        }
    }

    output
}
