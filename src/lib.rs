//! # research-graph
//!
//! An autonomous research assistant. Given a topic, it plans subtopics, picks
//! between web search and arXiv paper search for each one, judges whether the
//! evidence is sufficient, refines queries when it is not, and finally writes
//! a report from everything it accepted.
//!
//! The control flow is a small directed graph ([`graph::Step`]) executed by the
//! [`Orchestrator`]. Each step returns a partial [`ResearchUpdate`] and the
//! transition to follow; the orchestrator merges the update and streams one
//! [`RunEvent`] per step, then a final `Completed` event with the report.
//!
//! Capabilities are supplied by the caller through two traits:
//! - [`LanguageModel`]: `complete(prompt) -> text` ([`OllamaModel`] via rig-core)
//! - [`SearchTool`]: `search(query) -> payload` ([`WebSearchTool`], [`ArxivSearchTool`])
//!
//! ## Quick Start
//! ```rust,ignore
//! use std::sync::Arc;
//! use research_graph::{ArxivSearchTool, Config, OllamaModel, Orchestrator, WebSearchTool};
//!
//! let config = Config::from_env()?;
//! let orchestrator = Orchestrator::builder()
//!     .model(Arc::new(OllamaModel::from_config(&config)?))
//!     .web_search(Arc::new(WebSearchTool::new(config.max_search_results)?))
//!     .paper_search(Arc::new(ArxivSearchTool::new(config.max_search_results)?))
//!     .config(config.workflow.clone())
//!     .build()?;
//!
//! let outcome = orchestrator.run("battery recycling").finish().await?;
//! println!("{}", outcome.report);
//! ```

pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod graph;
pub mod llm;
pub mod policy;
pub mod prompts;
pub mod retry;
pub mod state;
pub mod steps;
pub mod tools;

pub use config::{Config, WorkflowConfig};
pub use engine::{
    Orchestrator, OrchestratorBuilder, ResearchOutcome, ResearchRun, RunEvent, StepObservation,
};
pub use error::{ResearchError, RunError};
pub use graph::{Step, Transition};
pub use llm::{LanguageModel, LlmError, OllamaModel};
pub use retry::RetryPolicy;
pub use state::{Decision, ResearchState, ResearchUpdate, ToolChoice};
pub use steps::Fallback;
pub use tools::{ArxivSearchTool, SearchError, SearchTool, WebSearchTool};
