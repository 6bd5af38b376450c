//! Error types for research runs
//!
//! [`ResearchError`] classifies everything that can go wrong inside a step;
//! [`RunError`] is the single run-level failure handed to the caller, carrying
//! the topic, the failing step and the last known state.

use std::time::Duration;
use thiserror::Error;

use crate::graph::Step;
use crate::llm::LlmError;
use crate::state::ResearchState;
use crate::tools::SearchError;

/// Errors that can occur while executing a research run
#[derive(Debug, Error)]
pub enum ResearchError {
    /// Missing capability or invalid configuration; raised before any run starts
    #[error("Configuration error: {0}")]
    Config(String),

    /// The language model call failed
    #[error("Language model error: {0}")]
    Model(#[from] LlmError),

    /// A search tool call failed
    #[error("Search tool error: {0}")]
    Tool(#[from] SearchError),

    /// An external call did not finish within the per-call timeout
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    /// Transient failures persisted through every allowed attempt
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: usize,
        #[source]
        last: Box<ResearchError>,
    },

    /// Model output matched no expected token and strict decoding is enabled
    #[error("Unparseable {context} output: {raw:?}")]
    UnparseableOutput { context: String, raw: String },

    /// The global step ceiling was reached without finishing
    #[error("Step limit exceeded: {limit} steps executed without reaching the report")]
    StepLimitExceeded { limit: usize },

    /// The caller abandoned the run
    #[error("Research run cancelled")]
    Cancelled,
}

impl ResearchError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Create an unparseable output error
    pub fn unparseable(context: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::UnparseableOutput {
            context: context.into(),
            raw: raw.into(),
        }
    }

    /// Check if the error is transient and worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ResearchError::Timeout { .. } => true,
            ResearchError::Model(e) => e.is_retryable(),
            ResearchError::Tool(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Check if the run failed for lack of progress rather than an external failure
    pub fn is_runaway(&self) -> bool {
        matches!(self, ResearchError::StepLimitExceeded { .. })
    }

    /// Check if the error came from a model or tool call
    pub fn is_external(&self) -> bool {
        match self {
            ResearchError::Model(_)
            | ResearchError::Tool(_)
            | ResearchError::Timeout { .. } => true,
            ResearchError::RetriesExhausted { last, .. } => last.is_external(),
            _ => false,
        }
    }
}

/// A failed research run.
#[derive(Debug, Error)]
#[error("Research on {topic:?} failed at step '{step}': {source}")]
pub struct RunError {
    /// Topic of the failed run
    pub topic: String,
    /// Step that was executing (or about to execute) when the run failed
    pub step: Step,
    /// Last state successfully merged before the failure
    pub state: Box<ResearchState>,
    #[source]
    pub source: ResearchError,
}

impl RunError {
    pub fn new(step: Step, state: &ResearchState, source: ResearchError) -> Self {
        Self {
            topic: state.topic().to_string(),
            step,
            state: Box::new(state.clone()),
            source,
        }
    }

    /// Check if the run hit the step ceiling
    pub fn is_runaway(&self) -> bool {
        self.source.is_runaway()
    }
}

#[cfg(test)]
mod tests {
    // Ensure errors are Send + Sync (compile-time check)
    static_assertions::assert_impl_all!(super::ResearchError: Send, Sync);
    static_assertions::assert_impl_all!(super::RunError: Send, Sync);
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ResearchError::StepLimitExceeded { limit: 50 };
        assert_eq!(
            format!("{}", err),
            "Step limit exceeded: 50 steps executed without reaching the report"
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(ResearchError::timeout("web_search", Duration::from_secs(1)).is_retryable());
        assert!(ResearchError::Tool(SearchError::RateLimited).is_retryable());
        assert!(ResearchError::Model(LlmError::Connection("refused".into())).is_retryable());

        assert!(!ResearchError::Cancelled.is_retryable());
        assert!(!ResearchError::config("missing model").is_retryable());
        assert!(!ResearchError::StepLimitExceeded { limit: 3 }.is_retryable());
        assert!(!ResearchError::unparseable("router", "???").is_retryable());
    }

    #[test]
    fn test_runaway_is_distinct_from_external() {
        let runaway = ResearchError::StepLimitExceeded { limit: 10 };
        assert!(runaway.is_runaway());
        assert!(!runaway.is_external());

        let exhausted = ResearchError::RetriesExhausted {
            operation: "analyze".into(),
            attempts: 3,
            last: Box::new(ResearchError::timeout("analyze", Duration::from_secs(5))),
        };
        assert!(!exhausted.is_runaway());
        assert!(exhausted.is_external());
    }

    #[test]
    fn test_run_error_carries_context() {
        let state = ResearchState::new("battery recycling");
        let err = RunError::new(Step::Analyze, &state, ResearchError::Cancelled);

        assert_eq!(err.topic, "battery recycling");
        assert_eq!(err.step, Step::Analyze);
        assert_eq!(err.state.topic(), "battery recycling");
        assert!(err.to_string().contains("analyze"));
        assert!(err.to_string().contains("battery recycling"));
    }
}
