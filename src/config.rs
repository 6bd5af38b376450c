//! # Configuration Module
//!
//! Two layers of configuration:
//! - [`Config`]: application settings loaded from the environment (and an
//!   optional `.env` file) by the binary
//! - [`WorkflowConfig`]: the per-run engine settings the orchestrator
//!   receives explicitly; the workflow core never reads the environment

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::retry::RetryPolicy;

// =============================================================================
// WORKFLOW CONFIGURATION
// =============================================================================
/// Engine settings for a research run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Search attempts per subtopic before its evidence is force-accepted
    pub max_retries: u32,

    /// Global ceiling on step executions per run
    pub max_steps: usize,

    /// Timeout applied to every individual model or tool call
    pub call_timeout: Duration,

    /// Retry policy for transient call failures
    pub call_retry: RetryPolicy,

    /// Number of subtopics the planner asks for (and keeps)
    pub subtopic_count: usize,

    /// Upper bound on the length of a refined query, in characters
    pub max_query_chars: usize,

    /// Treat unmatched router output as a fatal error instead of falling back
    pub strict_routing: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_steps: 50,
            call_timeout: Duration::from_secs(120),
            call_retry: RetryPolicy::default(),
            subtopic_count: 3,
            max_query_chars: 300,
            strict_routing: false,
        }
    }
}

impl WorkflowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = max;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_call_retry(mut self, policy: RetryPolicy) -> Self {
        self.call_retry = policy;
        self
    }

    pub fn with_subtopic_count(mut self, count: usize) -> Self {
        self.subtopic_count = count;
        self
    }

    pub fn with_max_query_chars(mut self, max: usize) -> Self {
        self.max_query_chars = max;
        self
    }

    pub fn with_strict_routing(mut self, strict: bool) -> Self {
        self.strict_routing = strict;
        self
    }

    /// Validate the engine settings.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            anyhow::bail!("MAX_RETRIES must be at least 1");
        }
        if self.max_steps == 0 {
            anyhow::bail!("MAX_STEPS must be at least 1");
        }
        if self.subtopic_count == 0 {
            anyhow::bail!("SUBTOPIC_COUNT must be at least 1");
        }
        if self.max_query_chars == 0 {
            anyhow::bail!("max_query_chars must be at least 1");
        }
        if self.call_timeout.is_zero() {
            anyhow::bail!("CALL_TIMEOUT_SECS must be at least 1");
        }
        Ok(())
    }
}

// =============================================================================
// APPLICATION CONFIGURATION
// =============================================================================
/// Application configuration for the research assistant binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// The Ollama model to use (e.g., "llama3.2")
    pub model: String,

    /// Ollama server URL (default: http://localhost:11434)
    pub ollama_host: String,

    /// Temperature for LLM responses. Routing and analysis parse the
    /// model's words, so the default is fully deterministic.
    pub temperature: f32,

    /// Maximum number of results per search call
    pub max_search_results: usize,

    /// Log level for the application
    pub log_level: String,

    /// Engine settings
    pub workflow: WorkflowConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            ollama_host: "http://localhost:11434".to_string(),
            temperature: 0.0,
            max_search_results: 5,
            log_level: "info".to_string(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        if let Ok(val) = env::var("OLLAMA_MODEL") {
            config.model = val;
        }

        if let Ok(val) = env::var("OLLAMA_API_BASE_URL") {
            config.ollama_host = val;
        }

        if let Ok(val) = env::var("TEMPERATURE") {
            config.temperature = val
                .parse()
                .context("TEMPERATURE must be a valid floating-point number (e.g., 0.2)")?;
        }

        if let Ok(val) = env::var("MAX_SEARCH_RESULTS") {
            config.max_search_results = val
                .parse()
                .context("MAX_SEARCH_RESULTS must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("MAX_RETRIES") {
            config.workflow.max_retries = val
                .parse()
                .context("MAX_RETRIES must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("MAX_STEPS") {
            config.workflow.max_steps = val
                .parse()
                .context("MAX_STEPS must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("CALL_TIMEOUT_SECS") {
            let secs: u64 = val
                .parse()
                .context("CALL_TIMEOUT_SECS must be a whole number of seconds")?;
            config.workflow.call_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = env::var("SUBTOPIC_COUNT") {
            config.workflow.subtopic_count = val
                .parse()
                .context("SUBTOPIC_COUNT must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("RUST_LOG") {
            config.log_level = val;
        }

        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Runs before any research starts so bad settings fail fast.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!(
                "Temperature must be between 0.0 and 2.0, got: {}",
                self.temperature
            );
        }

        if self.max_search_results == 0 {
            anyhow::bail!("MAX_SEARCH_RESULTS must be at least 1");
        }

        if self.model.is_empty() {
            anyhow::bail!("OLLAMA_MODEL cannot be empty");
        }

        self.workflow.validate()
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.ollama_host, "http://localhost:11434");
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.max_search_results, 5);
        assert_eq!(config.workflow.max_retries, 3);
        assert_eq!(config.workflow.max_steps, 50);
    }

    #[test]
    fn test_config_validation_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_temperature() {
        let mut config = Config::default();
        config.temperature = 3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_search_results() {
        let mut config = Config::default();
        config.max_search_results = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_model() {
        let mut config = Config::default();
        config.model.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_workflow_config_builder() {
        let workflow = WorkflowConfig::new()
            .with_max_retries(5)
            .with_max_steps(20)
            .with_call_timeout(Duration::from_secs(10))
            .with_subtopic_count(4)
            .with_max_query_chars(120)
            .with_strict_routing(true);

        assert_eq!(workflow.max_retries, 5);
        assert_eq!(workflow.max_steps, 20);
        assert_eq!(workflow.call_timeout, Duration::from_secs(10));
        assert_eq!(workflow.subtopic_count, 4);
        assert_eq!(workflow.max_query_chars, 120);
        assert!(workflow.strict_routing);
        assert!(workflow.validate().is_ok());
    }

    #[test]
    fn test_workflow_config_rejects_zero_limits() {
        assert!(WorkflowConfig::new().with_max_retries(0).validate().is_err());
        assert!(WorkflowConfig::new().with_max_steps(0).validate().is_err());
        assert!(WorkflowConfig::new().with_subtopic_count(0).validate().is_err());
        assert!(WorkflowConfig::new()
            .with_call_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
