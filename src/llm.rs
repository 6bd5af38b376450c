//! # Language Model Module
//!
//! Defines the [`LanguageModel`] capability the workflow depends on, plus an
//! Ollama-backed implementation built with the Rig framework.
//!
//! The workflow treats the model as a black box: a prompt goes in, text
//! comes out. Everything that interprets the text lives in
//! [`crate::decode`] and [`crate::steps`].

use async_trait::async_trait;
use rig::client::{CompletionClient, Nothing};
use rig::completion::Prompt;
use rig::providers::ollama;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;

// =============================================================================
// ERRORS
// =============================================================================
/// Errors raised by a language model adapter.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The model server could not be reached
    #[error("Connection to model server failed: {0}")]
    Connection(String),

    /// The provider throttled the request
    #[error("Rate limited by model provider")]
    RateLimited,

    /// The provider rejected or failed the request
    #[error("Model provider error: {0}")]
    Provider(String),
}

impl LlmError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Connection(_) | LlmError::RateLimited)
    }

    /// Classify a provider error message.
    ///
    /// Rig surfaces transport failures as formatted strings, so the
    /// classification is done on the message text.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("connection refused")
            || lower.contains("error sending request")
            || lower.contains("connection reset")
            || lower.contains("timed out")
        {
            LlmError::Connection(message)
        } else if lower.contains("429") || lower.contains("rate limit") {
            LlmError::RateLimited
        } else {
            LlmError::Provider(message)
        }
    }
}

// =============================================================================
// CAPABILITY TRAIT
// =============================================================================
/// Text completion capability.
///
/// Implementations must be shareable across concurrent research runs; any
/// internal mutable state (rate limits, connection pools) is the adapter's
/// own responsibility.
///
/// # Example Implementation
///
/// ```rust,ignore
/// struct Echo;
///
/// #[async_trait]
/// impl LanguageModel for Echo {
///     async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
///         Ok(prompt.to_string())
///     }
///
///     fn name(&self) -> &str { "echo" }
/// }
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a single prompt and return the raw response text
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// Model name for logging/debugging
    fn name(&self) -> &str;
}

// =============================================================================
// OLLAMA ADAPTER
// =============================================================================
/// Preamble shared by every workflow prompt.
const PREAMBLE: &str = "You are a meticulous research assistant. \
Follow the output format requested in each message exactly and do not add commentary.";

/// [`LanguageModel`] backed by a local Ollama server through Rig.
///
/// The Rig client is built once for the configured host and reused by every
/// call.
#[derive(Debug, Clone)]
pub struct OllamaModel {
    client: ollama::Client,
    model: String,
    host: String,
    temperature: f64,
}

impl OllamaModel {
    pub fn new(model: impl Into<String>, host: impl Into<String>) -> Result<Self, LlmError> {
        let host = host.into();
        let client = ollama::Client::builder()
            .api_key(Nothing)
            .base_url(&host)
            .build()
            .map_err(|e| {
                LlmError::Provider(format!("Failed to create Ollama client for {}: {}", host, e))
            })?;

        Ok(Self {
            client,
            model: model.into(),
            host,
            temperature: 0.0,
        })
    }

    /// Build the adapter from the application configuration.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        Ok(Self::new(&config.model, &config.ollama_host)?.with_temperature(config.temperature))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = f64::from(temperature);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(PREAMBLE)
            .temperature(self.temperature)
            .build();

        debug!(
            model = %self.model,
            host = %self.host,
            chars = prompt.len(),
            "Sending prompt to Ollama"
        );

        let response = agent
            .prompt(prompt)
            .await
            .map_err(|e| LlmError::classify(e.to_string()))?;

        debug!(model = %self.model, chars = response.len(), "Received completion");

        Ok(response)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
