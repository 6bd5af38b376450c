//! # Tools Module
//!
//! Search capabilities used by the workflow's search steps:
//! - [`WebSearchTool`]: general web search through DuckDuckGo's HTML endpoint
//! - [`ArxivSearchTool`]: academic paper search through the arXiv Atom API
//!
//! Both implement [`SearchTool`], which returns a raw text payload. The
//! workflow never inspects the payload's structure; it is evidence text for
//! the language model.

mod arxiv;
mod web;

pub use arxiv::{ArxivPaper, ArxivSearchTool};
pub use web::{SearchResult, WebSearchTool};

use async_trait::async_trait;
use thiserror::Error;

// =============================================================================
// CUSTOM ERROR TYPE
// =============================================================================
/// Errors raised by search adapters.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Rate limited by search provider, please wait")]
    RateLimited,

    #[error("Search provider server error (HTTP {0})")]
    Server(u16),

    #[error("Search request rejected (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    #[error("Failed to parse search response: {0}")]
    Parse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl SearchError {
    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: reqwest::StatusCode, body: impl Into<String>) -> Self {
        match status.as_u16() {
            429 => SearchError::RateLimited,
            code @ 500..=599 => SearchError::Server(code),
            code => SearchError::Http {
                status: code,
                message: body.into(),
            },
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::RateLimited | SearchError::Server(_) => true,
            SearchError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SearchError::Http { .. } | SearchError::Parse(_) => false,
        }
    }
}

// =============================================================================
// CAPABILITY TRAIT
// =============================================================================
/// Search capability: a query goes in, a raw result payload comes out.
#[async_trait]
pub trait SearchTool: Send + Sync {
    /// Run a search and return the formatted result payload
    async fn search(&self, query: &str) -> Result<String, SearchError>;

    /// Tool name for logging/debugging
    fn name(&self) -> &str;
}

/// Strip HTML tags and decode the handful of entities search pages use.
pub(crate) fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let decoded = text
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status() {
        assert!(matches!(
            SearchError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            SearchError::RateLimited
        ));
        assert!(matches!(
            SearchError::from_status(StatusCode::BAD_GATEWAY, ""),
            SearchError::Server(502)
        ));
        assert!(matches!(
            SearchError::from_status(StatusCode::FORBIDDEN, "blocked"),
            SearchError::Http { status: 403, .. }
        ));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SearchError::RateLimited.is_retryable());
        assert!(SearchError::Server(503).is_retryable());
        assert!(!SearchError::Parse("bad xml".into()).is_retryable());
        assert!(!SearchError::Http {
            status: 400,
            message: "bad query".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_html_to_text() {
        assert_eq!(
            html_to_text("<b>Lithium</b>-ion &amp; <i>sodium</i>\n  batteries"),
            "Lithium-ion & sodium batteries"
        );
        assert_eq!(html_to_text("it&#x27;s &quot;fine&quot;"), "it's \"fine\"");
    }
}
