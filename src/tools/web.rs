//! General web search using DuckDuckGo's HTML endpoint.
//!
//! DuckDuckGo has no free JSON web-search API, so results are scraped from
//! the HTML results page. Parsing prefers the structured result anchors
//! (title + snippet) and falls back to bare redirect links when the page
//! layout changes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{html_to_text, SearchError, SearchTool};

const DEFAULT_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A single web search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Web search adapter.
///
/// Holds no per-run state; one instance can serve any number of concurrent
/// research runs.
#[derive(Debug, Clone)]
pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
    max_results: usize,
    /// Politeness delay before each request
    request_delay: Duration,
}

impl WebSearchTool {
    /// Create a new WebSearchTool returning at most `max_results` hits.
    pub fn new(max_results: usize) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_results,
            request_delay: Duration::from_millis(500),
        })
    }

    /// Point the tool at a different results endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Search and return the parsed hits.
    pub async fn search_results(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        info!(query = %query, "Performing web search");

        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::from_status(status, body));
        }

        let body = response.text().await?;
        let results = parse_results_page(&body, self.max_results);

        if results.is_empty() {
            warn!(query = %query, "No search results found");
        } else {
            info!(query = %query, count = results.len(), "Search completed");
        }

        Ok(results)
    }
}

#[async_trait]
impl SearchTool for WebSearchTool {
    async fn search(&self, query: &str) -> Result<String, SearchError> {
        let results = self.search_results(query).await?;
        Ok(format_results(query, &results))
    }

    fn name(&self) -> &str {
        "web_search"
    }
}

/// Render hits as the markdown payload handed to the model.
pub(crate) fn format_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No results found for: {}\n", query);
    }

    let body: String = results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. **{}**\n   URL: {}\n   {}\n", i + 1, r.title, r.url, r.snippet))
        .collect::<Vec<_>>()
        .join("\n");

    format!("## Web results for: {}\n\n{}\n", query, body)
}

/// Parse a DuckDuckGo HTML results page.
fn parse_results_page(html: &str, max_results: usize) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    let mut results = Vec::new();

    // Structured anchors: <a class="result__a" href="...">Title</a> ... result__snippet
    for segment in html.split("class=\"result__a\"").skip(1) {
        if results.len() >= max_results {
            break;
        }

        let Some(href) = attribute_value(segment, "href") else {
            continue;
        };
        let Some(url) = resolve_link(&href) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }

        let title = anchor_text(segment)
            .filter(|t| !t.is_empty())
            .or_else(|| domain_of(&url))
            .unwrap_or_else(|| "Result".to_string());

        let snippet = segment
            .find("result__snippet")
            .and_then(|pos| anchor_text(&segment[pos..]))
            .unwrap_or_default();

        results.push(SearchResult { title, url, snippet });
    }

    if !results.is_empty() {
        return results;
    }

    // Fallback: bare redirect links carrying the target in `uddg=`
    debug!("No structured results found, falling back to redirect links");
    for segment in html.split("uddg=").skip(1) {
        if results.len() >= max_results {
            break;
        }
        let end = segment
            .find(['&', '"', '\''])
            .unwrap_or(segment.len());
        let Ok(decoded) = urlencoding::decode(&segment[..end]) else {
            continue;
        };
        let url = decoded.into_owned();
        if !url.starts_with("http") || url.contains("duckduckgo.com") || !seen.insert(url.clone()) {
            continue;
        }
        results.push(SearchResult {
            title: domain_of(&url).unwrap_or_else(|| "Result".to_string()),
            url,
            snippet: String::new(),
        });
    }

    results
}

/// Value of `name="..."` in the first tag of `fragment`.
fn attribute_value(fragment: &str, name: &str) -> Option<String> {
    let tag_end = fragment.find('>')?;
    let tag = &fragment[..tag_end];
    let needle = format!("{}=\"", name);
    let start = tag.find(&needle)? + needle.len();
    let end = tag[start..].find('"')? + start;
    Some(tag[start..end].replace("&amp;", "&"))
}

/// Text between the end of the current tag and the closing `</a>`.
fn anchor_text(fragment: &str) -> Option<String> {
    let start = fragment.find('>')? + 1;
    let end = fragment[start..].find("</a>")? + start;
    Some(html_to_text(&fragment[start..end]))
}

/// Turn a result href into the target URL, unwrapping DuckDuckGo redirects.
fn resolve_link(href: &str) -> Option<String> {
    if let Some(pos) = href.find("uddg=") {
        let encoded = &href[pos + 5..];
        let encoded = encoded.split('&').next().unwrap_or(encoded);
        let url = urlencoding::decode(encoded).ok()?.into_owned();
        return url.starts_with("http").then_some(url);
    }

    let url = if let Some(rest) = href.strip_prefix("//") {
        format!("https://{}", rest)
    } else if href.starts_with("http") {
        href.to_string()
    } else {
        return None;
    };

    // Sponsored results point back at duckduckgo.com
    (!url.contains("duckduckgo.com")).then_some(url)
}

/// Extract the domain name from a URL.
fn domain_of(url: &str) -> Option<String> {
    url.split("//")
        .nth(1)?
        .split('/')
        .next()
        .map(|s| s.to_string())
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RESULTS_PAGE: &str = r#"
<div class="result results_links">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.epa.gov%2Frecycle%2Fbatteries&amp;rut=abc">Used Lithium-Ion <b>Batteries</b> | US EPA</a>
  </h2>
  <a class="result__snippet" href="//duckduckgo.com/l/?uddg=x">Lithium-ion <b>batteries</b> should be recycled at certified facilities.</a>
</div>
<div class="result results_links">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="https://www.nature.com/articles/battery-recycling">Battery recycling at scale</a>
  </h2>
  <a class="result__snippet" href="https://www.nature.com/articles/battery-recycling">Hydrometallurgy recovers cobalt &amp; nickel.</a>
</div>
<div class="result results_links">
  <a rel="nofollow" class="result__a" href="https://duckduckgo.com/y.js?ad_provider=x">Sponsored</a>
</div>
"#;

    #[test]
    fn test_parse_structured_results() {
        let results = parse_results_page(RESULTS_PAGE, 5);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://www.epa.gov/recycle/batteries");
        assert_eq!(results[0].title, "Used Lithium-Ion Batteries | US EPA");
        assert_eq!(
            results[0].snippet,
            "Lithium-ion batteries should be recycled at certified facilities."
        );
        assert_eq!(results[1].url, "https://www.nature.com/articles/battery-recycling");
        assert_eq!(results[1].snippet, "Hydrometallurgy recovers cobalt & nickel.");
    }

    #[test]
    fn test_parse_respects_max_results() {
        let results = parse_results_page(RESULTS_PAGE, 1);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_parse_fallback_redirect_links() {
        let html = r#"<a href="/l/?uddg=https%3A%2F%2Frust-lang.org%2Flearn&rut=1">x</a>
                      <a href="/l/?uddg=https%3A%2F%2Frust-lang.org%2Flearn&rut=2">dup</a>"#;
        let results = parse_results_page(html, 5);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://rust-lang.org/learn");
        assert_eq!(results[0].title, "rust-lang.org");
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(
            domain_of("https://www.example.com/page"),
            Some("www.example.com".to_string())
        );
        assert_eq!(domain_of("not a url"), None);
    }

    #[test]
    fn test_format_results_empty() {
        assert_eq!(format_results("nothing", &[]), "No results found for: nothing\n");
    }

    #[tokio::test]
    async fn test_search_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "battery recycling"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RESULTS_PAGE))
            .mount(&server)
            .await;

        let tool = WebSearchTool::new(5)
            .unwrap()
            .with_endpoint(format!("{}/html/", server.uri()))
            .with_request_delay(Duration::ZERO);

        let payload = tool.search("battery recycling").await.unwrap();

        assert!(payload.starts_with("## Web results for: battery recycling"));
        assert!(payload.contains("https://www.epa.gov/recycle/batteries"));
        assert!(payload.contains("2. **Battery recycling at scale**"));
    }

    #[tokio::test]
    async fn test_search_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let tool = WebSearchTool::new(5)
            .unwrap()
            .with_endpoint(server.uri())
            .with_request_delay(Duration::ZERO);

        let err = tool.search("anything").await.unwrap_err();
        assert!(matches!(err, SearchError::RateLimited));
        assert!(err.is_retryable());
    }
}
