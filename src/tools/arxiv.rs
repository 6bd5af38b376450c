//! Academic paper search using the arXiv Atom API.
//!
//! arXiv asks clients to keep at least three seconds between requests. The
//! spacing is tracked per adapter instance behind a `tokio::sync::Mutex`, so
//! concurrent research runs that share one `ArxivSearchTool` queue up behind
//! each other instead of each keeping its own clock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{html_to_text, SearchError, SearchTool};

const ARXIV_API_BASE: &str = "https://export.arxiv.org/api/query";
const USER_AGENT: &str = "research-graph/0.1 (autonomous research assistant)";
const SUMMARY_CHARS: usize = 600;

/// A paper parsed from an Atom `<entry>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArxivPaper {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub published: String,
    pub abs_url: String,
}

/// arXiv search adapter.
#[derive(Debug)]
pub struct ArxivSearchTool {
    client: reqwest::Client,
    endpoint: String,
    max_results: usize,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl ArxivSearchTool {
    pub fn new(max_results: usize) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            endpoint: ARXIV_API_BASE.to_string(),
            max_results,
            min_interval: Duration::from_secs(3),
            last_request: Mutex::new(None),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Minimum spacing between two requests from this adapter.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Search arXiv and return the parsed papers.
    pub async fn search_papers(&self, query: &str) -> Result<Vec<ArxivPaper>, SearchError> {
        info!(query = %query, "Searching arXiv");

        // The guard is held for the whole request so requests sharing this
        // adapter are spaced by at least `min_interval`.
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());

        let search_query = build_search_query(query);
        let max_results = self.max_results.to_string();
        debug!(search_query = %search_query, "arXiv request");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("search_query", search_query.as_str()),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", "relevance"),
                ("sortOrder", "descending"),
            ])
            .send()
            .await?;
        drop(last);

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::from_status(status, body));
        }

        let body = response.text().await?;
        let papers = parse_feed(&body)?;
        info!(query = %query, count = papers.len(), "arXiv search completed");

        Ok(papers)
    }
}

#[async_trait]
impl SearchTool for ArxivSearchTool {
    async fn search(&self, query: &str) -> Result<String, SearchError> {
        let papers = self.search_papers(query).await?;
        Ok(format_papers(query, &papers))
    }

    fn name(&self) -> &str {
        "arxiv_search"
    }
}

const FIELD_PREFIXES: &[&str] = &["ti", "au", "abs", "cat", "all", "co", "jr"];

/// Queries that already use arXiv field prefixes (`ti:`, `abs:`, `all:` ...)
/// pass through untouched; plain text searches every field.
fn build_search_query(query: &str) -> String {
    let query = query.trim();
    let has_field_prefix = query.split_whitespace().any(|word| {
        word.split_once(':')
            .is_some_and(|(field, _)| FIELD_PREFIXES.contains(&field.trim_start_matches('(')))
    });

    if has_field_prefix {
        query.to_string()
    } else {
        format!("all:{}", query)
    }
}

fn format_papers(query: &str, papers: &[ArxivPaper]) -> String {
    if papers.is_empty() {
        return format!("No papers found for: {}\n", query);
    }

    let body: String = papers
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let summary: String = p.summary.chars().take(SUMMARY_CHARS).collect();
            format!(
                "{}. **{}** ({})\n   Authors: {}\n   URL: {}\n   {}\n",
                i + 1,
                p.title,
                p.published.get(..10).unwrap_or(&p.published),
                p.authors.join(", "),
                p.abs_url,
                summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("## arXiv papers for: {}\n\n{}\n", query, body)
}

/// Parse an Atom feed into papers.
fn parse_feed(xml: &str) -> Result<Vec<ArxivPaper>, SearchError> {
    if !xml.contains("<feed") {
        return Err(SearchError::Parse("response is not an Atom feed".to_string()));
    }

    Ok(blocks(xml, "entry").filter_map(parse_entry).collect())
}

fn parse_entry(entry: &str) -> Option<ArxivPaper> {
    let abs_url = tag_text(entry, "id")?;
    let title = html_to_text(&tag_text(entry, "title")?);
    let arxiv_id = abs_url
        .rsplit_once("/abs/")
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| abs_url.clone());

    let authors = blocks(entry, "author")
        .filter_map(|author| tag_text(author, "name"))
        .collect();

    Some(ArxivPaper {
        arxiv_id,
        title,
        authors,
        summary: html_to_text(&tag_text(entry, "summary").unwrap_or_default()),
        published: tag_text(entry, "published").unwrap_or_default(),
        abs_url,
    })
}

/// Iterate over the `<tag ...>...</tag>` blocks of `xml`.
fn blocks<'a>(xml: &'a str, tag: &str) -> impl Iterator<Item = &'a str> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut cursor = 0;

    std::iter::from_fn(move || loop {
        let start = cursor + xml[cursor..].find(&open)?;
        let after = start + open.len();
        // Skip longer tag names sharing the prefix (<entry> vs <entryx>)
        if !xml[after..].starts_with(['>', ' ', '\n', '\t', '\r', '/']) {
            cursor = after;
            continue;
        }
        let end = after + xml[after..].find(&close)? + close.len();
        cursor = end;
        return Some(&xml[start..end]);
    })
}

/// Trimmed text of the first `<tag>` in `xml`.
fn tag_text(xml: &str, tag: &str) -> Option<String> {
    let block = blocks(xml, tag).next()?;
    let content_start = block.find('>')? + 1;
    let content_end = block.rfind("</")?;
    Some(block[content_start..content_end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=all:battery recycling</title>
  <opensearch:totalResults>2</opensearch:totalResults>
  <entry>
    <id>http://arxiv.org/abs/2101.00001v2</id>
    <published>2021-01-01T00:00:00Z</published>
    <title>Direct Recycling of
      Lithium-Ion Cathodes</title>
    <summary>  We study direct recycling &amp; regeneration of cathode materials.
    </summary>
    <author><name>Ada Smith</name></author>
    <author><name>Lin Wei</name></author>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2202.00002v1</id>
    <published>2022-02-02T00:00:00Z</published>
    <title>Hydrometallurgical Recovery of Cobalt</title>
    <summary>Leaching kinetics.</summary>
    <author><name>Maria Rossi</name></author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed() {
        let papers = parse_feed(FEED).unwrap();

        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].arxiv_id, "2101.00001v2");
        assert_eq!(papers[0].title, "Direct Recycling of Lithium-Ion Cathodes");
        assert_eq!(papers[0].authors, vec!["Ada Smith", "Lin Wei"]);
        assert_eq!(
            papers[0].summary,
            "We study direct recycling & regeneration of cathode materials."
        );
        assert_eq!(papers[1].authors, vec!["Maria Rossi"]);
    }

    #[test]
    fn test_parse_empty_feed() {
        let papers = parse_feed(r#"<feed xmlns="http://www.w3.org/2005/Atom"></feed>"#).unwrap();
        assert!(papers.is_empty());
        assert_eq!(format_papers("q", &papers), "No papers found for: q\n");
    }

    #[test]
    fn test_parse_rejects_non_feed() {
        let err = parse_feed("<html>Service unavailable</html>").unwrap_err();
        assert!(matches!(err, SearchError::Parse(_)));
    }

    #[test]
    fn test_build_search_query() {
        assert_eq!(build_search_query("battery recycling"), "all:battery recycling");
        assert_eq!(
            build_search_query("ti:battery AND abs:recycling"),
            "ti:battery AND abs:recycling"
        );
        assert_eq!(
            build_search_query("(ti:cathode OR abs:cathode)"),
            "(ti:cathode OR abs:cathode)"
        );
        assert_eq!(build_search_query("ratio 3:1 mixtures"), "all:ratio 3:1 mixtures");
    }

    #[test]
    fn test_format_papers() {
        let papers = parse_feed(FEED).unwrap();
        let payload = format_papers("battery recycling", &papers);

        assert!(payload.starts_with("## arXiv papers for: battery recycling"));
        assert!(payload.contains("1. **Direct Recycling of Lithium-Ion Cathodes** (2021-01-01)"));
        assert!(payload.contains("Authors: Ada Smith, Lin Wei"));
        assert!(payload.contains("URL: http://arxiv.org/abs/2202.00002v1"));
    }

    #[tokio::test]
    async fn test_search_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("search_query", "all:battery recycling"))
            .and(query_param("max_results", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .expect(1)
            .mount(&server)
            .await;

        let tool = ArxivSearchTool::new(3)
            .unwrap()
            .with_endpoint(format!("{}/api/query", server.uri()))
            .with_min_interval(Duration::ZERO);

        let payload = tool.search("battery recycling").await.unwrap();
        assert!(payload.contains("Hydrometallurgical Recovery of Cobalt"));
    }

    #[tokio::test]
    async fn test_search_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let tool = ArxivSearchTool::new(3)
            .unwrap()
            .with_endpoint(server.uri())
            .with_min_interval(Duration::ZERO);

        let err = tool.search("anything").await.unwrap_err();
        assert!(matches!(err, SearchError::Server(503)));
        assert!(err.is_retryable());
    }
}
