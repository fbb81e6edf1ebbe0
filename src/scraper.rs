//! Single-page fetching of an entity's public web presence.
//!
//! Two backends: a hosted page-rendering service that returns the main content
//! as markdown, and a direct fetch that reduces the raw `<body>` to text lines.
//! Either way one URL costs exactly one network call; there is no retry.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::enrich::FetchedDocument;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("{0}")]
    Service(String),

    #[error("{0}")]
    Transport(String),

    #[error("no content returned")]
    NoContent,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError>;
}

/// Prefix `https://` when the URL has no scheme.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// RFC 3986 scheme: a letter followed by letters, digits, `+`, `-` or `.`.
fn has_scheme(url: &str) -> bool {
    let Some((scheme, _)) = url.split_once("://") else {
        return false;
    };
    scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn build_client(timeout: Duration) -> Result<Client, FetchError> {
    ClientBuilder::new()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(4)
        .build()
        .map_err(|e| FetchError::Transport(e.to_string()))
}

// ---------------------------------------------------------------------------
// Hosted rendering service
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'a str; 1],
    only_main_content: bool,
    wait_for: u64,
}

#[derive(Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: bool,
    data: Option<ScrapeData>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ScrapeData {
    markdown: Option<String>,
}

/// Firecrawl-style `/v1/scrape` client.
pub struct FirecrawlFetcher {
    client: Client,
    base_url: String,
    api_key: String,
    wait_for: Duration,
}

impl FirecrawlFetcher {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        wait_for: Duration,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            wait_for,
        })
    }
}

/// Turn the service's reply into markdown or the service's own error message.
fn interpret_scrape_response(status: u16, body: &str) -> Result<String, FetchError> {
    let parsed: Option<ScrapeResponse> = serde_json::from_str(body).ok();

    if !(200..300).contains(&status) {
        let message = parsed
            .and_then(|r| r.error)
            .unwrap_or_else(|| body.trim().chars().take(200).collect());
        return Err(FetchError::Status { status, message });
    }

    let response = parsed.ok_or_else(|| FetchError::Service("unreadable response body".to_string()))?;
    if !response.success {
        return Err(FetchError::Service(
            response.error.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }

    response
        .data
        .and_then(|d| d.markdown)
        .ok_or(FetchError::NoContent)
}

#[async_trait]
impl PageFetcher for FirecrawlFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        let request = ScrapeRequest {
            url,
            formats: ["markdown"],
            only_main_content: true,
            wait_for: self.wait_for.as_millis() as u64,
        };

        let response = self
            .client
            .post(format!("{}/v1/scrape", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        let markdown = interpret_scrape_response(status, &body)?;

        tracing::debug!(url = %url, length = markdown.len(), "Page fetched");
        Ok(FetchedDocument::new(url, markdown))
    }
}

// ---------------------------------------------------------------------------
// Direct fetch
// ---------------------------------------------------------------------------

static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("body").expect("Failed to parse body selector")
});

const SKIPPED_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Plain GET of the page, reduced to its visible body text.
pub struct DirectFetcher {
    client: Client,
}

impl DirectFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

/// Visible text of the `<body>`, one text run per line.
pub fn extract_body_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let body = document.select(&BODY_SELECTOR).next()?;

    let mut lines = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| SKIPPED_ELEMENTS.contains(&e.name()))
        });
        if !hidden {
            lines.push(text.trim().to_string());
        }
    }

    Some(collapse_whitespace(&lines.join("\n")))
}

/// Trim every line and drop the empty ones.
pub fn collapse_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        let trimmed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if trimmed.is_empty() {
            continue;
        }
        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str(&trimmed);
    }

    result
}

#[async_trait]
impl PageFetcher for DirectFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("request failed").to_string(),
            });
        }

        let html = response.text().await?;
        let text = extract_body_text(&html).ok_or(FetchError::NoContent)?;
        Ok(FetchedDocument::new(url, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.org"), "https://example.org");
        assert_eq!(normalize_url("  www.example.org/about "), "https://www.example.org/about");
        assert_eq!(normalize_url("http://example.org"), "http://example.org");
        assert_eq!(normalize_url("https://example.org"), "https://example.org");
        assert_eq!(
            normalize_url("example.org/login?next=https://example.org/home"),
            "https://example.org/login?next=https://example.org/home"
        );
        assert_eq!(
            normalize_url("www.example.org/r/https://other.org"),
            "https://www.example.org/r/https://other.org"
        );
    }

    #[test]
    fn test_interpret_success() {
        let body = r##"{"success":true,"data":{"markdown":"# Acme\n\nWe build things."}}"##;
        assert_eq!(
            interpret_scrape_response(200, body).unwrap(),
            "# Acme\n\nWe build things."
        );
    }

    #[test]
    fn test_interpret_service_failure() {
        let body = r#"{"success":false,"error":"Website blocked"}"#;
        assert_eq!(
            interpret_scrape_response(200, body).unwrap_err(),
            FetchError::Service("Website blocked".to_string())
        );
    }

    #[test]
    fn test_interpret_http_error_uses_service_message() {
        let body = r#"{"success":false,"error":"Rate limit exceeded"}"#;
        let err = interpret_scrape_response(429, body).unwrap_err();
        assert_eq!(err.to_string(), "HTTP 429: Rate limit exceeded");
    }

    #[test]
    fn test_interpret_missing_markdown() {
        let body = r#"{"success":true,"data":{}}"#;
        assert_eq!(interpret_scrape_response(200, body).unwrap_err(), FetchError::NoContent);
    }

    #[test]
    fn test_request_body_uses_camel_case() {
        let request = ScrapeRequest {
            url: "https://example.org",
            formats: ["markdown"],
            only_main_content: true,
            wait_for: 3000,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["onlyMainContent"], true);
        assert_eq!(value["waitFor"], 3000);
        assert_eq!(value["formats"][0], "markdown");
    }

    #[test]
    fn test_extract_body_text_skips_scripts() {
        let html = r#"<html><head><title>t</title></head><body>
            <h1>Acme   Corp</h1>
            <script>var tracking = 1;</script>
            <p>We build
               rockets.</p>
            <style>p { color: red; }</style>
        </body></html>"#;
        assert_eq!(
            extract_body_text(html).unwrap(),
            "Acme Corp\nWe build\nrockets."
        );
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a  \n\n\n   b c  \n"), "a\nb c");
    }
}
