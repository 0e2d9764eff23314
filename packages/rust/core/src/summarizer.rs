//! Summaries and tags from a local Ollama server.
//!
//! The model is asked for a fixed two-line format:
//!
//! ```text
//! SUMMARY: <two or three sentences>
//! TAGS: <tag1>, <tag2>, <tag3>
//! ```
//!
//! [`parse_response`] is lenient: a missing marker yields an empty piece, never an error.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use dredger_shared::{DredgeConfig, DredgerError, Result};

/// Bytes of an error response body kept in the error message.
const ERROR_BODY_LIMIT: usize = 512;

/// Summary and tags for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub summary: String,
    pub tags: Vec<String>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// HTTP client for Ollama's `/api/version` and `/api/generate` endpoints.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: Client,
    ping_timeout: Duration,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        ping_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DredgerError::Summarizer(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
            ping_timeout,
        })
    }

    pub fn from_config(config: &DredgeConfig) -> Result<Self> {
        Self::new(
            &config.ollama_url,
            &config.ollama_model,
            config.summarize_timeout,
            config.ping_timeout,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether the server answers `/api/version` with 200 within the ping timeout.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn ping(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/api/version", self.base_url))
            .timeout(self.ping_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                debug!(status = %response.status(), "summarizer unavailable");
                false
            }
            Err(e) => {
                debug!(error = %e, "summarizer unreachable");
                false
            }
        }
    }

    /// Ask the model for a summary and tags of the page at `url`.
    #[instrument(skip(self, title, description), fields(model = %self.model))]
    pub async fn summarize(&self, title: &str, description: &str, url: &str) -> Result<Summary> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: build_prompt(title, description, url),
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| DredgerError::Summarizer(format!("ollama request: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.bytes().await.unwrap_or_default();
            let body = &body[..body.len().min(ERROR_BODY_LIMIT)];
            return Err(DredgerError::Summarizer(format!(
                "ollama returned status {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(body)
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| DredgerError::Summarizer(format!("decode ollama response: {e}")))?;

        let summary = parse_response(&generated.response);
        debug!(tags = summary.tags.len(), "summarized");
        Ok(summary)
    }
}

/// Prompt asking for a short summary and lowercase tags in the `SUMMARY:`/`TAGS:` format.
pub fn build_prompt(title: &str, description: &str, url: &str) -> String {
    format!(
        "You are a bookmark assistant. Given a webpage's title, URL, and description, provide:
1. A concise 2-3 sentence summary of what this page is about and why someone might find it useful.
2. 3-5 relevant tags (single words or short hyphenated phrases, lowercase).

Title: {title}
URL: {url}
Description: {description}

Respond in this exact format:
SUMMARY: <your summary>
TAGS: <tag1>, <tag2>, <tag3>"
    )
}

/// Split a model reply into summary and tags.
///
/// The summary is the text after `SUMMARY:` up to `TAGS:` (or the end). Tags
/// are the comma-separated items on the rest of the `TAGS:` line.
pub fn parse_response(raw: &str) -> Summary {
    const SUMMARY: &str = "SUMMARY:";
    const TAGS: &str = "TAGS:";

    let summary = raw
        .find(SUMMARY)
        .map(|idx| {
            let rest = &raw[idx + SUMMARY.len()..];
            let end = rest.find(TAGS).unwrap_or(rest.len());
            rest[..end].trim().to_string()
        })
        .unwrap_or_default();

    let tags = raw
        .find(TAGS)
        .map(|idx| {
            let rest = raw[idx + TAGS.len()..].trim();
            let line = rest.lines().next().unwrap_or_default();
            line.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Summary { summary, tags }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> OllamaClient {
        OllamaClient::new(
            base_url,
            "gemma3:4b",
            Duration::from_secs(5),
            Duration::from_millis(500),
        )
        .unwrap()
    }

    #[test]
    fn parses_summary_and_tags() {
        let parsed = parse_response("SUMMARY: A tool for X.\nTAGS: cli, go, tools");
        assert_eq!(parsed.summary, "A tool for X.");
        assert_eq!(parsed.tags, vec!["cli", "go", "tools"]);
    }

    #[test]
    fn missing_tags_marker() {
        let parsed = parse_response("SUMMARY: Only a summary here.");
        assert_eq!(parsed.summary, "Only a summary here.");
        assert!(parsed.tags.is_empty());
    }

    #[test]
    fn missing_summary_marker() {
        let parsed = parse_response("Sure! Here you go.\nTAGS: rust, async");
        assert_eq!(parsed.summary, "");
        assert_eq!(parsed.tags, vec!["rust", "async"]);
    }

    #[test]
    fn tags_stop_at_line_end_and_drop_empties() {
        let raw = "SUMMARY:\n  Multi-line\n  summary.\nTAGS:  web, , http ,\nThanks for asking!";
        let parsed = parse_response(raw);
        assert_eq!(parsed.summary, "Multi-line\n  summary.");
        assert_eq!(parsed.tags, vec!["web", "http"]);
    }

    #[test]
    fn empty_reply() {
        assert_eq!(parse_response(""), Summary::default());
    }

    #[test]
    fn prompt_mentions_page() {
        let prompt = build_prompt("Title A", "Desc B", "https://c.example");
        assert!(prompt.contains("Title: Title A"));
        assert!(prompt.contains("URL: https://c.example"));
        assert!(prompt.contains("Description: Desc B"));
        assert!(prompt.ends_with("TAGS: <tag1>, <tag2>, <tag3>"));
    }

    #[tokio::test]
    async fn ping_ok_and_not_ok() {
        let server = MockServer::start().await;
        assert!(!client(&server.uri()).ping().await);

        Mock::given(method("GET"))
            .and(path("/api/version"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"version":"0.6.0"}"#))
            .mount(&server)
            .await;
        assert!(client(&server.uri()).ping().await);
    }

    #[tokio::test]
    async fn ping_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/version"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;
        assert!(!client(&server.uri()).ping().await);
    }

    #[tokio::test]
    async fn ping_unreachable() {
        assert!(!client("http://127.0.0.1:9").ping().await);
    }

    #[tokio::test]
    async fn summarize_posts_generate_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "gemma3:4b",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gemma3:4b",
                "response": "SUMMARY: A crate for HTTP.\nTAGS: rust, http",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let summary = client(&server.uri())
            .summarize("reqwest", "An HTTP client", "https://docs.rs/reqwest")
            .await
            .unwrap();
        assert_eq!(summary.summary, "A crate for HTTP.");
        assert_eq!(summary.tags, vec!["rust", "http"]);
    }

    #[tokio::test]
    async fn summarize_error_status_includes_body_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_string(format!(
                "model not found{}",
                "!".repeat(1000)
            )))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .summarize("t", "d", "https://example.com")
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("ollama returned status 404: model not found"));
        assert_eq!(
            message.len(),
            "ollama returned status 404: ".len() + ERROR_BODY_LIMIT
        );
    }

    #[tokio::test]
    async fn summarize_bad_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .summarize("t", "d", "https://example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, DredgerError::Summarizer(_)));
        assert!(err.to_string().starts_with("decode ollama response"));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let c = client("http://localhost:11434/");
        assert_eq!(c.base_url, "http://localhost:11434");
        assert_eq!(c.model(), "gemma3:4b");
    }
}
