//! Bounded HTTP GET shared by page crawls and aggregator resolvers.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use dredger_shared::{DredgeConfig, DredgerError, Result};

/// Body of one fetched page, already capped to the fetcher's byte limit.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub body: Vec<u8>,
    /// The response was longer than the cap and was cut short.
    pub truncated: bool,
}

impl FetchedBody {
    /// Body as text; invalid UTF-8 is replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client with a fixed User-Agent, request timeout and body cap.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    max_body_bytes: usize,
}

impl Fetcher {
    pub fn new(user_agent: &str, timeout: Duration, max_body_bytes: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| DredgerError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_body_bytes,
        })
    }

    pub fn from_config(config: &DredgeConfig) -> Result<Self> {
        Self::new(
            &config.user_agent,
            config.fetch_timeout,
            config.max_body_bytes,
        )
    }

    /// GET `url` and read at most `max_body_bytes` of the body.
    ///
    /// Non-2xx responses are not errors: error pages still carry a title.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<FetchedBody> {
        let parsed = Url::parse(url).map_err(|e| DredgerError::Request(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DredgerError::Request(format!(
                "{url}: unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| DredgerError::Network(format!("fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "non-success status, parsing body anyway");
        }
        let final_url = response.url().clone();

        let mut body = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| DredgerError::Network(format!("fetch {url}: body read failed: {e}")))?
        {
            let room = self.max_body_bytes - body.len();
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }

        debug!(status = status.as_u16(), bytes = body.len(), truncated, "fetched");

        Ok(FetchedBody {
            url: final_url,
            status: status.as_u16(),
            body,
            truncated,
        })
    }
}
