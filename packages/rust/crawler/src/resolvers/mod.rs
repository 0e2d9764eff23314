//! Aggregator resolvers: turn a discussion-page link into the article it points at.
//!
//! Resolvers are tried in registration order; the first one whose
//! [`AggregatorResolver::matches`] returns `true` handles the URL. Resolution
//! is best effort. A resolver error, or a page with no external article, falls
//! back to the original URL and is never surfaced to the caller.

mod hacker_news;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use dredger_shared::Result;

use crate::fetch::Fetcher;

pub use hacker_news::{
    HN_HOST, HackerNewsResolver, HnItemPage, MAX_COMMENT_CHARS, MAX_COMMENTS, TitleLink,
    parse_item_page,
};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Outcome of running a URL through the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// URL to crawl: the article, or the original URL when not resolved.
    pub url: String,
    /// `url` differs from the original and came from an aggregator page.
    pub resolved: bool,
    /// Discussion comments scraped alongside the article link.
    pub comments: Vec<String>,
}

impl Resolution {
    /// The original URL, unchanged and without comments.
    pub fn unresolved(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            resolved: false,
            comments: Vec::new(),
        }
    }
}

/// A site-specific strategy for finding the article behind an aggregator link.
#[async_trait]
pub trait AggregatorResolver: Send + Sync {
    /// Human-readable resolver name for tracing.
    fn name(&self) -> &str;

    /// Whether this resolver handles `url`. Must not do I/O.
    fn matches(&self, url: &Url) -> bool;

    /// Fetch and parse the aggregator page.
    async fn resolve(&self, fetcher: &Fetcher, url: &Url) -> Result<Resolution>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds registered resolvers in priority order.
pub struct ResolverRegistry {
    resolvers: Vec<Box<dyn AggregatorResolver>>,
}

impl ResolverRegistry {
    /// Create a registry with all built-in resolvers.
    pub fn new() -> Self {
        Self::with_resolvers(vec![Box::new(HackerNewsResolver::new())])
    }

    pub fn with_resolvers(resolvers: Vec<Box<dyn AggregatorResolver>>) -> Self {
        Self { resolvers }
    }

    /// Resolve `raw_url` with the first matching resolver. Never fails.
    pub async fn resolve(&self, fetcher: &Fetcher, raw_url: &str) -> Resolution {
        let Ok(url) = Url::parse(raw_url) else {
            return Resolution::unresolved(raw_url);
        };

        let Some(resolver) = self.resolvers.iter().find(|r| r.matches(&url)) else {
            return Resolution::unresolved(raw_url);
        };

        match resolver.resolve(fetcher, &url).await {
            Ok(resolution) if resolution.resolved => {
                debug!(
                    resolver = resolver.name(),
                    from = raw_url,
                    to = %resolution.url,
                    comments = resolution.comments.len(),
                    "resolved aggregator link"
                );
                resolution
            }
            Ok(_) => {
                debug!(
                    resolver = resolver.name(),
                    url = raw_url,
                    "no article link, using original"
                );
                Resolution::unresolved(raw_url)
            }
            Err(e) => {
                debug!(
                    resolver = resolver.name(),
                    url = raw_url,
                    error = %e,
                    "resolve failed, using original"
                );
                Resolution::unresolved(raw_url)
            }
        }
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
