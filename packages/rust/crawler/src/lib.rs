//! Page fetching, metadata scraping, and aggregator resolution.
//!
//! This crate provides:
//! - [`Fetcher`]: bounded, timeout-guarded HTTP GET with a custom User-Agent
//! - [`scrape_metadata`]: single-pass title/description extraction
//! - [`resolvers`]: aggregator resolvers and the [`ResolverRegistry`]

pub mod fetch;
mod html;
pub mod resolvers;
pub mod scrape;

pub use fetch::{FetchedBody, Fetcher};
pub use resolvers::{AggregatorResolver, HackerNewsResolver, Resolution, ResolverRegistry};
pub use scrape::{PageMeta, scrape_metadata};
