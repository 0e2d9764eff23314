//! Enrichment pipeline and ingestion for the dredger.
//!
//! This crate ties together resolving, crawling, scraping and summarizing
//! into the [`Dredger`] worker pool, plus URL import from text files.

pub mod dredge;
pub mod ingest;
pub mod summarizer;

pub use dredge::{DredgeResult, Dredger, Job};
pub use ingest::{ImportStats, extract_urls, import_file};
pub use summarizer::{OllamaClient, Summary, parse_response};
