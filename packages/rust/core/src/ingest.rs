//! Importing URLs from free-form text (bookmark exports, notes, chat logs).

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, instrument};

use dredger_shared::{DredgerError, Result};
use dredger_storage::Storage;

/// Characters stripped from the end of a match: sentence punctuation, not URL syntax.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?'];

/// Outcome of [`import_file`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Distinct URLs found in the file.
    pub found: usize,
    pub inserted: usize,
    /// Already stored.
    pub skipped: usize,
}

/// Every distinct `http(s)` URL in `text`, in order of first appearance.
pub fn extract_urls(text: &str) -> Vec<String> {
    static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"https?://[^\s<>"'`)\]}]+"#).expect("valid regex")
    });

    let mut seen = HashSet::new();
    URL_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(TRAILING_PUNCTUATION))
        .filter(|url| seen.insert(*url))
        .map(String::from)
        .collect()
}

/// Read `path`, extract its URLs and store the new ones.
#[instrument(skip(storage, path), fields(path = %path.display()))]
pub async fn import_file(storage: &Storage, path: &Path) -> Result<ImportStats> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| DredgerError::io(path, e))?;
    let text = String::from_utf8_lossy(&bytes);

    let urls = extract_urls(&text);
    let (inserted, skipped) = storage.insert_urls(&urls).await?;

    let stats = ImportStats {
        found: urls.len(),
        inserted,
        skipped,
    };
    info!(found = stats.found, inserted, skipped, "import complete");
    Ok(stats)
}
