//! Core domain types for bookmarked links.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DredgerError, Result};

// ---------------------------------------------------------------------------
// LinkId
// ---------------------------------------------------------------------------

/// Row identifier of a link in the store. Stable for the lifetime of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub i64);

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LinkId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

// ---------------------------------------------------------------------------
// LinkStatus
// ---------------------------------------------------------------------------

/// The user's triage decision for a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    #[default]
    Unprocessed,
    Saved,
    Pruned,
}

impl LinkStatus {
    /// Integer code stored in the `status` column.
    pub fn code(self) -> i64 {
        match self {
            Self::Unprocessed => 0,
            Self::Saved => 1,
            Self::Pruned => 2,
        }
    }

    /// Decode a `status` column value.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Unprocessed),
            1 => Ok(Self::Saved),
            2 => Ok(Self::Pruned),
            other => Err(DredgerError::validation(format!(
                "unknown link status code {other}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unprocessed => "unprocessed",
            Self::Saved => "saved",
            Self::Pruned => "pruned",
        }
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for LinkStatus {
    type Err = DredgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unprocessed" | "pending" => Ok(Self::Unprocessed),
            "saved" => Ok(Self::Saved),
            "pruned" => Ok(Self::Pruned),
            other => Err(DredgerError::validation(format!(
                "unknown link status '{other}': expected unprocessed, saved, or pruned"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// DredgeState
// ---------------------------------------------------------------------------

/// Progress of the enrichment pipeline for one link. Informational only;
/// independent of [`LinkStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DredgeState {
    #[default]
    None,
    Crawling,
    Crunching,
    Complete,
    Capsized,
}

impl DredgeState {
    /// Integer code stored in the `dredge_state` column.
    pub fn code(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Crawling => 1,
            Self::Crunching => 2,
            Self::Complete => 3,
            Self::Capsized => 4,
        }
    }

    /// Decode a `dredge_state` column value.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Crawling),
            2 => Ok(Self::Crunching),
            3 => Ok(Self::Complete),
            4 => Ok(Self::Capsized),
            other => Err(DredgerError::validation(format!(
                "unknown dredge state code {other}"
            ))),
        }
    }

    /// Label shown next to a link while it is being dredged.
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Crawling => "Crawling...",
            Self::Crunching => "Crunching...",
            Self::Complete => "Complete",
            Self::Capsized => "Capsized",
        }
    }
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

/// A bookmarked URL and everything the dredger has learned about it.
///
/// Empty strings mean "absent" for `title`, `description`, `summary` and
/// `dredge_error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub url: String,
    pub title: String,
    pub description: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub status: LinkStatus,
    /// Set once a crawl result has been persisted for this link.
    pub enriched: bool,
    pub dredge_state: DredgeState,
    pub dredge_error: String,
    pub date_added: DateTime<Utc>,
}

impl Link {
    /// Title for display: the scraped title, or the URL when none was found.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.url
        } else {
            &self.title
        }
    }
}

/// Per-status link counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub unprocessed: usize,
    pub saved: usize,
    pub pruned: usize,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_id_roundtrip() {
        let id = LinkId(42);
        let parsed: LinkId = id.to_string().parse().expect("parse LinkId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn status_codes_are_stable() {
        for status in [LinkStatus::Unprocessed, LinkStatus::Saved, LinkStatus::Pruned] {
            assert_eq!(LinkStatus::from_code(status.code()).unwrap(), status);
        }
        assert_eq!(LinkStatus::Pruned.code(), 2);
        assert!(LinkStatus::from_code(9).is_err());
    }

    #[test]
    fn dredge_state_codes_are_stable() {
        let all = [
            DredgeState::None,
            DredgeState::Crawling,
            DredgeState::Crunching,
            DredgeState::Complete,
            DredgeState::Capsized,
        ];
        for (code, state) in all.into_iter().enumerate() {
            assert_eq!(state.code(), code as i64);
            assert_eq!(DredgeState::from_code(code as i64).unwrap(), state);
        }
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Saved".parse::<LinkStatus>().unwrap(), LinkStatus::Saved);
        assert_eq!("pending".parse::<LinkStatus>().unwrap(), LinkStatus::Unprocessed);
        assert!("archived".parse::<LinkStatus>().is_err());
    }

    #[test]
    fn display_title_falls_back_to_url() {
        let mut link = Link {
            id: LinkId(1),
            url: "https://example.com".into(),
            title: String::new(),
            description: String::new(),
            summary: String::new(),
            tags: vec![],
            status: LinkStatus::Unprocessed,
            enriched: false,
            dredge_state: DredgeState::None,
            dredge_error: String::new(),
            date_added: Utc::now(),
        };
        assert_eq!(link.display_title(), "https://example.com");
        link.title = "Example".into();
        assert_eq!(link.display_title(), "Example");
    }
}
