//! Error types for the dredger.
//!
//! Library crates use [`DredgerError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Every variant renders as a short human-readable sentence: the pipeline
//! stores these strings verbatim as a link's dredge error.

use std::path::PathBuf;

/// Top-level error type for all dredger operations.
#[derive(Debug, thiserror::Error)]
pub enum DredgerError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The request could not be built (malformed URL, bad header) before any byte was sent.
    #[error("create request: {0}")]
    Request(String),

    /// Network/HTTP transport error (DNS, connect, timeout, body read).
    #[error("{0}")]
    Network(String),

    /// Aggregator page fetch or parse failure. Never surfaces as a job failure.
    #[error("resolve error: {0}")]
    Resolve(String),

    /// Summarizer service error (bad status, malformed JSON, transport).
    #[error("{0}")]
    Summarizer(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The surrounding run was cancelled while this operation was in flight.
    #[error("operation cancelled")]
    Cancelled,

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (unknown status code, invalid input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DredgerError>;

impl DredgerError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DredgerError::config("missing home directory");
        assert_eq!(err.to_string(), "config error: missing home directory");

        let err = DredgerError::validation("unknown status 7");
        assert!(err.to_string().contains("unknown status 7"));
    }

    #[test]
    fn transport_errors_display_without_prefix() {
        let err = DredgerError::Network("fetch https://example.com: timed out".into());
        assert_eq!(err.to_string(), "fetch https://example.com: timed out");

        let err = DredgerError::Request("relative URL without a base".into());
        assert_eq!(err.to_string(), "create request: relative URL without a base");

        assert_eq!(DredgerError::Cancelled.to_string(), "operation cancelled");
    }
}
