//! Error types for revindex.
//!
//! Library crates use [`IndexerError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::ValidatorCode;

/// Top-level error type for all indexing operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Event-source failure (indexed-query endpoint or chain RPC).
    #[error("adapter error: {0}")]
    Adapter(String),

    /// Content gateway unreachable or returned a malformed payload.
    #[error("fetch error for {content_id}: {message}")]
    Fetch { content_id: String, message: String },

    /// The payload failed one of the validator rules.
    #[error("payload rejected: {code}")]
    Rejected { code: ValidatorCode },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Notification or revalidation side effect failed.
    #[error("side effect error: {0}")]
    SideEffect(String),

    /// Decoding error (ABI data, JSON-RPC quantities, timestamps).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, IndexerError>;

impl IndexerError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a fetch error for a content id.
    pub fn fetch(content_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            content_id: content_id.into(),
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

    /// Short label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Adapter(_) => "adapter",
            Self::Fetch { .. } => "fetch",
            Self::Rejected { .. } => "rejected",
            Self::Storage(_) => "storage",
            Self::SideEffect(_) => "side_effect",
            Self::Parse { .. } => "parse",
            Self::Io { .. } => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = IndexerError::config("missing gateway url");
        assert_eq!(err.to_string(), "config error: missing gateway url");

        let err = IndexerError::fetch("QmAbc", "HTTP 504");
        assert!(err.to_string().contains("QmAbc"));
        assert!(err.to_string().contains("504"));
    }

    #[test]
    fn rejection_carries_code() {
        let err = IndexerError::Rejected {
            code: ValidatorCode::Words,
        };
        assert_eq!(err.to_string(), "payload rejected: WORDS");
        assert_eq!(err.kind(), "rejected");
    }
}
