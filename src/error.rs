//! Error types for the sync pipeline.

use thiserror::Error;

/// Main error type for sync operations.
///
/// In incremental mode, `Parse`, `Store`, and `Gateway` errors are isolated
/// to the document that produced them; the pass continues and reports them at
/// the end. `Invariant` errors indicate a bug and abort the pass.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Malformed markup in one document; fatal for that document only.
    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },

    /// A state that must never occur under correct input. Aborts the pass.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// Persistent store failure.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Embedding gateway failure. No section is written without a vector.
    #[error("embedding gateway error: {0}")]
    Gateway(String),

    /// I/O error while reading source files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Whether this error may be isolated to a single document in an
    /// incremental pass. Invariant violations always abort.
    pub fn is_isolable(&self) -> bool {
        !matches!(self, SyncError::Invariant(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = SyncError::Parse {
            path: "guide/usage.mdx".to_string(),
            message: "unterminated code fence".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "parse error in guide/usage.mdx: unterminated code fence"
        );
    }

    #[test]
    fn test_invariant_not_isolable() {
        let err = SyncError::Invariant("two classifications for one path".to_string());
        assert!(!err.is_isolable());
    }

    #[test]
    fn test_gateway_error_isolable() {
        let err = SyncError::Gateway("HTTP 500".to_string());
        assert!(err.is_isolable());
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_store_error_from_sqlx() {
        let err: SyncError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, SyncError::Store(_)));
    }
}
