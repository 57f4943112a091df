//! Error types for the retention engine

use thiserror::Error;

use crate::types::MemoryId;

/// Result type alias for retention operations
pub type Result<T> = std::result::Result<T, RetentionError>;

/// Main error type for the retention engine
///
/// Refusing to prune for safety is not an error: see
/// [`PruneResult`](crate::types::PruneResult) and
/// [`AbortReason`](crate::types::AbortReason).
#[derive(Error, Debug)]
pub enum RetentionError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Memory not found: {0}")]
    NotFound(MemoryId),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RetentionError {
    /// Whether the error originated in the memory store
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            RetentionError::StoreUnavailable(_) | RetentionError::Database(_)
        )
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RetentionError::StoreUnavailable(_) => true,
            RetentionError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Short machine-readable error kind, used in telemetry and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            RetentionError::Validation(_) => "validation",
            RetentionError::StoreUnavailable(_) | RetentionError::Database(_) => {
                "store_unavailable"
            }
            RetentionError::NotFound(_) => "not_found",
            RetentionError::Config(_) | RetentionError::TomlParse(_) => "config",
            RetentionError::Serialization(_) => "serialization",
            RetentionError::Io(_) => "io",
            RetentionError::Scheduler(_) => "scheduler",
            RetentionError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_failure_classification() {
        assert!(RetentionError::StoreUnavailable("down".into()).is_store_failure());
        assert!(RetentionError::Database(rusqlite::Error::QueryReturnedNoRows).is_store_failure());
        assert!(!RetentionError::Validation("negative elapsed".into()).is_store_failure());
    }

    #[test]
    fn test_retryable() {
        assert!(RetentionError::StoreUnavailable("timeout".into()).is_retryable());
        assert!(!RetentionError::Validation("bad".into()).is_retryable());
        assert!(!RetentionError::NotFound(7).is_retryable());
    }

    #[test]
    fn test_kind() {
        assert_eq!(RetentionError::Validation("x".into()).kind(), "validation");
        assert_eq!(
            RetentionError::StoreUnavailable("x".into()).kind(),
            "store_unavailable"
        );
    }
}
