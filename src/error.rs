//! Error types for cache, coordinator and usage operations
//!
//! The error type is `Clone` because a single outcome of a deduplicated or
//! debounced call is handed to every caller that shared it.

use std::sync::Arc;
use thiserror::Error;

/// Main error type for gencache operations
#[derive(Error, Debug, Clone)]
pub enum GenCacheError {
    /// The expensive operation itself failed; shared verbatim with every waiter
    #[error("Operation failed: {0}")]
    Operation(Arc<anyhow::Error>),

    /// Persistent tier read/write/remove/list failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Persistent tier refused the write because it is full
    #[error("Storage quota exceeded: limit is {limit_bytes} bytes")]
    QuotaExceeded { limit_bytes: usize },

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The task driving an operation panicked or was torn down
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// A debounced call was cancelled before it fired
    #[error("Debounced call cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for gencache operations
pub type Result<T> = std::result::Result<T, GenCacheError>;

impl GenCacheError {
    /// Wrap a business error coming out of an operation
    pub fn operation(err: anyhow::Error) -> Self {
        GenCacheError::Operation(Arc::new(err))
    }

    /// Whether this error came from the operation rather than from gencache itself
    pub fn is_operation(&self) -> bool {
        matches!(self, GenCacheError::Operation(_))
    }
}

impl From<String> for GenCacheError {
    fn from(s: String) -> Self {
        GenCacheError::Other(s)
    }
}

impl From<&str> for GenCacheError {
    fn from(s: &str) -> Self {
        GenCacheError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for GenCacheError {
    fn from(e: serde_json::Error) -> Self {
        GenCacheError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for GenCacheError {
    fn from(e: std::io::Error) -> Self {
        GenCacheError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = GenCacheError::Storage("disk full".to_string());
        assert_eq!(error.to_string(), "Storage error: disk full");

        let quota = GenCacheError::QuotaExceeded { limit_bytes: 1024 };
        assert!(quota.to_string().contains("1024 bytes"));

        let op = GenCacheError::operation(anyhow::anyhow!("backend returned 503"));
        assert_eq!(op.to_string(), "Operation failed: backend returned 503");
        assert!(op.is_operation());
    }

    #[test]
    fn test_error_conversion() {
        let error: GenCacheError = "test error".into();
        assert!(matches!(error, GenCacheError::Other(_)));

        let error: GenCacheError = "test error".to_string().into();
        assert!(matches!(error, GenCacheError::Other(_)));

        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let error: GenCacheError = json_err.into();
        assert!(matches!(error, GenCacheError::Serialization(_)));
    }

    #[test]
    fn test_operation_error_is_shared_on_clone() {
        let error = GenCacheError::operation(anyhow::anyhow!("boom"));
        let cloned = error.clone();

        match (&error, &cloned) {
            (GenCacheError::Operation(a), GenCacheError::Operation(b)) => {
                assert!(Arc::ptr_eq(a, b));
            }
            _ => panic!("expected operation errors"),
        }
    }
}
