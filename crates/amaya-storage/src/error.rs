//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No conversation with this id
    #[error("Conversation not found: {0}")]
    NotFound(String),

    /// Invalid id format
    #[error("Invalid conversation id: {0}")]
    InvalidId(String),

    /// Lock was poisoned (another thread panicked while holding the lock)
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StorageError {
    /// Create a not found error for the given id.
    pub fn not_found(id: &str) -> Self {
        Self::NotFound(id.to_string())
    }

    /// Create an invalid id error.
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_formats_id() {
        let err = StorageError::not_found("conv_01abc");
        assert_eq!(err.to_string(), "Conversation not found: conv_01abc");
    }

    #[test]
    fn io_error_converts() {
        let err: StorageError = std::io::Error::other("disk full").into();
        assert!(err.to_string().starts_with("IO error"));
    }
}
