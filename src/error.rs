//! Error types for the zmem memory engine
//!
//! All fallible operations return [`Result`], and every error that crosses
//! the tool-server boundary is mapped to one of the stable taxonomy codes
//! via [`ZmemError::code`].

use thiserror::Error;

/// Main error type for zmem operations
#[derive(Error, Debug)]
pub enum ZmemError {
    /// Input failed schema or range validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced item does not exist in the current workspace
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation conflicts with the current lifecycle state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Embedding provider failed or returned an incomplete batch
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Metadata-store or vector-store read/write failed
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration file or value is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Tool-server protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias for zmem operations
pub type Result<T> = std::result::Result<T, ZmemError>;

impl ZmemError {
    /// Stable taxonomy code surfaced to tool-server clients.
    ///
    /// Internal variants (config, I/O, serialization, protocol) collapse
    /// into `DATABASE`: from a caller's perspective they are engine faults,
    /// not input faults.
    pub fn code(&self) -> &'static str {
        match self {
            ZmemError::Validation(_) => "VALIDATION",
            ZmemError::NotFound(_) => "NOT_FOUND",
            ZmemError::Conflict(_) => "CONFLICT",
            ZmemError::Embedding(_) => "EMBEDDING",
            ZmemError::Database(_)
            | ZmemError::Config(_)
            | ZmemError::Io(_)
            | ZmemError::Serialization(_)
            | ZmemError::Protocol(_) => "DATABASE",
        }
    }
}

impl From<sqlx::Error> for ZmemError {
    fn from(err: sqlx::Error) -> Self {
        ZmemError::Database(err.to_string())
    }
}

impl From<rusqlite::Error> for ZmemError {
    fn from(err: rusqlite::Error) -> Self {
        ZmemError::Database(err.to_string())
    }
}

impl From<anyhow::Error> for ZmemError {
    fn from(err: anyhow::Error) -> Self {
        ZmemError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ZmemError::NotFound("item-42".to_string());
        assert_eq!(err.to_string(), "Not found: item-42");
    }

    #[test]
    fn test_taxonomy_codes() {
        assert_eq!(ZmemError::Validation("x".into()).code(), "VALIDATION");
        assert_eq!(ZmemError::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(ZmemError::Conflict("x".into()).code(), "CONFLICT");
        assert_eq!(ZmemError::Embedding("x".into()).code(), "EMBEDDING");
        assert_eq!(ZmemError::Database("x".into()).code(), "DATABASE");
        assert_eq!(ZmemError::Config("x".into()).code(), "DATABASE");
    }
}
