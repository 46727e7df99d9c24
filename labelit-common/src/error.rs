//! Common error types for LabelIt

use thiserror::Error;

/// Common result type for LabelIt operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the LabelIt service
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user-supplied data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Username uniqueness violation at registration
    #[error("Duplicate user: {0}")]
    DuplicateUser(String),

    /// Credential mismatch
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Unsupported or corrupt image upload
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Filesystem fault in the image store
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O fault during bulk export
    #[error("Export error: {0}")]
    Export(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
