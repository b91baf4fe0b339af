//! Store error types

use thiserror::Error;

/// Result type alias for repository operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the profile and task stores
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database failed or is unreachable
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No free resource (proxy) is left to satisfy the request
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The record exists but belongs to someone else
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A stored value could not be mapped back to a domain type
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Returns true for errors that will not go away by retrying
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::ResourceExhausted(_) | Self::Conflict(_))
    }
}

/// Returns true if the database rejected a write on a unique constraint
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
