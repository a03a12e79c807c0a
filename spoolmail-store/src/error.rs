//! Error types for the spoolmail-store crate.

use thiserror::Error;

/// Errors raised by queue store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database rejected or failed a query.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The record no longer exists in the queue.
    #[error("Email not found: {0}")]
    NotFound(i64),

    /// The configured table name cannot be used as an SQL identifier.
    #[error("Invalid table name: {0:?}")]
    InvalidTableName(String),

    /// A message handed to `enqueue` could not be parsed.
    #[error("Invalid message: {0}")]
    Message(#[from] mailparse::MailParseError),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Specialized `Result` type for queue store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}
