//! Typed error handling for delivery operations.
//!
//! A refused or failed SMTP exchange is reduced to a [`FailureClass`], which
//! decides what happens to the email and to the rest of the batch.

use spoolmail_smtp::ClientError;
use spoolmail_store::StoreError;
use thiserror::Error;

/// Errors that end a tick early.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The queue store could not be read or modified.
    #[error("Queue store error: {0}")]
    Store(#[from] StoreError),

    /// The relay session failed in a way the engine does not retry within
    /// the tick.
    #[error("SMTP session failed: {0}")]
    Session(#[from] ClientError),

    /// The relay kept refusing our credentials.
    #[error("Authentication failed {attempts} times in a row: {source}")]
    AuthenticationExhausted {
        attempts: u32,
        #[source]
        source: ClientError,
    },
}

impl DeliveryError {
    /// Returns `true` if the daemon must stop rather than try again next tick.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthenticationExhausted { .. })
    }
}

/// What a failed exchange means for the email being sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The relay rejected the message outright. Drop it.
    Permanent,
    /// The relay is overloaded. Back off and leave the rest of the batch.
    ServerBusy,
    /// Unclear failure. Record the attempt and retry after the cool-down.
    Transient,
    /// Our credentials were refused.
    Authentication,
    /// The connection itself is gone.
    Connection,
}

impl From<&ClientError> for FailureClass {
    fn from(error: &ClientError) -> Self {
        match error {
            ClientError::Fatal(_) => Self::Permanent,
            ClientError::ServerBusy(_) => Self::ServerBusy,
            ClientError::Authentication(_) => Self::Authentication,
            ClientError::Io(_) | ClientError::ConnectionClosed | ClientError::Tls(_) => {
                Self::Connection
            }
            ClientError::Syntax(_)
            | ClientError::Unknown(_)
            | ClientError::Timeout(_)
            | ClientError::Parse(_)
            | ClientError::Config(_) => Self::Transient,
        }
    }
}
