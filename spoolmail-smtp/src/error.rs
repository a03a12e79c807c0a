//! Error types for the SMTP client.

use std::io;

use thiserror::Error;

use crate::Response;

/// Errors that can occur when talking to a relay.
///
/// Replies the relay refused are split into five classes by their status
/// code, see [`ClientError::from_reply`].
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A protocol step did not complete in time.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// TLS/SSL error occurred.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Failed to parse an SMTP response from the server.
    #[error("Failed to parse SMTP response: {0}")]
    Parse(String),

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// The client was asked to do something its configuration does not allow.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// 4xx: the relay is temporarily unable to take the request.
    #[error("Server busy: {0}")]
    ServerBusy(Response),

    /// 50x: the relay did not understand the command.
    #[error("Syntax error: {0}")]
    Syntax(Response),

    /// 53x, or any refused AUTH exchange.
    #[error("Authentication failed: {0}")]
    Authentication(Response),

    /// Any other 5xx: the relay permanently refused the request.
    #[error("Fatal error: {0}")]
    Fatal(Response),

    /// A reply outside the classes above.
    #[error("Unexpected reply: {0}")]
    Unknown(Response),
}

impl ClientError {
    /// Classify a reply the relay used to refuse a request
    #[must_use]
    pub fn from_reply(response: Response) -> Self {
        match response.code {
            400..=499 => Self::ServerBusy(response),
            500..=509 => Self::Syntax(response),
            530..=539 => Self::Authentication(response),
            500..=599 => Self::Fatal(response),
            _ => Self::Unknown(response),
        }
    }

    /// The relay reply behind this error, if there is one
    #[must_use]
    pub const fn response(&self) -> Option<&Response> {
        match self {
            Self::ServerBusy(response)
            | Self::Syntax(response)
            | Self::Authentication(response)
            | Self::Fatal(response)
            | Self::Unknown(response) => Some(response),
            _ => None,
        }
    }
}

impl From<std::str::Utf8Error> for ClientError {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
