//! Async SMTP client used to hand queued mail to a relay.
//!
//! Supports plain TCP with optional STARTTLS upgrade, AUTH PLAIN and AUTH
//! LOGIN, and classifies refused replies the way the delivery engine needs
//! them (see [`ClientError::from_reply`]).

mod client;
mod error;
mod response;

pub use client::{SmtpClient, dot_stuff};
pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
