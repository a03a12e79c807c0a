//! Delivery side of spoolmail: drains the queue store through an SMTP relay
//!
//! - `processor::cleanup`: expires emails that kept failing
//! - `processor::fetch`: picks the next batch, honouring the retry cool-down
//! - `processor::delivery`: sends a batch through one relay session
//! - `processor`: the loop tying them together

pub mod config;
mod error;
pub mod mailq;
pub mod processor;
pub mod transport;

pub use config::{AuthMode, MailerConfig, SendmailConfig, SmtpTimeouts};
pub use error::{DeliveryError, FailureClass};
pub use processor::{
    Sendmail,
    delivery::{DeliveryEngine, DeliveryReport, Halt, MAX_AUTH_FAILURES},
    fetch::RETRY_COOLDOWN_SECS,
};
pub use transport::{Session, SmtpTransport, Transport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
