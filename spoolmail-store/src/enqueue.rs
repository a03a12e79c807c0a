//! Mailer integration: turning an outgoing message into queue records

use mailparse::{MailAddr, MailHeaderMap};
use tracing::debug;

use crate::{EmailRecord, NewEmail, QueueStore};

/// Anything that can be placed on the queue
///
/// Implemented by whatever the application uses to build outgoing mail; the
/// queue only needs the envelope addresses and the raw message text.
pub trait Enqueueable {
    /// Envelope sender candidates. Only the first is used.
    fn senders(&self) -> Vec<String>;

    /// Every envelope recipient
    fn recipients(&self) -> Vec<String>;

    /// The full message, headers and body
    fn raw_message(&self) -> String;
}

/// Queue `message`, one record per recipient
///
/// A message without a sender is queued with an empty reverse-path.
///
/// # Errors
/// If a record cannot be created. Records created before the failure stay
/// queued.
pub async fn enqueue<M>(store: &dyn QueueStore, message: &M) -> crate::Result<Vec<EmailRecord>>
where
    M: Enqueueable + Sync + ?Sized,
{
    let mail = message.raw_message();
    let from_address = message.senders().into_iter().next().unwrap_or_default();
    let created_on = chrono::Utc::now().timestamp();

    let mut queued = Vec::new();
    for to_address in message.recipients() {
        let record = store
            .create(NewEmail {
                mail: mail.clone(),
                from_address: from_address.clone(),
                to_address,
                created_on,
            })
            .await?;

        debug!(
            id = record.id,
            from = %record.from_address,
            to = %record.to_address,
            "Queued email"
        );
        queued.push(record);
    }

    Ok(queued)
}

/// An RFC 5322 message whose envelope is taken from its own headers
///
/// Senders come from `From`, recipients from `To` followed by `Cc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    message: String,
    senders: Vec<String>,
    recipients: Vec<String>,
}

impl RawMessage {
    /// # Errors
    /// If the headers or any address list cannot be parsed
    pub fn parse(message: impl Into<String>) -> crate::Result<Self> {
        let message = message.into();
        let (headers, _) = mailparse::parse_headers(message.as_bytes())?;

        let addresses = |name: &str| -> crate::Result<Vec<String>> {
            let mut found = Vec::new();
            for header in headers.get_all_headers(name) {
                for addr in mailparse::addrparse_header(header)?.iter() {
                    match addr {
                        MailAddr::Single(single) => found.push(single.addr.clone()),
                        MailAddr::Group(group) => {
                            found.extend(group.addrs.iter().map(|single| single.addr.clone()));
                        }
                    }
                }
            }
            Ok(found)
        };

        let senders = addresses("From")?;
        let mut recipients = addresses("To")?;
        recipients.extend(addresses("Cc")?);

        Ok(Self {
            message,
            senders,
            recipients,
        })
    }
}

impl Enqueueable for RawMessage {
    fn senders(&self) -> Vec<String> {
        self.senders.clone()
    }

    fn recipients(&self) -> Vec<String> {
        self.recipients.clone()
    }

    fn raw_message(&self) -> String {
        self.message.clone()
    }
}
