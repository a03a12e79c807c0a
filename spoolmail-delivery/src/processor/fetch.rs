//! Selecting the next batch of emails to deliver

use chrono::Utc;
use spoolmail_store::{EmailRecord, Filter, QueueStore};
use tracing::info;

use crate::error::DeliveryError;

/// Seconds an email rests after a failed attempt before it is retried
pub const RETRY_COOLDOWN_SECS: i64 = 300;

/// Emails not attempted within the last [`RETRY_COOLDOWN_SECS`], oldest id
/// first, at most `batch_size` of them
///
/// # Errors
/// If the queue store cannot be queried
#[tracing::instrument(level = "trace", skip(store), err)]
pub async fn find_emails(
    store: &dyn QueueStore,
    batch_size: Option<usize>,
) -> Result<Vec<EmailRecord>, DeliveryError> {
    let filter = Filter::Deliverable {
        attempted_before: Utc::now().timestamp() - RETRY_COOLDOWN_SECS,
    };

    let emails = store.find(&filter, batch_size).await?;

    info!("found {} emails to send", emails.len());
    Ok(emails)
}
