//! Expiring emails that have been failing for too long

use chrono::Utc;
use spoolmail_store::{Filter, QueueStore};
use tracing::info;

use crate::error::DeliveryError;

/// Delete every email that was attempted at least once and was queued more
/// than `max_age` seconds ago. Emails that were never attempted are kept
/// regardless of age. `max_age == 0` disables cleanup.
///
/// # Errors
/// If the queue store cannot be modified
#[tracing::instrument(level = "trace", skip(store), ret, err)]
pub async fn cleanup(store: &dyn QueueStore, max_age: u64) -> Result<usize, DeliveryError> {
    if max_age == 0 {
        return Ok(0);
    }

    let max_age = i64::try_from(max_age).unwrap_or(i64::MAX);
    let cutoff = Utc::now().timestamp().saturating_sub(max_age);

    let expired = store
        .destroy_all(&Filter::Expired {
            created_before: cutoff,
        })
        .await?;

    info!("expired {} emails from the queue", expired.len());
    Ok(expired.len())
}
