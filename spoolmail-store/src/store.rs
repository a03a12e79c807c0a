use async_trait::async_trait;

use crate::{EmailRecord, Filter, NewEmail, Result};

/// Persistent storage for queued email records
///
/// The delivery daemon assumes it is the only consumer of a store: records
/// fetched into a batch are not marked in-flight.
#[async_trait]
pub trait QueueStore: Send + Sync + std::fmt::Debug {
    /// Store a new record, assigning its id
    ///
    /// # Errors
    /// If the record cannot be written
    async fn create(&self, email: NewEmail) -> Result<EmailRecord>;

    /// Records matching `filter`, ordered by id, at most `limit` of them
    ///
    /// # Errors
    /// If the store cannot be queried
    async fn find(&self, filter: &Filter, limit: Option<usize>) -> Result<Vec<EmailRecord>>;

    /// Delete every record matching `filter`, returning what was deleted
    ///
    /// # Errors
    /// If the store cannot be modified
    async fn destroy_all(&self, filter: &Filter) -> Result<Vec<EmailRecord>>;

    /// Delete a single record. Deleting a record that is already gone succeeds.
    ///
    /// # Errors
    /// If the store cannot be modified
    async fn destroy(&self, email: &EmailRecord) -> Result<()>;

    /// Persist changes to an existing record
    ///
    /// # Errors
    /// If the record no longer exists or the store cannot be modified
    async fn save(&self, email: &EmailRecord) -> Result<()>;
}
