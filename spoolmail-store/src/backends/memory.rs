use std::{
    collections::BTreeMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicI64, Ordering},
    },
};

use async_trait::async_trait;

use crate::{EmailRecord, Filter, NewEmail, QueueStore, StoreError};

/// In-memory queue store
///
/// Records live in a `BTreeMap` keyed by id, so iteration is already in the
/// order `find` must return. Intended for tests and for embedding the daemon
/// next to an application that does not need durability.
#[derive(Debug, Clone)]
pub struct MemoryQueueStore {
    emails: Arc<RwLock<BTreeMap<i64, EmailRecord>>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryQueueStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            emails: Arc::new(RwLock::new(BTreeMap::new())),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Insert a record as-is, keeping its id and timestamps
    ///
    /// Useful for seeding a queue with records in a given state.
    ///
    /// # Errors
    /// If the lock is poisoned
    pub fn insert(&self, email: EmailRecord) -> crate::Result<()> {
        self.next_id.fetch_max(email.id + 1, Ordering::SeqCst);
        self.emails.write()?.insert(email.id, email);
        Ok(())
    }

    /// Look up a record by id
    ///
    /// # Errors
    /// If the lock is poisoned
    pub fn get(&self, id: i64) -> crate::Result<Option<EmailRecord>> {
        Ok(self.emails.read()?.get(&id).cloned())
    }

    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.emails
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn create(&self, email: NewEmail) -> crate::Result<EmailRecord> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = email.into_record(id);
        self.emails.write()?.insert(id, record.clone());
        Ok(record)
    }

    async fn find(&self, filter: &Filter, limit: Option<usize>) -> crate::Result<Vec<EmailRecord>> {
        let emails = self.emails.read()?;
        let matching = emails.values().filter(|email| filter.matches(email)).cloned();

        Ok(match limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn destroy_all(&self, filter: &Filter) -> crate::Result<Vec<EmailRecord>> {
        let mut emails = self.emails.write()?;
        let doomed: Vec<i64> = emails
            .values()
            .filter(|email| filter.matches(email))
            .map(|email| email.id)
            .collect();

        Ok(doomed
            .into_iter()
            .filter_map(|id| emails.remove(&id))
            .collect())
    }

    async fn destroy(&self, email: &EmailRecord) -> crate::Result<()> {
        self.emails.write()?.remove(&email.id);
        Ok(())
    }

    async fn save(&self, email: &EmailRecord) -> crate::Result<()> {
        let mut emails = self.emails.write()?;
        let stored = emails
            .get_mut(&email.id)
            .ok_or(StoreError::NotFound(email.id))?;
        stored.clone_from(email);
        Ok(())
    }
}
