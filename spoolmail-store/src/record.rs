use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One queued message for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Stable identifier assigned by the store
    pub id: i64,
    /// The full raw message, headers and body
    pub mail: String,
    /// Envelope sender
    pub from_address: String,
    /// Envelope recipient
    pub to_address: String,
    /// Unix timestamp of the last failed delivery attempt, 0 if never attempted
    pub last_send_attempt: i64,
    /// Unix timestamp the record was queued at, if the schema records one
    pub created_on: Option<i64>,
}

impl EmailRecord {
    /// Whether delivery of this record has failed at least once
    #[must_use]
    pub const fn was_attempted(&self) -> bool {
        self.last_send_attempt > 0
    }

    /// Size of the raw message in bytes
    #[must_use]
    pub const fn size(&self) -> usize {
        self.mail.len()
    }

    #[must_use]
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created_on
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    #[must_use]
    pub fn last_attempted(&self) -> Option<DateTime<Utc>> {
        if self.was_attempted() {
            DateTime::from_timestamp(self.last_send_attempt, 0)
        } else {
            None
        }
    }
}

/// Fields for a record that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmail {
    pub mail: String,
    pub from_address: String,
    pub to_address: String,
    pub created_on: i64,
}

impl NewEmail {
    pub(crate) fn into_record(self, id: i64) -> EmailRecord {
        EmailRecord {
            id,
            mail: self.mail,
            from_address: self.from_address,
            to_address: self.to_address,
            last_send_attempt: 0,
            created_on: Some(self.created_on),
        }
    }
}

/// Predicate selecting records from a queue store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Every record
    All,
    /// Records whose last attempt is older than `attempted_before`
    /// (never attempted records always match)
    Deliverable { attempted_before: i64 },
    /// Records attempted at least once and created before `created_before`
    Expired { created_before: i64 },
}

impl Filter {
    #[must_use]
    pub fn matches(&self, email: &EmailRecord) -> bool {
        match *self {
            Self::All => true,
            Self::Deliverable { attempted_before } => email.last_send_attempt < attempted_before,
            Self::Expired { created_before } => {
                email.was_attempted()
                    && email
                        .created_on
                        .is_some_and(|created| created < created_before)
            }
        }
    }
}
