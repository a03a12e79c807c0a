//! Streaming a batch through one relay session

use std::{collections::VecDeque, sync::Arc, time::Duration};

use chrono::Utc;
use spoolmail_smtp::ClientError;
use spoolmail_store::{EmailRecord, QueueStore};
use tracing::{debug, error, info, warn};

use crate::{
    error::{DeliveryError, FailureClass},
    transport::{Session, Transport},
};

/// Consecutive refused logins that are retried on the next tick
///
/// Refusals 1 and 2 sleep and retry. Refusal 3 is fatal, i.e. the check is
/// `failed_auth_count > MAX_AUTH_FAILURES`, not `>=`.
pub const MAX_AUTH_FAILURES: u32 = 2;

/// Why a batch was left before it was drained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// The relay said it was busy. Mid-batch the engine already slept for the
    /// delay. When opening the session it did not.
    ServerBusy,
    /// The relay refused our credentials. The engine already slept for the delay.
    Authentication,
    /// The connection failed or was refused outside a single send.
    Connection,
}

/// Outcome of one [`DeliveryEngine::deliver`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Accepted by the relay and removed from the queue
    pub sent: usize,
    /// Permanently rejected and removed from the queue
    pub rejected: usize,
    /// Failed for now, attempt time recorded
    pub deferred: usize,
    /// Left in the queue untouched
    pub remaining: usize,
    pub halted: Option<Halt>,
}

/// Sends batches of queued emails, one relay session per batch
///
/// The only state kept between batches is the count of consecutive refused
/// logins, reset whenever a session opens.
pub struct DeliveryEngine {
    transport: Arc<dyn Transport>,
    store: Arc<dyn QueueStore>,
    delay: Duration,
    failed_auth_count: u32,
}

impl DeliveryEngine {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn QueueStore>, delay: Duration) -> Self {
        Self {
            transport,
            store,
            delay,
            failed_auth_count: 0,
        }
    }

    #[must_use]
    pub const fn failed_auth_count(&self) -> u32 {
        self.failed_auth_count
    }

    /// Deliver `batch` through a single session
    ///
    /// Every email ends up sent (deleted), rejected (deleted), deferred
    /// (attempt time recorded) or untouched when the batch is abandoned.
    ///
    /// # Errors
    /// - [`DeliveryError::AuthenticationExhausted`] once logins have been
    ///   refused more than [`MAX_AUTH_FAILURES`] times in a row
    /// - [`DeliveryError::Store`] if a delivered or rejected email cannot be
    ///   removed from the queue
    /// - [`DeliveryError::Session`] if the session fails in any other way
    #[tracing::instrument(level = "debug", skip_all, fields(batch = batch.len()))]
    pub async fn deliver(
        &mut self,
        batch: Vec<EmailRecord>,
    ) -> Result<DeliveryReport, DeliveryError> {
        let mut batch = VecDeque::from(batch);
        let mut report = DeliveryReport::default();

        let mut session = match self.transport.open().await {
            Ok(session) => session,
            Err(err) => {
                report.remaining = batch.len();
                return self.session_failure(err.into(), report).await;
            }
        };
        self.failed_auth_count = 0;

        let outcome = self.drain(session.as_mut(), &mut batch, &mut report).await;
        report.remaining = batch.len();

        let connection_lost = matches!(
            &outcome,
            Err(DeliveryError::Session(err)) if FailureClass::from(err) == FailureClass::Connection
        );
        if !connection_lost && let Err(err) = session.close().await {
            debug!(error = %err, "Ignoring failure while closing SMTP session");
        }

        match outcome {
            Ok(()) => Ok(report),
            Err(err) => self.session_failure(err, report).await,
        }
    }

    /// Send emails from the front of `batch` until it is empty, the relay is
    /// busy, or the session can no longer be used
    async fn drain(
        &self,
        session: &mut dyn Session,
        batch: &mut VecDeque<EmailRecord>,
        report: &mut DeliveryReport,
    ) -> Result<(), DeliveryError> {
        while let Some(mut email) = batch.pop_front() {
            let err = match session
                .send(&email.mail, &email.from_address, &email.to_address)
                .await
            {
                Ok(response) => {
                    self.store.destroy(&email).await?;
                    info!(
                        "sent email {:011} from {} to {}: {}",
                        email.id, email.from_address, email.to_address, response
                    );
                    report.sent += 1;
                    continue;
                }
                Err(err) => err,
            };

            match FailureClass::from(&err) {
                FailureClass::Permanent => {
                    error!(
                        "5xx error sending email {}, removing from queue: {err}",
                        email.id
                    );
                    self.store.destroy(&email).await?;
                    report.rejected += 1;
                    session.reset().await?;
                }
                FailureClass::ServerBusy => {
                    warn!("server too busy, sleeping {} seconds", self.delay.as_secs());
                    batch.push_front(email);
                    report.halted = Some(Halt::ServerBusy);
                    tokio::time::sleep(self.delay).await;
                    return Ok(());
                }
                FailureClass::Transient => {
                    email.last_send_attempt = Utc::now().timestamp();
                    if let Err(save_err) = self.store.save(&email).await {
                        debug!(id = email.id, error = %save_err, "Could not record send attempt");
                    }
                    error!("error sending email {}: {err}", email.id);
                    report.deferred += 1;
                    session.reset().await?;
                }
                FailureClass::Authentication | FailureClass::Connection => {
                    batch.push_front(email);
                    return Err(err.into());
                }
            }
        }

        Ok(())
    }

    /// Decide what a failure outside a single send means for the tick
    async fn session_failure(
        &mut self,
        err: DeliveryError,
        mut report: DeliveryReport,
    ) -> Result<DeliveryReport, DeliveryError> {
        let err = match err {
            DeliveryError::Session(err) => err,
            other => return Err(other),
        };

        match FailureClass::from(&err) {
            FailureClass::Authentication => self.authentication_failure(err, report).await,
            FailureClass::ServerBusy => {
                debug!(error = %err, "Relay busy, skipping this tick");
                report.halted = Some(Halt::ServerBusy);
                Ok(report)
            }
            FailureClass::Connection => {
                debug!(error = %err, "Ignoring SMTP session failure");
                report.halted = Some(Halt::Connection);
                Ok(report)
            }
            FailureClass::Permanent | FailureClass::Transient => Err(DeliveryError::Session(err)),
        }
    }

    async fn authentication_failure(
        &mut self,
        err: ClientError,
        mut report: DeliveryReport,
    ) -> Result<DeliveryReport, DeliveryError> {
        self.failed_auth_count += 1;

        if self.failed_auth_count > MAX_AUTH_FAILURES {
            error!("authentication error, giving up: {err}");
            return Err(DeliveryError::AuthenticationExhausted {
                attempts: self.failed_auth_count,
                source: err,
            });
        }

        warn!("authentication error, retrying: {err}");
        report.halted = Some(Halt::Authentication);
        tokio::time::sleep(self.delay).await;
        Ok(report)
    }
}
