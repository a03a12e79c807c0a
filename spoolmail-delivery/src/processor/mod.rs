//! The delivery loop: cleanup, fetch and deliver on a fixed interval

pub mod cleanup;
pub mod delivery;
pub mod fetch;

use std::{sync::Arc, time::Duration};

use spoolmail_common::{Signal, internal};
use spoolmail_store::QueueStore;
use tokio::{
    sync::broadcast::{
        self,
        error::{RecvError, TryRecvError},
    },
    time::Instant,
};
use tracing::{error, info};

use crate::{config::SendmailConfig, error::DeliveryError, transport::Transport};

use self::delivery::{DeliveryEngine, DeliveryReport};

/// How long to wait before the next tick, if at all
///
/// Only waits when the tick finished before `delay` had elapsed since it
/// started, and then only for what is left of it.
#[must_use]
pub fn remaining_delay(started: Instant, delay: Duration, now: Instant) -> Option<Duration> {
    (started + delay)
        .checked_duration_since(now)
        .filter(|remaining| !remaining.is_zero())
}

/// The delivery daemon
///
/// Ticks run strictly one after another. Shutdown is only noticed between
/// ticks, so a batch already handed to the relay always runs to completion.
pub struct Sendmail {
    config: SendmailConfig,
    store: Arc<dyn QueueStore>,
    engine: DeliveryEngine,
}

impl Sendmail {
    #[must_use]
    pub fn new(
        config: SendmailConfig,
        store: Arc<dyn QueueStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let engine = DeliveryEngine::new(
            transport,
            Arc::clone(&store),
            Duration::from_secs(config.delay),
        );

        Self {
            config,
            store,
            engine,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SendmailConfig {
        &self.config
    }

    #[must_use]
    pub const fn engine(&self) -> &DeliveryEngine {
        &self.engine
    }

    /// Run one cleanup, fetch and deliver cycle
    ///
    /// # Errors
    /// Whatever stage failed first
    pub async fn tick(&mut self) -> Result<DeliveryReport, DeliveryError> {
        cleanup::cleanup(self.store.as_ref(), self.config.max_age).await?;
        let batch = fetch::find_emails(self.store.as_ref(), self.config.batch_size).await?;
        self.engine.deliver(batch).await
    }

    /// Tick until shutdown is signalled, or once in `once` mode
    ///
    /// A failed tick is logged and the next one runs as usual.
    ///
    /// # Errors
    /// A fatal delivery error, or any tick error in `once` mode
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn run(
        &mut self,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), DeliveryError> {
        internal!(level = INFO, "Sendmail starting");
        let delay = Duration::from_secs(self.config.delay);

        loop {
            let started = Instant::now();

            match self.tick().await {
                Ok(report) => internal!("Tick finished: {:?}", report),
                Err(err) if err.is_fatal() || self.config.once => return Err(err),
                Err(err) => error!("Error delivering queued emails: {err}"),
            }

            if self.config.once {
                return Ok(());
            }

            match shutdown.try_recv() {
                Ok(Signal::Shutdown) | Err(TryRecvError::Lagged(_)) => {
                    info!("caught signal, shutting down");
                    return Ok(());
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => {}
            }

            let Some(remaining) = remaining_delay(started, delay, Instant::now()) else {
                continue;
            };
            let deadline = Instant::now() + remaining;

            tokio::select! {
                () = tokio::time::sleep_until(deadline) => {}
                signal = shutdown.recv() => match signal {
                    Ok(Signal::Shutdown) | Err(RecvError::Lagged(_)) => {
                        info!("caught signal, shutting down");
                        return Ok(());
                    }
                    Err(RecvError::Closed) => tokio::time::sleep_until(deadline).await,
                },
            }
        }
    }
}
