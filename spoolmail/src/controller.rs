use std::sync::Arc;

use spoolmail_common::{Signal, internal};
use spoolmail_delivery::{Sendmail, SmtpTransport, mailq};
use spoolmail_store::{Filter, QueueStore, SqliteQueueStore};
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::broadcast,
};

use crate::config::Config;

/// Owns the configuration and wires the store, relay and delivery loop
pub struct Spoolmail {
    config: Config,
}

/// Wait for an interrupt or terminate signal and tell the delivery loop to
/// stop at its next tick boundary
async fn forward_shutdown(sender: broadcast::Sender<Signal>) -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "Interrupt received, stopping after the current tick");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate signal received, stopping after the current tick");
        }
    };

    // No receivers left means the loop has already finished
    let _ = sender.send(Signal::Shutdown);
    Ok(())
}

impl Spoolmail {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Connect to the queue store, creating the table first when configured to
    ///
    /// # Errors
    /// If the database cannot be opened or migrated
    pub async fn open_store(&self) -> anyhow::Result<Arc<SqliteQueueStore>> {
        let store =
            SqliteQueueStore::connect(&self.config.store.url, &self.config.sendmail.table_name)
                .await?;

        if self.config.store.migrate {
            store.migrate().await?;
            tracing::debug!(table = store.table(), "Queue table ready");
        }

        Ok(Arc::new(store))
    }

    /// Render every queued email
    ///
    /// # Errors
    /// If the queue store cannot be read
    pub async fn mailq(&self) -> anyhow::Result<String> {
        let store = self.open_store().await?;
        let emails = store.find(&Filter::All, None).await?;

        Ok(mailq::render(&emails))
    }

    /// Run the delivery loop until it is told to stop, or for a single tick
    /// in `once` mode
    ///
    /// # Errors
    /// If the store cannot be opened, delivery fails fatally, or any tick
    /// fails in `once` mode
    pub async fn run(self) -> anyhow::Result<()> {
        let store = self.open_store().await?;
        let transport = Arc::new(SmtpTransport::new(self.config.mailer.clone()));

        let (sender, receiver) = broadcast::channel(8);
        let listener = tokio::spawn(forward_shutdown(sender));

        internal!(
            level = INFO,
            "Delivering from {} through {}",
            store.table(),
            self.config.mailer.address()
        );

        let mut sendmail = Sendmail::new(self.config.sendmail, store, transport);
        let result = sendmail.run(receiver).await;

        listener.abort();
        internal!("Shutting down...");

        Ok(result?)
    }
}
