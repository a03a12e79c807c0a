//! The seam between the delivery engine and the relay

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use spoolmail_smtp::{ClientError, Response, SmtpClient};
use tracing::{debug, warn};

use crate::config::{AuthMode, MailerConfig, SmtpTimeouts};

/// Opens sessions to the relay
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a ready-to-send session: greeted, optionally upgraded to TLS and
    /// logged in.
    ///
    /// # Errors
    /// The classified failure of whichever step did not succeed
    async fn open(&self) -> Result<Box<dyn Session>, ClientError>;
}

/// One open relay session
#[async_trait]
pub trait Session: Send {
    /// Send `message` from `from` to `to`, returning the relay's final reply
    ///
    /// # Errors
    /// The classified failure of whichever step was refused
    async fn send(&mut self, message: &str, from: &str, to: &str) -> Result<Response, ClientError>;

    /// Abandon the current transaction (RSET)
    ///
    /// # Errors
    /// If the relay refuses or the connection fails
    async fn reset(&mut self) -> Result<(), ClientError>;

    /// End the session (QUIT)
    ///
    /// # Errors
    /// If the relay refuses or the connection fails
    async fn close(self: Box<Self>) -> Result<(), ClientError>;
}

/// Bound one protocol step by `secs`
async fn bounded<T, F>(secs: u64, step: &'static str, future: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    tokio::time::timeout(Duration::from_secs(secs), future)
        .await
        .map_err(|_| ClientError::Timeout(step))?
}

/// [`Transport`] speaking SMTP to the configured relay
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    config: MailerConfig,
}

impl SmtpTransport {
    #[must_use]
    pub const fn new(config: MailerConfig) -> Self {
        Self { config }
    }

    fn credentials(&self) -> Result<Option<(&str, &str, AuthMode)>, ClientError> {
        match (&self.config.user, &self.config.password) {
            (Some(user), Some(password)) => Ok(Some((
                user,
                password,
                self.config.auth.unwrap_or_default(),
            ))),
            (None, None) => Ok(None),
            _ => Err(ClientError::Config(
                "user and password must be set together".to_string(),
            )),
        }
    }

    /// EHLO, falling back to HELO for relays that do not speak ESMTP
    async fn hello(&self, client: &mut SmtpClient) -> Result<(), ClientError> {
        let timeouts = &self.config.timeouts;
        let domain = &self.config.domain;

        match bounded(timeouts.ehlo_secs, "EHLO", client.ehlo(domain))
            .await?
            .ensure_success()
        {
            Err(ClientError::Syntax(response)) => {
                debug!(%response, "EHLO refused, falling back to HELO");
                bounded(timeouts.ehlo_secs, "HELO", client.helo(domain))
                    .await?
                    .ensure_success()?;
                Ok(())
            }
            result => result.map(drop),
        }
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn open(&self) -> Result<Box<dyn Session>, ClientError> {
        let config = &self.config;
        let timeouts = &config.timeouts;
        let credentials = self.credentials()?;

        if config.accept_invalid_certs {
            warn!(
                host = %config.host,
                "TLS certificate validation is disabled for the relay"
            );
        }

        let mut client = bounded(
            timeouts.connect_secs,
            "connect",
            SmtpClient::connect(&config.address(), config.host.clone()),
        )
        .await?
        .accept_invalid_certs(config.accept_invalid_certs);

        bounded(timeouts.ehlo_secs, "greeting", client.read_greeting())
            .await?
            .ensure_success()?;

        self.hello(&mut client).await?;

        if config.tls {
            bounded(timeouts.starttls_secs, "STARTTLS", client.starttls())
                .await?
                .ensure_success()?;
            self.hello(&mut client).await?;
        }

        if let Some((user, password, mode)) = credentials {
            let login = async {
                match mode {
                    AuthMode::Plain => client.auth_plain(user, password).await,
                    AuthMode::Login => client.auth_login(user, password).await,
                }
            };
            bounded(timeouts.auth_secs, "AUTH", login).await?;
        }

        debug!(
            relay = %config.address(),
            tls = client.is_tls(),
            "SMTP session open"
        );

        Ok(Box::new(SmtpSession {
            client,
            timeouts: timeouts.clone(),
            desynced: false,
        }))
    }
}

struct SmtpSession {
    client: SmtpClient,
    timeouts: SmtpTimeouts,
    /// A reply may still be in flight after a timed out step, so the next
    /// reply read would not belong to the next command.
    desynced: bool,
}

impl SmtpSession {
    async fn transaction(
        &mut self,
        message: &str,
        from: &str,
        to: &str,
    ) -> Result<Response, ClientError> {
        let timeouts = &self.timeouts;
        let client = &mut self.client;

        bounded(timeouts.mail_from_secs, "MAIL FROM", client.mail_from(from))
            .await?
            .ensure_success()?;
        bounded(timeouts.rcpt_to_secs, "RCPT TO", client.rcpt_to(to))
            .await?
            .ensure_success()?;
        bounded(timeouts.data_secs, "DATA", client.data())
            .await?
            .ensure_intermediate()?;
        bounded(timeouts.data_secs, "DATA", client.send_data(message))
            .await?
            .ensure_success()
    }
}

#[async_trait]
impl Session for SmtpSession {
    async fn send(&mut self, message: &str, from: &str, to: &str) -> Result<Response, ClientError> {
        let result = self.transaction(message, from, to).await;
        if matches!(result, Err(ClientError::Timeout(_))) {
            self.desynced = true;
        }
        result
    }

    /// Fails with [`ClientError::ConnectionClosed`] after a timed out send
    /// instead of reading a stale reply, which ends the batch
    async fn reset(&mut self) -> Result<(), ClientError> {
        if self.desynced {
            debug!("Send timed out, abandoning session instead of RSET");
            return Err(ClientError::ConnectionClosed);
        }

        bounded(self.timeouts.rset_secs, "RSET", self.client.rset())
            .await?
            .ensure_success()
            .map(drop)
    }

    async fn close(mut self: Box<Self>) -> Result<(), ClientError> {
        bounded(self.timeouts.quit_secs, "QUIT", self.client.quit())
            .await?
            .ensure_success()
            .map(drop)
    }
}
