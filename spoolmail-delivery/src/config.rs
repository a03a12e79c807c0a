//! Daemon and relay settings

use serde::Deserialize;

const fn default_delay() -> u64 {
    60
}

const fn default_max_age() -> u64 {
    86_400 * 7
}

fn default_table_name() -> String {
    "Email".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    25
}

fn default_domain() -> String {
    "localhost.localdomain".to_string()
}

const fn default_connect_timeout() -> u64 {
    30
}

const fn default_ehlo_timeout() -> u64 {
    30
}

const fn default_starttls_timeout() -> u64 {
    30
}

const fn default_auth_timeout() -> u64 {
    30
}

const fn default_mail_from_timeout() -> u64 {
    30
}

const fn default_rcpt_to_timeout() -> u64 {
    30
}

const fn default_data_timeout() -> u64 {
    120
}

const fn default_rset_timeout() -> u64 {
    30
}

const fn default_quit_timeout() -> u64 {
    10
}

/// How the delivery loop behaves
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SendmailConfig {
    /// Maximum number of emails sent per tick. Unset sends everything eligible.
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Seconds between ticks, also used as the backoff after a busy relay or
    /// a failed login
    ///
    /// Default: 60 seconds
    #[serde(default = "default_delay")]
    pub delay: u64,

    /// Seconds after which previously attempted emails are dropped. 0
    /// disables cleanup.
    ///
    /// Default: 7 days
    #[serde(default = "default_max_age")]
    pub max_age: u64,

    /// Run a single tick and exit
    #[serde(default)]
    pub once: bool,

    /// Mirror log lines to stderr
    #[serde(default)]
    pub verbose: bool,

    /// Record type whose table holds the queue
    ///
    /// Default: `Email` (the `emails` table)
    #[serde(default = "default_table_name")]
    pub table_name: String,
}

impl Default for SendmailConfig {
    fn default() -> Self {
        Self {
            batch_size: None,
            delay: default_delay(),
            max_age: default_max_age(),
            once: false,
            verbose: false,
            table_name: default_table_name(),
        }
    }
}

/// SASL mechanism used to log in to the relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum AuthMode {
    #[default]
    Plain,
    Login,
}

/// Per-step limits for a relay session, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SmtpTimeouts {
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// EHLO or HELO, including the greeting
    #[serde(default = "default_ehlo_timeout")]
    pub ehlo_secs: u64,

    /// STARTTLS and the TLS handshake
    #[serde(default = "default_starttls_timeout")]
    pub starttls_secs: u64,

    #[serde(default = "default_auth_timeout")]
    pub auth_secs: u64,

    #[serde(default = "default_mail_from_timeout")]
    pub mail_from_secs: u64,

    #[serde(default = "default_rcpt_to_timeout")]
    pub rcpt_to_secs: u64,

    /// DATA, the message itself and the final reply
    ///
    /// Default: 120 seconds
    #[serde(default = "default_data_timeout")]
    pub data_secs: u64,

    #[serde(default = "default_rset_timeout")]
    pub rset_secs: u64,

    #[serde(default = "default_quit_timeout")]
    pub quit_secs: u64,
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout(),
            ehlo_secs: default_ehlo_timeout(),
            starttls_secs: default_starttls_timeout(),
            auth_secs: default_auth_timeout(),
            mail_from_secs: default_mail_from_timeout(),
            rcpt_to_secs: default_rcpt_to_timeout(),
            data_secs: default_data_timeout(),
            rset_secs: default_rset_timeout(),
            quit_secs: default_quit_timeout(),
        }
    }
}

/// The relay every queued email is handed to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MailerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Name announced in EHLO
    #[serde(default = "default_domain")]
    pub domain: String,

    #[serde(default, alias = "user_name")]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Mechanism used when credentials are set. Defaults to PLAIN.
    #[serde(default)]
    pub auth: Option<AuthMode>,

    /// Upgrade the session with STARTTLS
    #[serde(default)]
    pub tls: bool,

    /// Skip certificate verification after STARTTLS (testing only)
    #[serde(default)]
    pub accept_invalid_certs: bool,

    #[serde(default)]
    pub timeouts: SmtpTimeouts,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            domain: default_domain(),
            user: None,
            password: None,
            auth: None,
            tls: false,
            accept_invalid_certs: false,
            timeouts: SmtpTimeouts::default(),
        }
    }
}

impl MailerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sendmail_defaults() {
        let config: SendmailConfig = ron::from_str("()").unwrap();

        assert_eq!(config, SendmailConfig::default());
        assert_eq!(config.delay, 60);
        assert_eq!(config.max_age, 604_800);
        assert_eq!(config.table_name, "Email");
        assert_eq!(config.batch_size, None);
    }

    #[test]
    fn test_mailer_from_ron() {
        let config: MailerConfig = ron::from_str(
            r#"(
                host: "smtp.example.com",
                port: 587,
                user_name: Some("mailer"),
                password: Some("secret"),
                auth: Some(Login),
                tls: true,
                timeouts: (data_secs: 300),
            )"#,
        )
        .unwrap();

        assert_eq!(config.address(), "smtp.example.com:587");
        assert_eq!(config.domain, "localhost.localdomain");
        assert_eq!(config.user.as_deref(), Some("mailer"));
        assert_eq!(config.auth, Some(AuthMode::Login));
        assert!(config.tls);
        assert_eq!(config.timeouts.data_secs, 300);
        assert_eq!(config.timeouts.quit_secs, 10);
    }
}
