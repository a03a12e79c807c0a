//! The configuration file

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use spoolmail_common::logging::LoggingConfig;
use spoolmail_delivery::{MailerConfig, SendmailConfig};

use crate::cli::Cli;

/// Names the configuration file explicitly, skipping discovery
pub const CONFIG_ENV: &str = "SPOOLMAIL_CONFIG";

const SYSTEM_CONFIG: &str = "/etc/spoolmail/spoolmail.config.ron";

fn default_url() -> String {
    "sqlite://spoolmail.db?mode=rwc".to_string()
}

/// Where the queue lives
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Database URL
    ///
    /// Default: `sqlite://spoolmail.db?mode=rwc`
    #[serde(default = "default_url")]
    pub url: String,

    /// Create the queue table on startup if it is missing
    #[serde(default)]
    pub migrate: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            migrate: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mailer: MailerConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub sendmail: SendmailConfig,
}

impl Config {
    /// Read and parse the file at `path`
    ///
    /// # Errors
    /// If the file cannot be read or is not valid RON for this structure
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        ron::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Discover, load and apply command line overrides
    ///
    /// # Errors
    /// If no configuration file can be found or the one found is invalid
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let path = find_config_file(Path::new("."), &cli.environment(), explicit.as_deref())?;

        let mut config = Self::load(&path)?;
        cli.apply(&mut config.sendmail);

        Ok(config)
    }
}

/// Find the configuration file using the following precedence:
/// 1. `explicit`, normally taken from `SPOOLMAIL_CONFIG`
/// 2. `<root>/config/<environment>.ron`
/// 3. `<root>/spoolmail.config.ron`
/// 4. `/etc/spoolmail/spoolmail.config.ron`
///
/// # Errors
/// If `explicit` does not exist, or none of the other candidates do
pub fn find_config_file(
    root: &Path,
    environment: &str,
    explicit: Option<&Path>,
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    let candidates = [
        root.join("config").join(format!("{environment}.ron")),
        root.join("spoolmail.config.ron"),
        PathBuf::from(SYSTEM_CONFIG),
    ];

    if let Some(path) = candidates.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = candidates
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}
