//! Command line flags

use std::path::PathBuf;

use clap::Parser;
use spoolmail_delivery::SendmailConfig;

const DEFAULT_ENVIRONMENT: &str = "development";

/// Deliver emails queued in a database through an SMTP relay
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "spoolmail")]
#[command(version = spoolmail_delivery::VERSION, about, long_about = None)]
pub struct Cli {
    /// Maximum number of emails sent per tick
    #[arg(short, long, value_name = "COUNT")]
    pub batch_size: Option<usize>,

    /// Seconds between ticks
    #[arg(long, value_name = "SECONDS")]
    pub delay: Option<u64>,

    /// Seconds after which failing emails are dropped, 0 to keep them forever
    #[arg(long, value_name = "SECONDS")]
    pub max_age: Option<u64>,

    /// Run a single tick and exit
    #[arg(short, long)]
    pub once: bool,

    /// Detach from the terminal and run in the background
    #[arg(short, long)]
    pub daemonize: bool,

    /// Print the queue and exit
    #[arg(long)]
    pub mailq: bool,

    /// Print the SQL creating the queue table and exit
    #[arg(long)]
    pub create_migration: bool,

    /// Print a record struct for the queue table and exit
    #[arg(long)]
    pub create_model: bool,

    /// Change to PATH before doing anything else
    #[arg(short = 'c', long, value_name = "PATH", value_parser = working_directory)]
    pub chdir: Option<PathBuf>,

    /// Selects `config/<NAME>.ron`. Defaults to `SPOOLMAIL_ENV`, then development.
    #[arg(short, long, value_name = "NAME")]
    pub environment: Option<String>,

    /// Record type whose table holds the queue
    #[arg(short, long, value_name = "NAME")]
    pub table_name: Option<String>,

    /// Mirror log lines to stderr
    #[arg(short, long, overrides_with = "no_verbose")]
    pub verbose: bool,

    /// Do not mirror log lines to stderr
    #[arg(long, overrides_with = "verbose")]
    pub no_verbose: bool,
}

fn working_directory(path: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(path);

    if !path.is_dir() {
        return Err(format!("{} is not a directory", path.display()));
    }
    if std::fs::read_dir(&path).is_err() {
        return Err(format!("{} is not readable", path.display()));
    }

    Ok(path)
}

impl Cli {
    /// The environment to load configuration for
    #[must_use]
    pub fn environment(&self) -> String {
        self.environment
            .clone()
            .or_else(|| std::env::var("SPOOLMAIL_ENV").ok())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
    }

    /// `Some` when verbosity was chosen on the command line
    #[must_use]
    pub const fn verbosity(&self) -> Option<bool> {
        match (self.verbose, self.no_verbose) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        }
    }

    /// The table name used by the scaffolds, which never read configuration
    #[must_use]
    pub fn scaffold_table_name(&self) -> String {
        self.table_name
            .clone()
            .unwrap_or_else(|| SendmailConfig::default().table_name)
    }

    /// Override the daemon settings read from the configuration file
    pub fn apply(&self, config: &mut SendmailConfig) {
        if let Some(batch_size) = self.batch_size {
            config.batch_size = Some(batch_size);
        }
        if let Some(delay) = self.delay {
            config.delay = delay;
        }
        if let Some(max_age) = self.max_age {
            config.max_age = max_age;
        }
        if self.once {
            config.once = true;
        }
        if let Some(table_name) = &self.table_name {
            config.table_name.clone_from(table_name);
        }
        if let Some(verbose) = self.verbosity() {
            config.verbose = verbose;
        }
    }
}
