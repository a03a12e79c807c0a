use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Mutex,
};

use serde::Deserialize;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer,
    filter::FilterFn,
    fmt::{time::ChronoUtc, writer::BoxMakeWriter},
    prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Where log lines go, as read from the `logging` section of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Primary log sink. Logs go to stdout when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Default level when `LOG_LEVEL` is not set in the environment
    #[serde(default)]
    pub level: Option<String>,
}

fn resolve_level(env: Option<&str>, configured: Option<&str>) -> LevelFilter {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    env.or(configured).map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    OpenOptions::new().create(true).append(true).open(path)
}

fn is_spoolmail_event(metadata: &tracing::Metadata<'_>) -> bool {
    metadata.target().starts_with("spoolmail")
}

/// Install the global subscriber.
///
/// Every event is written to the primary sink (the configured log file, or
/// stdout). With `verbose` set, every event is mirrored to stderr as well.
///
/// # Errors
///
/// Fails if the log file cannot be opened or a global subscriber is already
/// installed.
pub fn init(config: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let env = std::env::var("LOG_LEVEL").ok();
    let level = resolve_level(env.as_deref(), config.level.as_deref());

    let (writer, ansi) = match &config.file {
        Some(path) => (BoxMakeWriter::new(Mutex::new(open_log_file(path)?)), false),
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let primary = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(ansi)
        .with_timer(ChronoUtc::rfc_3339())
        .with_filter(level)
        .with_filter(FilterFn::new(is_spoolmail_event));

    let mirror = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_ansi(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_filter(level)
            .with_filter(FilterFn::new(is_spoolmail_event))
    });

    tracing_subscriber::Registry::default()
        .with(primary)
        .with(mirror)
        .try_init()?;

    Ok(())
}
