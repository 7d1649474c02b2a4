//! Logging setup.
//!
//! All crates log through [`tracing`]. [`init`] installs a
//! `tracing-subscriber` formatter writing to stderr.

use std::io::IsTerminal;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Maximum verbosity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Nothing is logged.
    Off,
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// The default.
    Info,
    /// Including per-iteration diagnostics.
    Debug,
    /// Everything, including every pushed line.
    Trace,
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> Self {
        match level {
            Level::Off => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Info => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
        }
    }
}

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2024-05-04T12:10:32.000000Z  WARN eqemu_exporter::poller: query failed family="online_count_minutes"
    /// ```
    Simplified,

    /// Dump out JSON lines.
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level of this crate. Dependencies log at `warn` and above.
    pub level: Level,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: LogFormat::Auto,
        }
    }
}

fn default_filter(level: Level) -> EnvFilter {
    EnvFilter::default()
        .add_directive(LevelFilter::WARN.into())
        .add_directive(
            format!("eqemu_exporter={}", LevelFilter::from(level))
                .parse::<Directive>()
                .unwrap_or_else(|_| LevelFilter::from(level).into()),
        )
}

/// Initialize the logging system.
///
/// `RUST_LOG`, when set, replaces the configured level entirely. Calling this
/// more than once keeps the first subscriber.
pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match (config.format, std::io::stderr().is_terminal()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => builder.pretty().try_init(),
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
            builder.compact().with_ansi(false).try_init()
        }
        (LogFormat::Json, _) => builder.json().flatten_event(true).try_init(),
    };

    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}
