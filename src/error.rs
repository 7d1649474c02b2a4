//! Error types.
//!
//! Errors fall into three domains. [`StartupError`] is fatal and terminates
//! the process. [`QueryError`] and [`SinkError`] are transient: they are
//! logged by the poll loop that hit them and never cross a loop boundary.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// A read against the data source failed.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The database driver reported an error (connection, syntax, decoding).
    #[error("database query failed: {0}")]
    Database(#[from] sqlx::Error),

    /// A row was returned but could not be interpreted.
    #[error("malformed row: {0}")]
    Malformed(String),
}

/// Publishing an observation failed.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The observation names a family which was never registered.
    #[error("unknown metric family {0:?}")]
    UnknownFamily(String),

    /// The number of label values differs from the family's dimensions.
    #[error("family {family:?} expects {expected} label values, got {actual}")]
    LabelMismatch {
        /// Family name.
        family: String,
        /// Number of label dimensions of the family.
        expected: usize,
        /// Number of label values on the observation.
        actual: usize,
    },

    /// A string value was published to a sink that only records numbers.
    #[error("family {0:?} only accepts numeric values")]
    NonNumeric(String),

    /// A family was registered twice.
    #[error("metric family {0:?} registered twice")]
    Duplicate(String),

    /// The push request could not be sent or its response not read.
    #[error("push request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The push endpoint answered with something other than `204 No Content`.
    #[error("push endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, captured for diagnostics.
        body: String,
    },

    /// The configured push endpoint is not a valid base URL.
    #[error("invalid push url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The observation could not be rendered.
    #[error("could not encode observation")]
    Encode(#[from] std::fmt::Error),
}

/// Loading or validating the configuration failed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("could not read {path}: {source}")]
    Io {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for [`Config`](crate::config::Config).
    #[error("could not parse {path}: {source}")]
    Parse {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying error.
        source: serde_yaml::Error,
    },

    /// A value is out of its allowed range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A fatal error during startup. The process exits with a non-zero status.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Configuration missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The data source could not be reached.
    #[error("could not connect to database: {0}")]
    Database(#[source] sqlx::Error),

    /// The sink could not be set up.
    #[error("could not set up sink: {0}")]
    Sink(#[source] SinkError),

    /// The catalog could not be registered with the sink.
    #[error("could not register metric families: {0}")]
    Register(#[source] SinkError),

    /// The listen address could not be bound.
    #[error("could not bind {addr}: {source}")]
    Bind {
        /// Configured listen address.
        addr: SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The HTTP server terminated with an error.
    #[error("http server failed: {0}")]
    Serve(#[source] std::io::Error),
}
