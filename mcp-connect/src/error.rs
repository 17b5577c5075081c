//! Error types for configuration resolution and session lifecycle.
//!
//! Every failure is raised to the immediate caller. Nothing here is retried:
//! configuration and transport-selection errors are operator mistakes, and
//! transport faults surface as soon as they happen.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Result type alias for mcp-connect operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No configuration file at the explicit path or the standard locations.
    #[error("MCP configuration file not found at {}", describe_search(.explicit.as_deref()))]
    ConfigNotFound {
        /// The explicit path that was checked, if any.
        explicit: Option<PathBuf>,
    },

    /// The configuration file could not be read.
    #[error("could not read configuration file '{}': {source}", .path.display())]
    ConfigRead {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Malformed JSON, or a field with the wrong shape.
    #[error("{}{message}", describe_location(.path.as_deref()))]
    DataFormat {
        /// File the offending data came from, if it came from a file.
        path: Option<PathBuf>,
        /// What was wrong.
        message: String,
    },

    /// No resolvable server alias, or the alias has no entry.
    #[error("configuration missing: {0}")]
    ConfigMissing(String),

    /// The transport could not be opened.
    #[error("connection error: {0}")]
    Connection(String),

    /// `http` or an unrecognized transport label.
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// A usage mode the session cannot be driven in.
    #[error("unsupported mode: {0}")]
    UnsupportedMode(String),

    /// An operation exceeded the configured timeout.
    #[error("{operation} timed out after {}s", .timeout.as_secs_f64())]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The limit that was exceeded.
        timeout: Duration,
    },

    /// The protocol session reported a failure.
    #[error("session error: {0}")]
    Session(String),
}

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// See [`Error::ConfigNotFound`].
    FileNotFound,
    /// See [`Error::DataFormat`].
    DataFormat,
    /// See [`Error::ConfigMissing`].
    ConfigurationMissing,
    /// See [`Error::ConfigRead`].
    Io,
    /// See [`Error::Connection`].
    Connection,
    /// See [`Error::UnsupportedTransport`].
    UnsupportedTransport,
    /// See [`Error::UnsupportedMode`].
    UnsupportedMode,
    /// See [`Error::Timeout`].
    Timeout,
    /// See [`Error::Session`].
    Session,
}

impl Error {
    /// Create a data-format error tied to a configuration file.
    #[must_use]
    pub fn data_format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DataFormat {
            path: Some(path.into()),
            message: message.into(),
        }
    }

    /// Create a data-format error for in-memory data.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::DataFormat {
            path: None,
            message: message.into(),
        }
    }

    /// Create a configuration-missing error.
    #[must_use]
    pub fn config_missing(msg: impl Into<String>) -> Self {
        Self::ConfigMissing(msg.into())
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an unsupported-transport error.
    #[must_use]
    pub fn unsupported_transport(msg: impl Into<String>) -> Self {
        Self::UnsupportedTransport(msg.into())
    }

    /// Create an unsupported-mode error.
    #[must_use]
    pub fn unsupported_mode(msg: impl Into<String>) -> Self {
        Self::UnsupportedMode(msg.into())
    }

    /// Create a session error.
    #[must_use]
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Returns the failure category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigNotFound { .. } => ErrorKind::FileNotFound,
            Self::ConfigRead { .. } => ErrorKind::Io,
            Self::DataFormat { .. } => ErrorKind::DataFormat,
            Self::ConfigMissing(_) => ErrorKind::ConfigurationMissing,
            Self::Connection(_) => ErrorKind::Connection,
            Self::UnsupportedTransport(_) => ErrorKind::UnsupportedTransport,
            Self::UnsupportedMode(_) => ErrorKind::UnsupportedMode,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Session(_) => ErrorKind::Session,
        }
    }
}

fn describe_search(explicit: Option<&Path>) -> String {
    explicit.map_or_else(
        || "any of the standard locations".to_owned(),
        |p| format!("'{}'", p.display()),
    )
}

fn describe_location(path: Option<&Path>) -> String {
    path.map_or_else(String::new, |p| format!("in '{}': ", p.display()))
}
