//! Transport labels and validated connection descriptors.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};

use crate::error::{Error, Result};

/// Transport label as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Transport {
    /// Local subprocess speaking over stdin/stdout.
    Stdio,
    /// Networked event stream.
    Sse,
    /// Recognized but never opened; use [`Transport::Sse`].
    #[default]
    Http,
}

impl Transport {
    /// Returns the configuration label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "sse" => Ok(Self::Sse),
            "http" => Ok(Self::Http),
            other => Err(Error::unsupported_transport(format!(
                "unsupported transport protocol '{other}'"
            ))),
        }
    }
}

/// Parameters for spawning a local MCP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioConnection {
    /// The executable to run.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Environment for the process. `None` inherits the parent environment;
    /// `Some` replaces it, with the parent's `PATH` added when absent.
    pub env: Option<HashMap<String, String>>,
    /// Working directory for the process.
    pub cwd: Option<PathBuf>,
}

impl StdioConnection {
    /// Creates a descriptor for `command` with `args`.
    #[must_use]
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: None,
            cwd: None,
        }
    }

    /// Sets the process environment.
    #[must_use]
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Checks that the command is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataFormat`] when the command is empty.
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(Error::invalid("stdio connection requires a non-empty 'command'"));
        }
        Ok(())
    }
}

/// Parameters for a networked event-stream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseConnection {
    /// Endpoint URL.
    pub url: String,
    /// Headers sent with every request.
    pub headers: HashMap<String, String>,
    /// Connect timeout; `None` uses the client settings.
    pub connect_timeout: Option<Duration>,
    /// Idle read timeout for the stream; `None` uses the client settings.
    pub read_timeout: Option<Duration>,
}

impl SseConnection {
    /// Creates a descriptor for `url` with no extra headers.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            connect_timeout: None,
            read_timeout: None,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Replaces the header set.
    #[must_use]
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Sets both network timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = Some(connect);
        self.read_timeout = Some(read);
        self
    }

    /// Checks the URL and every header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataFormat`] for an empty or unparseable URL, or a
    /// header name or value that cannot be sent.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::invalid("sse connection requires a non-empty 'url'"));
        }
        reqwest::Url::parse(&self.url)
            .map_err(|e| Error::invalid(format!("invalid url '{}': {e}", self.url)))?;
        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::invalid(format!("invalid header name '{name}': {e}")))?;
            HeaderValue::from_str(value)
                .map_err(|e| Error::invalid(format!("invalid value for header '{name}': {e}")))?;
        }
        Ok(())
    }
}

/// A complete connection descriptor, one variant per openable transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// Local subprocess.
    Stdio(StdioConnection),
    /// Networked event stream.
    Sse(SseConnection),
}

impl TransportConfig {
    /// Creates a stdio descriptor.
    #[must_use]
    pub fn stdio(command: impl Into<String>, args: &[&str]) -> Self {
        Self::Stdio(StdioConnection::new(command, args.iter().copied()))
    }

    /// Creates an event-stream descriptor.
    #[must_use]
    pub fn sse(url: impl Into<String>) -> Self {
        Self::Sse(SseConnection::new(url))
    }

    /// Returns the transport label.
    #[must_use]
    pub const fn transport(&self) -> Transport {
        match self {
            Self::Stdio(_) => Transport::Stdio,
            Self::Sse(_) => Transport::Sse,
        }
    }

    /// Validates the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataFormat`] when a required field is missing or
    /// malformed.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Stdio(conn) => conn.validate(),
            Self::Sse(conn) => conn.validate(),
        }
    }
}

impl From<StdioConnection> for TransportConfig {
    fn from(conn: StdioConnection) -> Self {
        Self::Stdio(conn)
    }
}

impl From<SseConnection> for TransportConfig {
    fn from(conn: SseConnection) -> Self {
        Self::Sse(conn)
    }
}
