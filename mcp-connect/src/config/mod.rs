//! Connection configuration and its resolution from `mcp.json`.
//!
//! Every field follows the same precedence: an explicit argument beats the
//! server's entry in the config file, which beats the built-in default. The
//! rule is applied field by field, so a caller may override `timeout` alone
//! and keep `base_url` from the file.
//!
//! # File format
//!
//! ```json
//! {
//!   "default_server": "local",
//!   "servers": {
//!     "local": { "transport": "stdio", "command": "python", "args": ["server.py"] },
//!     "remote": {
//!       "transport": "sse",
//!       "base_url": "https://tools.example.com/mcp",
//!       "api_key": "env:TOOLS_API_KEY",
//!       "timeout": 30,
//!       "default_headers": { "X-Team": "search" }
//!     }
//!   }
//! }
//! ```
//!
//! The file is looked up at `./mcp.json`, `~/.mcp.json` and
//! `~/.config/mcp/mcp.json`, unless an explicit path is given.

mod discovery;
mod loader;

pub use discovery::SearchPaths;
pub use loader::ConfigLoader;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::auth::ApiKey;
use crate::error::{Error, Result};
use crate::settings::ClientSettings;
use crate::transport::{SseConnection, StdioConnection, Transport, TransportConfig};

/// Fully resolved parameters for one server connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Transport label.
    pub transport: Transport,
    /// Endpoint for network transports, without trailing slashes.
    pub base_url: Option<String>,
    /// Executable for the stdio transport.
    pub command: Option<String>,
    /// Arguments for the stdio transport.
    pub args: Vec<String>,
    /// Per-operation timeout.
    pub timeout: Duration,
    /// API key, still unresolved.
    pub api_key: Option<ApiKey>,
    /// Headers from the file merged with caller headers.
    pub headers: HashMap<String, String>,
    /// Parameters merged under every tool call's arguments.
    pub default_parameters: Map<String, Value>,
}

impl ConnectionConfig {
    /// Creates a stdio configuration.
    #[must_use]
    pub fn stdio<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            transport: Transport::Stdio,
            command: Some(command.into()),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Creates an event-stream configuration.
    #[must_use]
    pub fn sse(base_url: impl Into<String>) -> Self {
        Self {
            transport: Transport::Sse,
            ..Self::default()
        }
        .with_base_url(base_url)
    }

    /// Sets the base URL, trimming trailing slashes.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(trim_url(base_url.into()));
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the API key (`env:NAME` or a literal).
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<ApiKey>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds a default tool parameter.
    #[must_use]
    pub fn with_default_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.default_parameters.insert(name.into(), value);
        self
    }

    /// Builds the descriptor used to open a session.
    ///
    /// `headers` are the final request headers (API key already applied).
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedTransport`] for `http`.
    /// - [`Error::Connection`] when `sse` has no base URL or `stdio` has no
    ///   command.
    pub fn transport_config(
        &self,
        headers: &HashMap<String, String>,
        settings: &ClientSettings,
    ) -> Result<TransportConfig> {
        match self.transport {
            Transport::Stdio => {
                let command = self
                    .command
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| Error::connection("command is required for stdio transport"))?;
                let path = std::env::var("PATH").unwrap_or_default();
                Ok(StdioConnection::new(command, self.args.iter().cloned())
                    .with_env(HashMap::from([("PATH".to_owned(), path)]))
                    .into())
            }
            Transport::Sse => {
                let url = self
                    .base_url
                    .as_deref()
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| Error::connection("base URL is required for SSE transport"))?;
                Ok(SseConnection::new(url)
                    .with_headers(headers.clone())
                    .with_timeouts(settings.connect_timeout, settings.read_timeout)
                    .into())
            }
            Transport::Http => Err(Error::unsupported_transport(
                "HTTP transport is not supported by the MCP session layer; use 'sse' instead",
            )),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            base_url: None,
            command: None,
            args: Vec::new(),
            timeout: ClientSettings::DEFAULT_TIMEOUT,
            api_key: None,
            headers: HashMap::new(),
            default_parameters: Map::new(),
        }
    }
}

/// Caller-supplied values that take precedence over the config file.
///
/// Only fields set here replace file values; unset fields never erase them.
/// Headers and parameters are merged over the file's, key by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionOverrides {
    /// Transport label.
    pub transport: Option<Transport>,
    /// Endpoint for network transports.
    pub base_url: Option<String>,
    /// Executable for the stdio transport.
    pub command: Option<String>,
    /// Arguments for the stdio transport.
    pub args: Option<Vec<String>>,
    /// Per-operation timeout.
    pub timeout: Option<Duration>,
    /// API key.
    pub api_key: Option<ApiKey>,
    /// Headers merged over the file's `default_headers`.
    pub default_headers: Option<HashMap<String, String>>,
    /// Parameters merged over the file's `default_parameters`.
    pub default_parameters: Option<Map<String, Value>>,
}

impl ConnectionOverrides {
    /// Creates an empty set of overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the transport.
    #[must_use]
    pub const fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Overrides the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Overrides the stdio command.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Overrides the stdio arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Overrides the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overrides the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<ApiKey>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Adds a header on top of the file's headers.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Adds a default parameter on top of the file's parameters.
    #[must_use]
    pub fn with_default_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.default_parameters
            .get_or_insert_with(Map::new)
            .insert(name.into(), value);
        self
    }
}

/// Locates the config file using the process working and home directories.
#[must_use]
pub fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    ConfigLoader::default().locate(explicit)
}

/// Resolves one server's configuration from the discovered config file.
///
/// # Errors
///
/// See [`ConfigLoader::load`].
pub fn load(
    server: Option<&str>,
    explicit: Option<&Path>,
    overrides: ConnectionOverrides,
) -> Result<ConnectionConfig> {
    ConfigLoader::default().load(server, explicit, overrides)
}

pub(crate) fn trim_url(url: String) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.len() == url.len() {
        url
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn sse_trims_trailing_slashes() {
        let config = ConnectionConfig::sse("http://localhost:8080/mcp//");
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:8080/mcp"));
    }

    #[test]
    fn default_timeout_is_sixty_seconds() {
        assert_eq!(ConnectionConfig::default().timeout, Duration::from_secs(60));
        assert_eq!(ConnectionConfig::default().transport, Transport::Http);
    }

    #[test]
    fn http_is_rejected_when_building_transport() {
        let config = ConnectionConfig::default().with_base_url("http://localhost");
        let err = config
            .transport_config(&HashMap::new(), &ClientSettings::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedTransport);
        assert!(err.to_string().contains("sse"));
    }

    #[test]
    fn sse_without_url_is_a_connection_error() {
        let config = ConnectionConfig {
            transport: Transport::Sse,
            ..ConnectionConfig::default()
        };
        let err = config
            .transport_config(&HashMap::new(), &ClientSettings::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn stdio_without_command_is_a_connection_error() {
        let config = ConnectionConfig::stdio("", Vec::<String>::new());
        let err = config
            .transport_config(&HashMap::new(), &ClientSettings::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn stdio_environment_carries_path() {
        let config = ConnectionConfig::stdio("echo", ["hi"]);
        let transport = config
            .transport_config(&HashMap::new(), &ClientSettings::default())
            .unwrap();
        let TransportConfig::Stdio(conn) = transport else {
            panic!("expected stdio descriptor");
        };
        assert_eq!(conn.command, "echo");
        assert_eq!(conn.args, vec!["hi"]);
        assert!(conn.env.unwrap().contains_key("PATH"));
    }

    #[test]
    fn sse_descriptor_uses_settings_timeouts_and_headers() {
        let settings = ClientSettings::default()
            .with_connect_timeout(Duration::from_secs(2))
            .with_read_timeout(Duration::from_secs(9));
        let headers = HashMap::from([("Authorization".to_owned(), "Bearer t".to_owned())]);
        let transport = ConnectionConfig::sse("http://localhost/sse")
            .transport_config(&headers, &settings)
            .unwrap();
        let TransportConfig::Sse(conn) = transport else {
            panic!("expected sse descriptor");
        };
        assert_eq!(conn.url, "http://localhost/sse");
        assert_eq!(conn.headers["Authorization"], "Bearer t");
        assert_eq!(conn.connect_timeout, Some(Duration::from_secs(2)));
        assert_eq!(conn.read_timeout, Some(Duration::from_secs(9)));
    }

    #[test]
    fn overrides_builder_merges_headers() {
        let overrides = ConnectionOverrides::new()
            .with_header("A", "1")
            .with_header("B", "2")
            .with_default_parameter("k", Value::from(3));
        assert_eq!(overrides.default_headers.unwrap().len(), 2);
        assert_eq!(overrides.default_parameters.unwrap()["k"], 3);
    }
}
