//! Built-in defaults, injected at construction.

use std::time::Duration;

/// Immutable defaults shared by the resolver, the client and the registry.
///
/// Nothing in the crate reads ambient globals; every default flows from a
/// `ClientSettings` value so tests can vary it per instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Client name sent to the server during the handshake.
    pub name: String,
    /// Client version sent to the server during the handshake.
    pub version: String,
    /// Per-operation timeout when neither the caller nor the file sets one.
    pub timeout: Duration,
    /// Connect timeout for network transports.
    pub connect_timeout: Duration,
    /// Idle read timeout for the network event stream.
    pub read_timeout: Duration,
    /// File name searched for during config discovery.
    pub config_file_name: String,
}

impl ClientSettings {
    /// Default operation timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    /// Default connect timeout for network transports.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    /// Default read timeout for the network event stream.
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60 * 5);
    /// Default config file name.
    pub const DEFAULT_CONFIG_FILE_NAME: &'static str = "mcp.json";

    /// Creates settings with the built-in defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the handshake identity.
    #[must_use]
    pub fn with_identity(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.name = name.into();
        self.version = version.into();
        self
    }

    /// Sets the default operation timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the network connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the network read timeout.
    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the file name used for config discovery.
    #[must_use]
    pub fn with_config_file_name(mut self, name: impl Into<String>) -> Self {
        self.config_file_name = name.into();
        self
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            timeout: Self::DEFAULT_TIMEOUT,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            read_timeout: Self::DEFAULT_READ_TIMEOUT,
            config_file_name: Self::DEFAULT_CONFIG_FILE_NAME.to_owned(),
        }
    }
}
