//! Single-server client with a lazily opened session.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::auth::resolve_headers;
use crate::config::{ConfigLoader, ConnectionConfig, ConnectionOverrides};
use crate::error::{Error, Result};
use crate::session::{
    Connector, McpSession, PromptMessage, ResourceStack, RmcpConnector, ServerMetadata,
    ToolDescriptor, ToolOutput, bounded,
};
use crate::settings::ClientSettings;

/// Lifecycle state of a client's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session; the next operation opens one.
    #[default]
    Uninitialized,
    /// Transport opening or handshake in flight.
    Initializing,
    /// Handshake complete; operations are forwarded.
    Ready,
    /// Resources are being released.
    Closing,
}

/// A client bound to one MCP server.
///
/// The session is opened on first use and kept until [`McpClient::close`].
/// Every lifecycle operation takes `&mut self`, so one client is driven by
/// one caller at a time.
///
/// # Examples
///
/// ```rust,ignore
/// let mut client = McpClient::from_config(Some("calc"), None, ConnectionOverrides::new())?;
/// let tools = client
///     .scoped(async |client: &mut McpClient| client.list_tools().await)
///     .await?;
/// ```
pub struct McpClient {
    config: ConnectionConfig,
    headers: HashMap<String, String>,
    settings: ClientSettings,
    connector: Arc<dyn Connector>,
    resources: ResourceStack,
    session: Option<Arc<dyn McpSession>>,
    state: SessionState,
}

impl McpClient {
    /// Creates a client for `config` using the `rmcp` transports.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(config, ClientSettings::default(), Arc::new(RmcpConnector))
    }

    /// Creates a client with explicit settings and connector.
    ///
    /// The API key is resolved here, once. No transport is opened.
    #[must_use]
    pub fn with_connector(
        config: ConnectionConfig,
        settings: ClientSettings,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let headers = resolve_headers(&config.headers, config.api_key.as_ref());
        info!(
            transport = %config.transport,
            timeout_secs = config.timeout.as_secs_f64(),
            "created MCP client"
        );

        Self {
            config,
            headers,
            settings,
            connector,
            resources: ResourceStack::new(),
            session: None,
            state: SessionState::Uninitialized,
        }
    }

    /// Creates a client from the config file.
    ///
    /// # Errors
    ///
    /// See [`ConfigLoader::load`].
    pub fn from_config(
        server: Option<&str>,
        explicit: Option<&Path>,
        overrides: ConnectionOverrides,
    ) -> Result<Self> {
        Self::from_loader(&ConfigLoader::default(), server, explicit, overrides)
    }

    /// Creates a client from the config file found by `loader`, sharing the
    /// loader's settings.
    ///
    /// # Errors
    ///
    /// See [`ConfigLoader::load`].
    pub fn from_loader(
        loader: &ConfigLoader,
        server: Option<&str>,
        explicit: Option<&Path>,
        overrides: ConnectionOverrides,
    ) -> Result<Self> {
        let config = loader.load(server, explicit, overrides)?;
        Ok(Self::with_connector(
            config,
            loader.settings().clone(),
            Arc::new(RmcpConnector),
        ))
    }

    /// Replaces the connector.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// The resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Request headers, with the API key applied.
    #[must_use]
    pub const fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// The settings supplying defaults.
    #[must_use]
    pub const fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true once the handshake has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Opens the transport and performs the handshake.
    ///
    /// Does nothing when the session is already open. On failure every
    /// resource acquired so far is released and the client stays
    /// uninitialized.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedTransport`] for `http`.
    /// - [`Error::Connection`] for a missing command or URL, or when the
    ///   transport cannot be opened.
    /// - [`Error::Timeout`] when the handshake exceeds the timeout.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.state == SessionState::Ready {
            return Ok(());
        }

        let transport = self.config.transport_config(&self.headers, &self.settings)?;
        self.state = SessionState::Initializing;
        info!(transport = %transport.transport(), "initializing MCP session");

        let mut guard = AbandonGuard::new(self);
        let client = &mut *guard.client;
        let opened = bounded(
            "initialize",
            client.config.timeout,
            client
                .connector
                .connect(&transport, &client.settings, &mut client.resources),
        )
        .await;

        let outcome = match opened {
            Ok(session) => {
                client.session = Some(session);
                client.state = SessionState::Ready;
                info!(transport = %transport.transport(), "MCP session ready");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "MCP session initialization failed");
                if let Err(release) = client.resources.release_all().await {
                    warn!(error = %release, "failed to release partially opened session");
                }
                client.state = SessionState::Uninitialized;
                Err(e)
            }
        };
        guard.armed = false;
        outcome
    }

    /// Lists the server's tools.
    ///
    /// # Errors
    ///
    /// Initialization errors, [`Error::Timeout`] or [`Error::Session`].
    pub async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        let session = self.session().await?;
        let tools = bounded("list_tools", self.config.timeout, session.list_tools()).await?;
        debug!(count = tools.len(), "listed tools");
        Ok(tools)
    }

    /// Materializes the prompt `name`.
    ///
    /// # Errors
    ///
    /// Initialization errors, [`Error::Timeout`] or [`Error::Session`].
    pub async fn get_prompt(
        &mut self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<Vec<PromptMessage>> {
        let session = self.session().await?;
        bounded(
            "get_prompt",
            self.config.timeout,
            session.get_prompt(name, arguments),
        )
        .await
    }

    /// Calls the tool `name`.
    ///
    /// `arguments` are laid over the configured default parameters.
    ///
    /// # Errors
    ///
    /// Initialization errors, [`Error::Timeout`] or [`Error::Session`].
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolOutput> {
        let session = self.session().await?;
        let mut merged = self.config.default_parameters.clone();
        merged.extend(arguments);

        debug!(tool = name, "calling tool");
        bounded("call_tool", self.config.timeout, session.call_tool(name, merged)).await
    }

    /// Returns the identity the server announced.
    ///
    /// # Errors
    ///
    /// Initialization errors, [`Error::Timeout`] or [`Error::Session`].
    pub async fn get_server_metadata(&mut self) -> Result<ServerMetadata> {
        let session = self.session().await?;
        bounded(
            "get_server_metadata",
            self.config.timeout,
            session.server_info(),
        )
        .await
    }

    /// Releases the session's resources in reverse acquisition order.
    ///
    /// Does nothing when no session is open, so it may be called repeatedly.
    ///
    /// # Errors
    ///
    /// Returns the first release failure; the remaining resources are still
    /// released and the client is reset either way.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Uninitialized && self.resources.is_empty() {
            debug!("MCP session already closed");
            return Ok(());
        }

        self.state = SessionState::Closing;
        self.session = None;
        let released = self.resources.release_all().await;
        self.state = SessionState::Uninitialized;
        info!("MCP session closed");
        released
    }

    /// Initializes, runs `f`, and closes, whether `f` succeeded or not.
    ///
    /// An error from `f` takes precedence over an error from closing.
    /// Dropping the returned future before it completes still tears the
    /// session down; its resources are then released in the background.
    ///
    /// # Errors
    ///
    /// Initialization errors, the error returned by `f`, or a close error.
    pub async fn scoped<F, T>(&mut self, f: F) -> Result<T>
    where
        F: AsyncFnOnce(&mut Self) -> Result<T>,
    {
        let mut guard = AbandonGuard::new(self);
        guard.client.initialize().await?;
        let result = f(&mut *guard.client).await;
        let closed = guard.client.close().await;
        guard.armed = false;

        match (result, closed) {
            (Ok(value), closed) => closed.map(|()| value),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close)) => {
                warn!(error = %close, "failed to close MCP session after error");
                Err(e)
            }
        }
    }

    /// Blocking scoped entry, kept for callers of the synchronous API.
    ///
    /// Sessions only run on the async runtime, so this always fails and
    /// acquires nothing.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::UnsupportedMode`].
    pub fn enter_blocking(&self) -> Result<()> {
        Err(Error::unsupported_mode(
            "blocking scoped entry is not supported; use `scoped` or `initialize`/`close` from async code",
        ))
    }

    /// Resets the client without awaiting; held resources are released in
    /// the background when the stack is dropped.
    fn abandon(&mut self) {
        self.session = None;
        self.state = SessionState::Uninitialized;
        let resources = mem::take(&mut self.resources);
        if !resources.is_empty() {
            warn!(resources = resources.len(), "MCP session abandoned before it was closed");
        }
    }

    async fn session(&mut self) -> Result<Arc<dyn McpSession>> {
        self.initialize().await?;
        self.session
            .clone()
            .ok_or_else(|| Error::session("session is not open"))
    }
}

/// Abandons the client's session if dropped while still armed, which happens
/// when the future driving a lifecycle step is dropped before it finishes.
struct AbandonGuard<'a> {
    client: &'a mut McpClient,
    armed: bool,
}

impl<'a> AbandonGuard<'a> {
    fn new(client: &'a mut McpClient) -> Self {
        Self {
            client,
            armed: true,
        }
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.client.abandon();
        }
    }
}

impl fmt::Debug for McpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpClient")
            .field("config", &self.config)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("state", &self.state)
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}
