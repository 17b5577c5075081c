//! Several named servers behind one facade.
//!
//! [`MultiServerClient`] forwards every call to a [`SessionManager`]. The
//! default manager, [`SessionPool`], keeps one independently lifecycled
//! session per server.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::auth::resolve_headers;
use crate::config::ConfigLoader;
use crate::error::{Error, Result};
use crate::session::{
    Connector, McpSession, PromptMessage, ResourceStack, RmcpConnector, ToolDescriptor, bounded,
};
use crate::settings::ClientSettings;
use crate::transport::TransportConfig;

/// Per-server connection management behind [`MultiServerClient`].
#[async_trait]
pub trait SessionManager: Send {
    /// Registers `connection` under `name` and connects to it.
    ///
    /// Connecting an already connected server does nothing.
    async fn connect_to_server(&mut self, name: &str, connection: TransportConfig) -> Result<()>;

    /// Tools of every connected server, in connection order.
    async fn get_tools(&mut self) -> Result<Vec<ToolDescriptor>>;

    /// Materializes `prompt` on the connected server `server`.
    async fn get_prompt(
        &mut self,
        server: &str,
        prompt: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<Vec<PromptMessage>>;

    /// Connects every registered server that is not connected yet.
    async fn open(&mut self) -> Result<()>;

    /// Closes every server, most recently connected first.
    async fn close(&mut self) -> Result<()>;

    /// Drops every connection without awaiting, releasing what it can in the
    /// background. Called when a scoped block is abandoned mid-flight.
    fn abandon(&mut self);
}

struct ConnectedServer {
    name: String,
    session: Arc<dyn McpSession>,
    resources: ResourceStack,
    tools: Vec<ToolDescriptor>,
}

/// The default [`SessionManager`], built on a [`Connector`].
///
/// Tools are listed once per server, when it connects.
pub struct SessionPool {
    connector: Arc<dyn Connector>,
    settings: ClientSettings,
    registered: Vec<(String, TransportConfig)>,
    connected: Vec<ConnectedServer>,
}

impl SessionPool {
    /// Creates a pool with the given servers registered but not connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataFormat`] for the first invalid descriptor.
    pub fn new<I, S>(
        connections: I,
        settings: ClientSettings,
        connector: Arc<dyn Connector>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (S, TransportConfig)>,
        S: Into<String>,
    {
        let mut pool = Self {
            connector,
            settings,
            registered: Vec::new(),
            connected: Vec::new(),
        };
        for (name, connection) in connections {
            pool.register(name.into(), connection)?;
        }
        Ok(pool)
    }

    /// Names of the registered servers, in registration order.
    #[must_use]
    pub fn servers(&self) -> Vec<&str> {
        self.registered.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Names of the connected servers, in connection order.
    #[must_use]
    pub fn connected(&self) -> Vec<&str> {
        self.connected.iter().map(|s| s.name.as_str()).collect()
    }

    fn register(&mut self, name: String, connection: TransportConfig) -> Result<()> {
        connection
            .validate()
            .map_err(|e| Error::invalid(format!("server '{name}': {e}")))?;

        match self.registered.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = connection,
            None => self.registered.push((name, connection)),
        }
        Ok(())
    }

    fn is_connected(&self, name: &str) -> bool {
        self.connected.iter().any(|s| s.name == name)
    }

    async fn connect(&mut self, name: &str, connection: &TransportConfig) -> Result<()> {
        if self.is_connected(name) {
            debug!(server = name, "server already connected");
            return Ok(());
        }

        info!(server = name, transport = %connection.transport(), "connecting to MCP server");
        let connector = Arc::clone(&self.connector);
        let settings = &self.settings;
        let timeout = settings.timeout;
        let mut resources = ResourceStack::new();
        let outcome = async {
            let session = bounded(
                "connect",
                timeout,
                connector.connect(connection, settings, &mut resources),
            )
            .await?;
            let tools = bounded("list_tools", timeout, session.list_tools()).await?;
            Ok::<_, Error>((session, tools))
        }
        .await;

        match outcome {
            Ok((session, tools)) => {
                info!(server = name, tools = tools.len(), "connected to MCP server");
                self.connected.push(ConnectedServer {
                    name: name.to_owned(),
                    session,
                    resources,
                    tools,
                });
                Ok(())
            }
            Err(e) => {
                if let Err(release) = resources.release_all().await {
                    warn!(server = name, error = %release, "failed to release partially opened session");
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl SessionManager for SessionPool {
    async fn connect_to_server(&mut self, name: &str, connection: TransportConfig) -> Result<()> {
        self.register(name.to_owned(), connection.clone())?;
        self.connect(name, &connection).await
    }

    async fn get_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        Ok(self
            .connected
            .iter()
            .flat_map(|s| s.tools.iter().cloned())
            .collect())
    }

    async fn get_prompt(
        &mut self,
        server: &str,
        prompt: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<Vec<PromptMessage>> {
        let session = self
            .connected
            .iter()
            .find(|s| s.name == server)
            .map(|s| Arc::clone(&s.session))
            .ok_or_else(|| Error::connection(format!("server '{server}' is not connected")))?;

        bounded(
            "get_prompt",
            self.settings.timeout,
            session.get_prompt(prompt, arguments),
        )
        .await
    }

    async fn open(&mut self) -> Result<()> {
        let pending: Vec<_> = self
            .registered
            .iter()
            .filter(|(name, _)| !self.is_connected(name))
            .cloned()
            .collect();

        for (name, connection) in pending {
            self.connect(&name, &connection).await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(mut server) = self.connected.pop() {
            drop(server.session);
            match server.resources.release_all().await {
                Ok(()) => info!(server = %server.name, "closed MCP server session"),
                Err(e) => {
                    warn!(server = %server.name, error = %e, "failed to close MCP server session");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn abandon(&mut self) {
        let mut resources = ResourceStack::new();
        for mut server in self.connected.drain(..) {
            resources.append(&mut server.resources);
        }
        if !resources.is_empty() {
            warn!(resources = resources.len(), "MCP server sessions abandoned before they were closed");
        }
    }
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("registered", &self.servers())
            .field("connected", &self.connected())
            .finish_non_exhaustive()
    }
}

/// Facade over a [`SessionManager`] for several named servers.
///
/// # Examples
///
/// ```rust,ignore
/// let mut servers = MultiServerClient::new([
///     ("math", TransportConfig::stdio("python", &["math_server.py"])),
///     ("weather", TransportConfig::sse("http://localhost:8000/mcp")),
/// ])?;
/// let tools = servers
///     .scoped(async |servers: &mut MultiServerClient| servers.get_tools().await)
///     .await?;
/// ```
pub struct MultiServerClient {
    manager: Box<dyn SessionManager>,
}

impl MultiServerClient {
    /// Creates a client for the given servers using the `rmcp` transports.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataFormat`] for the first invalid descriptor.
    pub fn new<I, S>(connections: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, TransportConfig)>,
        S: Into<String>,
    {
        let pool = SessionPool::new(
            connections,
            ClientSettings::default(),
            Arc::new(RmcpConnector),
        )?;
        Ok(Self::with_manager(pool))
    }

    /// Creates a client forwarding to `manager`.
    #[must_use]
    pub fn with_manager(manager: impl SessionManager + 'static) -> Self {
        Self {
            manager: Box::new(manager),
        }
    }

    /// Creates a client for every server in the config file.
    ///
    /// # Errors
    ///
    /// Config loading errors, or [`Error::UnsupportedTransport`] for an
    /// `http` entry.
    pub fn from_config_file(explicit: Option<&Path>) -> Result<Self> {
        Self::from_loader(&ConfigLoader::default(), explicit, Arc::new(RmcpConnector))
    }

    /// Creates a client for every server in the file found by `loader`.
    ///
    /// # Errors
    ///
    /// See [`MultiServerClient::from_config_file`].
    pub fn from_loader(
        loader: &ConfigLoader,
        explicit: Option<&Path>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let settings = loader.settings();
        let mut connections = Vec::new();
        for (alias, config) in loader.load_all(explicit)? {
            let headers = resolve_headers(&config.headers, config.api_key.as_ref());
            let transport = config
                .transport_config(&headers, settings)
                .map_err(|e| match e {
                    Error::UnsupportedTransport(msg) => {
                        Error::unsupported_transport(format!("server '{alias}': {msg}"))
                    }
                    other => other,
                })?;
            connections.push((alias, transport));
        }

        let pool = SessionPool::new(connections, settings.clone(), connector)?;
        Ok(Self::with_manager(pool))
    }

    /// See [`SessionManager::connect_to_server`].
    ///
    /// # Errors
    ///
    /// Validation, connection or timeout errors.
    pub async fn connect_to_server(
        &mut self,
        name: &str,
        connection: TransportConfig,
    ) -> Result<()> {
        self.manager.connect_to_server(name, connection).await
    }

    /// See [`SessionManager::get_tools`].
    ///
    /// # Errors
    ///
    /// Errors reported by the manager.
    pub async fn get_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        self.manager.get_tools().await
    }

    /// See [`SessionManager::get_prompt`].
    ///
    /// # Errors
    ///
    /// [`Error::Connection`] when `server` is not connected, or session
    /// errors.
    pub async fn get_prompt(
        &mut self,
        server: &str,
        prompt: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<Vec<PromptMessage>> {
        self.manager.get_prompt(server, prompt, arguments).await
    }

    /// See [`SessionManager::open`].
    ///
    /// # Errors
    ///
    /// The first connection error.
    pub async fn open(&mut self) -> Result<()> {
        self.manager.open().await
    }

    /// See [`SessionManager::close`].
    ///
    /// # Errors
    ///
    /// The first release error.
    pub async fn close(&mut self) -> Result<()> {
        self.manager.close().await
    }

    /// Opens every server, runs `f`, and closes every server, whether `f`
    /// succeeded or not.
    ///
    /// Dropping the returned future before it completes still tears every
    /// session down; resources are then released in the background.
    ///
    /// # Errors
    ///
    /// Connection errors, the error returned by `f`, or a close error.
    pub async fn scoped<F, T>(&mut self, f: F) -> Result<T>
    where
        F: AsyncFnOnce(&mut Self) -> Result<T>,
    {
        let mut guard = AbandonGuard {
            client: self,
            armed: true,
        };
        let result = match guard.client.open().await {
            Ok(()) => f(&mut *guard.client).await,
            Err(e) => Err(e),
        };
        let closed = guard.client.close().await;
        guard.armed = false;

        match (result, closed) {
            (Ok(value), closed) => closed.map(|()| value),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close)) => {
                warn!(error = %close, "failed to close MCP servers after error");
                Err(e)
            }
        }
    }
}

struct AbandonGuard<'a> {
    client: &'a mut MultiServerClient,
    armed: bool,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.client.manager.abandon();
        }
    }
}

impl fmt::Debug for MultiServerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiServerClient").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transport::SseConnection;

    fn pool<const N: usize>(connections: [(&str, TransportConfig); N]) -> Result<SessionPool> {
        SessionPool::new(
            connections,
            ClientSettings::default(),
            Arc::new(RmcpConnector),
        )
    }

    #[test]
    fn rejects_empty_stdio_command() {
        let err = pool([("broken", TransportConfig::stdio("", &[]))]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataFormat);
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn rejects_unparseable_url() {
        let err = pool([("remote", TransportConfig::sse("not a url"))]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataFormat);
    }

    #[test]
    fn rejects_invalid_header_name() {
        let conn = SseConnection::new("http://localhost:8000/mcp").with_header("bad header", "x");
        let err = pool([("remote", conn.into())]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataFormat);
    }

    #[test]
    fn duplicate_names_keep_the_last_descriptor() {
        let pool = pool([
            ("a", TransportConfig::sse("http://one")),
            ("b", TransportConfig::stdio("server", &[])),
            ("a", TransportConfig::sse("http://two")),
        ])
        .unwrap();
        assert_eq!(pool.servers(), vec!["a", "b"]);
        assert_eq!(pool.registered[0].1, TransportConfig::sse("http://two"));
        assert!(pool.connected().is_empty());
    }

    #[tokio::test]
    async fn prompt_from_unconnected_server_fails() {
        let mut client =
            MultiServerClient::new([("math", TransportConfig::stdio("python", &["m.py"]))])
                .unwrap();
        let err = client.get_prompt("math", "intro", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn close_without_connections_is_noop() {
        let mut client = MultiServerClient::new(Vec::<(String, TransportConfig)>::new()).unwrap();
        client.close().await.unwrap();
        assert!(client.get_tools().await.unwrap().is_empty());
    }
}
