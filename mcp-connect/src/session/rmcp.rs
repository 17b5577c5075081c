//! Sessions backed by the `rmcp` crate.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::{
    RoleClient, ServiceExt,
    model::{ClientCapabilities, Implementation, InitializeRequestParams},
    service::{RunningService, ServerSink},
    transport::{
        StreamableHttpClientTransport, child_process::TokioChildProcess,
        streamable_http_client::StreamableHttpClientTransportConfig,
    },
};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::{
    Connector, McpSession, PromptMessage, Resource, ResourceStack, ServerMetadata,
    ToolDescriptor, ToolOutput, decode, encode,
};
use crate::error::{Error, Result};
use crate::settings::ClientSettings;
use crate::transport::{SseConnection, StdioConnection, TransportConfig};

type ClientService = RunningService<RoleClient, InitializeRequestParams>;

/// Opens sessions with `rmcp`: a child process for stdio, the streamable
/// HTTP client for network servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RmcpConnector;

impl RmcpConnector {
    fn init_params(settings: &ClientSettings) -> InitializeRequestParams {
        InitializeRequestParams {
            meta: None,
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: settings.name.clone(),
                version: settings.version.clone(),
                ..Default::default()
            },
        }
    }

    async fn open_stdio(
        conn: &StdioConnection,
        init: InitializeRequestParams,
    ) -> Result<ClientService> {
        let mut cmd = tokio::process::Command::new(&conn.command);
        cmd.args(&conn.args);

        if let Some(dir) = &conn.cwd {
            cmd.current_dir(dir);
        }

        if let Some(env) = &conn.env {
            cmd.env_clear().envs(env);
            if !env.contains_key("PATH")
                && let Some(path) = std::env::var_os("PATH")
            {
                cmd.env("PATH", path);
            }
        }

        let transport = TokioChildProcess::new(cmd)
            .map_err(|e| Error::connection(format!("failed to spawn '{}': {e}", conn.command)))?;

        init.serve(transport).await.map_err(|e| {
            Error::connection(format!("handshake with '{}' failed: {e}", conn.command))
        })
    }

    async fn open_sse(
        conn: &SseConnection,
        settings: &ClientSettings,
        init: InitializeRequestParams,
    ) -> Result<ClientService> {
        let mut headers = HeaderMap::with_capacity(conn.headers.len());
        for (key, value) in &conn.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| Error::connection(format!("invalid header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::connection(format!("invalid value for header '{key}': {e}")))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(conn.connect_timeout.unwrap_or(settings.connect_timeout))
            .read_timeout(conn.read_timeout.unwrap_or(settings.read_timeout))
            .build()
            .map_err(|e| Error::connection(format!("failed to build HTTP client: {e}")))?;

        let transport = StreamableHttpClientTransport::with_client(
            client,
            StreamableHttpClientTransportConfig::with_uri(conn.url.clone()),
        );

        init.serve(transport).await.map_err(|e| {
            Error::connection(format!("failed to connect to '{}': {e}", conn.url))
        })
    }
}

#[async_trait]
impl Connector for RmcpConnector {
    async fn connect(
        &self,
        transport: &TransportConfig,
        settings: &ClientSettings,
        resources: &mut ResourceStack,
    ) -> Result<Arc<dyn McpSession>> {
        let init = Self::init_params(settings);
        let (label, service) = match transport {
            TransportConfig::Stdio(conn) => {
                (format!("stdio:{}", conn.command), Self::open_stdio(conn, init).await?)
            }
            TransportConfig::Sse(conn) => (
                format!("sse:{}", conn.url),
                Self::open_sse(conn, settings, init).await?,
            ),
        };

        info!(transport = %transport.transport(), endpoint = %label, "MCP session established");

        let sink = service.peer().clone();
        resources.push(ServiceHandle { label, service });
        Ok(Arc::new(RmcpSession { sink }))
    }
}

/// The running service; cancelling it closes the transport.
struct ServiceHandle {
    label: String,
    service: ClientService,
}

#[async_trait]
impl Resource for ServiceHandle {
    fn name(&self) -> &str {
        &self.label
    }

    async fn release(self: Box<Self>) -> Result<()> {
        let Self { label, service } = *self;
        let reason = service
            .cancel()
            .await
            .map_err(|e| Error::session(format!("failed to stop '{label}': {e}")))?;
        debug!(endpoint = %label, ?reason, "MCP service stopped");
        Ok(())
    }
}

struct RmcpSession {
    sink: ServerSink,
}

#[async_trait]
impl McpSession for RmcpSession {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let tools = self
            .sink
            .list_all_tools()
            .await
            .map_err(|e| Error::session(format!("tools/list failed: {e}")))?;

        tools
            .iter()
            .map(|tool| decode("tool", encode("tool", tool)?))
            .collect()
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<Vec<PromptMessage>> {
        let mut params = json!({ "name": name });
        if let Some(arguments) = arguments {
            params["arguments"] = Value::Object(arguments);
        }

        let result = self
            .sink
            .get_prompt(decode("prompt request", params)?)
            .await
            .map_err(|e| Error::session(format!("prompts/get '{name}' failed: {e}")))?;

        match encode("prompt result", &result)?.get_mut("messages").map(Value::take) {
            Some(Value::Array(messages)) => {
                messages.into_iter().map(PromptMessage::from_wire).collect()
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let params = json!({ "name": name, "arguments": arguments });
        let result = self
            .sink
            .call_tool(decode("tool call", params)?)
            .await
            .map_err(|e| Error::session(format!("tools/call '{name}' failed: {e}")))?;

        decode("tool result", encode("tool result", &result)?)
    }

    async fn server_info(&self) -> Result<ServerMetadata> {
        let info = self
            .sink
            .peer_info()
            .ok_or_else(|| Error::session("server has not completed the handshake"))?;
        ServerMetadata::from_wire(&encode("server info", info)?)
    }
}
