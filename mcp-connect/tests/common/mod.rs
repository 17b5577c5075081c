//! In-memory connector and session shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mcp_connect::prelude::*;
use serde_json::{Map, Value, json};

/// Shared, ordered record of what the mock did.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

/// How a connect attempt should behave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Behavior {
    #[default]
    Succeed,
    /// Acquire the transport, then fail the handshake.
    FailHandshake,
    /// Never finish the handshake.
    Hang,
    /// Succeed, but fail to release the transport.
    FailRelease,
}

/// A connector that opens in-memory sessions.
///
/// Each connect pushes a `transport` and a `session` resource, mirroring a
/// real stdio or network session.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    pub journal: Journal,
    pub behavior: Behavior,
    pub transports: Arc<Mutex<Vec<TransportConfig>>>,
}

impl MockConnector {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    pub fn last_transport(&self) -> Option<TransportConfig> {
        self.transports.lock().unwrap().last().cloned()
    }
}

fn label(transport: &TransportConfig) -> String {
    match transport {
        TransportConfig::Stdio(conn) => conn.command.clone(),
        TransportConfig::Sse(conn) => conn.url.clone(),
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        transport: &TransportConfig,
        _settings: &ClientSettings,
        resources: &mut ResourceStack,
    ) -> Result<Arc<dyn McpSession>> {
        let server = label(transport);
        self.transports.lock().unwrap().push(transport.clone());
        self.journal.record(format!("open transport {server}"));
        resources.push(Tracked {
            name: format!("transport {server}"),
            journal: self.journal.clone(),
            fail: self.behavior == Behavior::FailRelease,
        });

        match self.behavior {
            Behavior::FailHandshake => return Err(Error::connection("handshake refused")),
            Behavior::Hang => tokio::time::sleep(Duration::from_secs(3600)).await,
            Behavior::Succeed | Behavior::FailRelease => {}
        }

        self.journal.record(format!("open session {server}"));
        resources.push(Tracked {
            name: format!("session {server}"),
            journal: self.journal.clone(),
            fail: false,
        });

        Ok(Arc::new(MockSession {
            server,
            journal: self.journal.clone(),
        }))
    }
}

struct Tracked {
    name: String,
    journal: Journal,
    fail: bool,
}

#[async_trait]
impl Resource for Tracked {
    fn name(&self) -> &str {
        &self.name
    }

    async fn release(self: Box<Self>) -> Result<()> {
        self.journal.record(format!("close {}", self.name));
        if self.fail {
            Err(Error::session(format!("could not close {}", self.name)))
        } else {
            Ok(())
        }
    }
}

/// A session whose single tool is named after its server.
struct MockSession {
    server: String,
    journal: Journal,
}

#[async_trait]
impl McpSession for MockSession {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.journal.record(format!("list_tools {}", self.server));
        Ok(vec![ToolDescriptor {
            name: format!("{}_echo", self.server),
            description: Some("Echoes its arguments".into()),
            input_schema: json!({ "type": "object" }),
        }])
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<Vec<PromptMessage>> {
        self.journal.record(format!("get_prompt {name}"));
        let args = Value::Object(arguments.unwrap_or_default());
        Ok(vec![
            PromptMessage::user(format!("{name} {args}")),
            PromptMessage::assistant(format!("from {}", self.server)),
        ])
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutput> {
        self.journal.record(format!("call_tool {name}"));
        Ok(ToolOutput {
            content: vec![json!({ "type": "text", "text": name })],
            is_error: false,
            structured_content: Some(Value::Object(arguments)),
        })
    }

    async fn server_info(&self) -> Result<ServerMetadata> {
        Ok(ServerMetadata {
            id: self.server.clone(),
            name: self.server.clone(),
            version: "1.0.0".into(),
            description: None,
        })
    }
}

/// Gives background releases a chance to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
