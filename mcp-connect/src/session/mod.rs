//! The protocol seam: opening sessions and the operations they forward.
//!
//! [`Connector`] selects and parametrizes a transport, performs the
//! handshake and records every acquired resource on a [`ResourceStack`].
//! [`McpSession`] is the live, handshaken session. [`RmcpConnector`] is the
//! implementation backed by the `rmcp` crate; tests substitute their own.

mod rmcp;
mod stack;

pub use self::rmcp::RmcpConnector;
pub use stack::{Resource, ResourceStack};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::settings::ClientSettings;
use crate::transport::TransportConfig;

/// Opens sessions over a transport.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens the transport described by `transport` and completes the
    /// handshake.
    ///
    /// Each resource is pushed onto `resources` as soon as it is acquired,
    /// so a failure part-way leaves the caller able to release what exists.
    async fn connect(
        &self,
        transport: &TransportConfig,
        settings: &ClientSettings,
        resources: &mut ResourceStack,
    ) -> Result<Arc<dyn McpSession>>;
}

/// Operations on a live session.
#[async_trait]
pub trait McpSession: Send + Sync {
    /// Lists every tool the server exposes.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Materializes a prompt template into messages.
    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<Vec<PromptMessage>>;

    /// Invokes a tool.
    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutput>;

    /// Returns the identity the server announced during the handshake.
    async fn server_info(&self) -> Result<ServerMetadata>;
}

/// A tool exposed by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// JSON schema of the arguments.
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// Result of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Content blocks returned by the tool.
    #[serde(default)]
    pub content: Vec<Value>,
    /// Whether the tool reported an error.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
    /// Structured result, when the tool declares an output schema.
    #[serde(rename = "structuredContent", default)]
    pub structured_content: Option<Value>,
}

impl ToolOutput {
    /// Concatenates the text blocks of the result.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Who a prompt message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human side of the conversation.
    User,
    /// The model side of the conversation.
    Assistant,
}

/// Content of a prompt message.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptContent {
    /// Plain text.
    Text(String),
    /// Images, embedded resources and other non-text blocks, as sent.
    Other(Value),
}

/// One role-tagged message of a materialized prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    /// Message author.
    pub role: Role,
    /// Message body.
    pub content: PromptContent,
}

impl PromptMessage {
    /// Creates a text message from the user.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: PromptContent::Text(text.into()),
        }
    }

    /// Creates a text message from the assistant.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: PromptContent::Text(text.into()),
        }
    }

    /// Returns the text, if this is a text message.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            PromptContent::Text(text) => Some(text),
            PromptContent::Other(_) => None,
        }
    }

    /// Reads a message from its wire form:
    /// `{"role": "user", "content": {"type": "text", "text": "..."}}`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] when the role is missing or unknown.
    pub fn from_wire(value: Value) -> Result<Self> {
        let role = value
            .get("role")
            .cloned()
            .ok_or_else(|| Error::session("prompt message without a role"))
            .and_then(|r| decode::<Role>("prompt message role", r))?;

        let content = match value.get("content") {
            Some(block) if block.get("type").and_then(Value::as_str) == Some("text") => block
                .get("text")
                .and_then(Value::as_str)
                .map_or_else(|| PromptContent::Other(block.clone()), |t| {
                    PromptContent::Text(t.to_owned())
                }),
            Some(block) => PromptContent::Other(block.clone()),
            None => PromptContent::Other(Value::Null),
        };

        Ok(Self { role, content })
    }
}

/// Identity of a connected server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMetadata {
    /// Stable identifier; the announced name.
    pub id: String,
    /// Announced name.
    pub name: String,
    /// Announced version.
    pub version: String,
    /// Usage instructions the server sent, if any.
    pub description: Option<String>,
}

impl ServerMetadata {
    /// Reads metadata from the handshake result's wire form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] when `serverInfo` is missing.
    pub fn from_wire(value: &Value) -> Result<Self> {
        let info = value
            .get("serverInfo")
            .ok_or_else(|| Error::session("handshake result without serverInfo"))?;
        let field = |key: &str| {
            info.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };
        let name = field("name");

        Ok(Self {
            id: name.clone(),
            name,
            version: field("version"),
            description: value
                .get("instructions")
                .and_then(Value::as_str)
                .map(str::to_owned),
        })
    }
}

/// Runs `fut`, failing with [`Error::Timeout`] once `timeout` elapses.
pub(crate) async fn bounded<T>(
    operation: &str,
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or_else(|_| Err(Error::timeout(operation, timeout)))
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(what: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::session(format!("malformed {what}: {e}")))
}

pub(crate) fn encode<T: Serialize>(what: &str, value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::session(format!("unencodable {what}: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_descriptor_from_wire() {
        let tool: ToolDescriptor = decode(
            "tool",
            json!({
                "name": "add",
                "description": "Adds numbers",
                "inputSchema": { "type": "object" },
                "annotations": { "readOnlyHint": true }
            }),
        )
        .unwrap();
        assert_eq!(tool.name, "add");
        assert_eq!(tool.description.as_deref(), Some("Adds numbers"));
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn tool_output_text_joins_text_blocks() {
        let output: ToolOutput = decode(
            "tool result",
            json!({
                "content": [
                    { "type": "text", "text": "a" },
                    { "type": "image", "data": "..", "mimeType": "image/png" },
                    { "type": "text", "text": "b" }
                ],
                "isError": false
            }),
        )
        .unwrap();
        assert_eq!(output.text(), "a\nb");
        assert!(!output.is_error);
        assert!(output.structured_content.is_none());
    }

    #[test]
    fn prompt_message_text() {
        let msg = PromptMessage::from_wire(json!({
            "role": "assistant",
            "content": { "type": "text", "text": "hello" }
        }))
        .unwrap();
        assert_eq!(msg, PromptMessage::assistant("hello"));
        assert_eq!(msg.text(), Some("hello"));
    }

    #[test]
    fn prompt_message_non_text_is_kept() {
        let msg = PromptMessage::from_wire(json!({
            "role": "user",
            "content": { "type": "image", "data": "AAAA", "mimeType": "image/png" }
        }))
        .unwrap();
        assert_eq!(msg.role, Role::User);
        assert!(matches!(msg.content, PromptContent::Other(_)));
        assert_eq!(msg.text(), None);
    }

    #[test]
    fn prompt_message_unknown_role_is_rejected() {
        assert!(PromptMessage::from_wire(json!({ "role": "system", "content": {} })).is_err());
        assert!(PromptMessage::from_wire(json!({ "content": {} })).is_err());
    }

    #[tokio::test]
    async fn bounded_times_out() {
        let err = bounded("ping", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Timeout);
        assert!(err.to_string().contains("ping"));
    }

    #[test]
    fn server_metadata_from_handshake() {
        let meta = ServerMetadata::from_wire(&json!({
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "serverInfo": { "name": "calc", "version": "1.0.0" },
            "instructions": "Use add for sums."
        }))
        .unwrap();
        assert_eq!(meta.id, "calc");
        assert_eq!(meta.name, "calc");
        assert_eq!(meta.version, "1.0.0");
        assert_eq!(meta.description.as_deref(), Some("Use add for sums."));
    }
}
