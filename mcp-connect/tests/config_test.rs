//! From `mcp.json` to an opened session.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_fs::TempDir;
use assert_fs::prelude::*;
use common::{MockConnector, init_tracing};
use mcp_connect::prelude::*;
use serde_json::{Value, json};

struct Workspace {
    cwd: TempDir,
    home: TempDir,
}

impl Workspace {
    fn new() -> Self {
        init_tracing();
        Self {
            cwd: TempDir::new().unwrap(),
            home: TempDir::new().unwrap(),
        }
    }

    fn loader(&self) -> ConfigLoader {
        ConfigLoader::new(ClientSettings::default()).with_search_paths(SearchPaths::new(
            Some(self.cwd.to_path_buf()),
            Some(self.home.to_path_buf()),
        ))
    }

    fn client(
        &self,
        server: Option<&str>,
        overrides: ConnectionOverrides,
        connector: &MockConnector,
    ) -> Result<McpClient> {
        McpClient::from_loader(&self.loader(), server, None, overrides)
            .map(|client| client.connector(Arc::new(connector.clone())))
    }
}

fn servers() -> Value {
    json!({
        "default_server": "local",
        "servers": {
            "local": {
                "transport": "stdio",
                "command": "python",
                "args": ["server.py", "--stdio"],
                "timeout": 15
            },
            "remote": {
                "transport": "sse",
                "base_url": "https://tools.example.com/mcp/",
                "api_key": "env:PATH",
                "default_headers": { "X-Team": "search", "X-Retries": 3 },
                "default_parameters": { "units": "metric" }
            },
            "legacy": {
                "transport": "http",
                "base_url": "https://legacy.example.com"
            }
        }
    })
}

#[tokio::test]
async fn default_server_from_working_directory() {
    let ws = Workspace::new();
    ws.cwd.child("mcp.json").write_str(&servers().to_string()).unwrap();
    let connector = MockConnector::default();

    let mut client = ws
        .client(None, ConnectionOverrides::new(), &connector)
        .unwrap();
    assert_eq!(client.config().timeout, Duration::from_secs(15));
    client.initialize().await.unwrap();

    let Some(TransportConfig::Stdio(conn)) = connector.last_transport() else {
        panic!("expected a stdio transport");
    };
    assert_eq!(conn.command, "python");
    assert_eq!(conn.args, vec!["server.py", "--stdio"]);
}

#[tokio::test]
async fn home_dotfile_is_used_when_working_directory_has_none() {
    let ws = Workspace::new();
    ws.home.child(".mcp.json").write_str(&servers().to_string()).unwrap();
    let connector = MockConnector::default();

    let client = ws
        .client(Some("remote"), ConnectionOverrides::new(), &connector)
        .unwrap();
    assert_eq!(
        client.config().base_url.as_deref(),
        Some("https://tools.example.com/mcp")
    );
}

#[tokio::test]
async fn env_api_key_becomes_bearer_header() {
    let ws = Workspace::new();
    ws.cwd.child("mcp.json").write_str(&servers().to_string()).unwrap();
    let connector = MockConnector::default();

    let mut client = ws
        .client(Some("remote"), ConnectionOverrides::new(), &connector)
        .unwrap();
    client.initialize().await.unwrap();

    let Some(TransportConfig::Sse(conn)) = connector.last_transport() else {
        panic!("expected an sse transport");
    };
    let path = std::env::var("PATH").unwrap();
    assert_eq!(conn.headers["Authorization"], format!("Bearer {path}"));
    assert_eq!(conn.headers["X-Team"], "search");
    assert!(!conn.headers.contains_key("X-Retries"));
}

#[tokio::test]
async fn unset_env_api_key_adds_no_header() {
    let ws = Workspace::new();
    ws.cwd
        .child("mcp.json")
        .write_str(
            &json!({
                "servers": {
                    "default": {
                        "transport": "sse",
                        "base_url": "http://localhost:8000/mcp",
                        "api_key": "env:MCP_CONNECT_TEST_SURELY_UNSET_KEY"
                    }
                }
            })
            .to_string(),
        )
        .unwrap();
    let connector = MockConnector::default();

    let client = ws
        .client(None, ConnectionOverrides::new(), &connector)
        .unwrap();
    assert!(client.headers().is_empty());
}

#[tokio::test]
async fn overrides_apply_per_field() {
    let ws = Workspace::new();
    ws.cwd.child("mcp.json").write_str(&servers().to_string()).unwrap();
    let connector = MockConnector::default();

    let overrides = ConnectionOverrides::new()
        .with_timeout(Duration::from_secs(5))
        .with_header("X-Team", "ranking")
        .with_default_parameter("limit", json!(5))
        .with_api_key("literal-key");
    let mut client = ws.client(Some("remote"), overrides, &connector).unwrap();

    assert_eq!(client.config().timeout, Duration::from_secs(5));
    assert_eq!(
        client.config().base_url.as_deref(),
        Some("https://tools.example.com/mcp")
    );
    assert_eq!(client.headers()["X-Team"], "ranking");
    assert_eq!(client.headers()["Authorization"], "Bearer literal-key");

    let output = client
        .call_tool("search", serde_json::Map::new())
        .await
        .unwrap();
    assert_eq!(
        output.structured_content,
        Some(json!({ "units": "metric", "limit": 5 }))
    );
}

#[tokio::test]
async fn http_entry_loads_but_cannot_open() {
    let ws = Workspace::new();
    ws.cwd.child("mcp.json").write_str(&servers().to_string()).unwrap();
    let connector = MockConnector::default();

    let mut client = ws
        .client(Some("legacy"), ConnectionOverrides::new(), &connector)
        .unwrap();
    assert_eq!(client.config().transport, Transport::Http);

    let err = client.initialize().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedTransport);
    assert!(connector.journal.events().is_empty());
}

#[test]
fn missing_file_is_file_not_found() {
    let ws = Workspace::new();
    let err = ws
        .client(None, ConnectionOverrides::new(), &MockConnector::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileNotFound);
}

#[test]
fn explicit_path_skips_search() {
    let ws = Workspace::new();
    ws.cwd.child("mcp.json").write_str(&servers().to_string()).unwrap();
    let custom = ws.home.child("custom.json");
    custom
        .write_str(
            &json!({ "servers": { "default": { "transport": "stdio", "command": "node" } } })
                .to_string(),
        )
        .unwrap();

    let config = ws
        .loader()
        .load(None, Some(custom.path()), ConnectionOverrides::new())
        .unwrap();
    assert_eq!(config.command.as_deref(), Some("node"));

    let missing = ws.home.child("missing.json");
    let err = ws
        .loader()
        .load(None, Some(missing.path()), ConnectionOverrides::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileNotFound);
}

#[test]
fn malformed_json_names_the_file() {
    let ws = Workspace::new();
    ws.cwd.child("mcp.json").write_str("{ \"servers\": ").unwrap();

    let err = ws
        .loader()
        .load(None, None, ConnectionOverrides::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataFormat);
    assert!(err.to_string().contains("mcp.json"));
}

#[test]
fn unknown_transport_is_unsupported() {
    let ws = Workspace::new();
    ws.cwd
        .child("mcp.json")
        .write_str(&json!({ "servers": { "default": { "transport": "websocket" } } }).to_string())
        .unwrap();

    let err = ws
        .loader()
        .load(None, None, ConnectionOverrides::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedTransport);
}

#[test]
fn load_all_lists_every_server() {
    let ws = Workspace::new();
    ws.cwd.child("mcp.json").write_str(&servers().to_string()).unwrap();

    let aliases: Vec<_> = ws
        .loader()
        .load_all(None)
        .unwrap()
        .into_iter()
        .map(|(alias, _)| alias)
        .collect();
    assert_eq!(aliases, vec!["legacy", "local", "remote"]);
}
