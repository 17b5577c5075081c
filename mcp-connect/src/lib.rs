//! mcp-connect - Client adapters for Model Context Protocol servers
//!
//! This crate resolves server connection settings from `mcp.json` files,
//! turns API keys into request headers, and manages the lifecycle of MCP
//! sessions over stdio and network transports, for one server
//! ([`McpClient`]) or several ([`MultiServerClient`]).

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod multi;
pub mod prelude;
pub mod session;
pub mod settings;
pub mod transport;

pub use client::{McpClient, SessionState};
pub use config::{ConfigLoader, ConnectionConfig, ConnectionOverrides};
pub use error::{Error, ErrorKind, Result};
pub use multi::{MultiServerClient, SessionManager, SessionPool};
pub use settings::ClientSettings;
pub use transport::{Transport, TransportConfig};
