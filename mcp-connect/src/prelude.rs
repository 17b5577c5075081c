//! Prelude module for convenient imports.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mcp_connect::prelude::*;
//! ```

pub use crate::auth::ApiKey;
pub use crate::client::{McpClient, SessionState};
pub use crate::config::{ConfigLoader, ConnectionConfig, ConnectionOverrides, SearchPaths};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::multi::{MultiServerClient, SessionManager, SessionPool};
pub use crate::session::{
    Connector, McpSession, PromptContent, PromptMessage, Resource, ResourceStack, Role,
    RmcpConnector, ServerMetadata, ToolDescriptor, ToolOutput,
};
pub use crate::settings::ClientSettings;
pub use crate::transport::{SseConnection, StdioConnection, Transport, TransportConfig};
