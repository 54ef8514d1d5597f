//! Tool sources speaking the Model Context Protocol (MCP).
//!
//! A [`ToolSource`] knows how to open a fresh [`ToolConnection`]; the
//! orchestrator opens exactly one connection per chat request and closes it
//! before the response leaves. Sources are never pools: every `open` spawns
//! (or dials) a new provider.
//!
//! # Variants
//!
//! - [`rmcp_source::SubprocessToolSource`]: a stdio child process, e.g.
//!   `npx -y @modelcontextprotocol/server-filesystem /srv/files`
//! - [`rmcp_source::RemoteToolSource`]: a streamable-HTTP MCP endpoint
//! - [`native::InProcessToolSource`]: [`native::NativeTool`]s run in-process,
//!   such as the sandboxed [`fs_tools::filesystem_tools`]
//!
//! # Lifecycle
//!
//! ```text
//! Unopened -> open() -> Open ---- close() ----> Closed
//!                   \-> OpenFailed (tools disabled for the request)
//! ```
//!
//! [`ToolConnection::close`] takes `self: Box<Self>`, so a connection can be
//! closed at most once and cannot be used afterwards.

pub mod config;
pub mod content;
pub mod fs_tools;
pub mod native;
pub mod rmcp_source;

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

/// A callable tool advertised by a connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool arguments.
    pub input_schema: Value,
}

/// Factory for per-request tool connections.
#[async_trait]
pub trait ToolSource: Send + Sync + std::fmt::Debug {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Launch (or dial) the provider and complete the protocol handshake.
    async fn open(&self) -> anyhow::Result<Box<dyn ToolConnection>>;
}

/// A live connection to a tool provider.
#[async_trait]
pub trait ToolConnection: Send + Sync {
    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDescriptor>>;

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> anyhow::Result<Value>;

    /// Terminate the provider and release the channel.
    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}

/// Tools available to the model for one request.
///
/// The catalog borrows the connection it was listed from, so the connection
/// cannot be closed while a model call still holds the catalog.
pub struct ToolCatalog<'c> {
    tools: BTreeMap<String, ToolDescriptor>,
    connection: Option<&'c dyn ToolConnection>,
    call_deadline: Duration,
}

impl std::fmt::Debug for ToolCatalog<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCatalog")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("connected", &self.connection.is_some())
            .field("call_deadline", &self.call_deadline)
            .finish()
    }
}

impl ToolCatalog<'static> {
    /// A catalog with no tools (tools-disabled mode).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            tools: BTreeMap::new(),
            connection: None,
            call_deadline: Duration::ZERO,
        }
    }
}

impl<'c> ToolCatalog<'c> {
    /// Build a catalog over `connection`. Duplicate names keep the first entry.
    pub fn new(
        connection: &'c dyn ToolConnection,
        tools: Vec<ToolDescriptor>,
        call_deadline: Duration,
    ) -> Self {
        let mut map = BTreeMap::new();
        for tool in tools {
            if map.contains_key(&tool.name) {
                tracing::warn!(tool = %tool.name, "Duplicate tool name advertised, keeping first");
                continue;
            }
            map.insert(tool.name.clone(), tool);
        }

        Self {
            tools: map,
            connection: Some(connection),
            call_deadline,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Tool descriptors in name order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Execute a catalog tool through the owning connection, bounded by the
    /// per-call deadline.
    pub async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> anyhow::Result<Value> {
        let Some(connection) = self.connection else {
            bail!("no tool connection available for '{name}'");
        };
        if !self.tools.contains_key(name) {
            bail!("unknown tool: {name}");
        }

        tokio::time::timeout(self.call_deadline, connection.call_tool(name, arguments))
            .await
            .map_err(|_| {
                anyhow!(
                    "tool '{name}' did not answer within {}s",
                    self.call_deadline.as_secs_f32()
                )
            })?
    }
}
