//! MCP tool sources backed by the `rmcp` client.

use std::{collections::HashMap, path::PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParam, Tool},
    service::ServiceExt,
    transport::{StreamableHttpClientTransport, TokioChildProcess},
};
use serde_json::{Map, Value};
use tokio::process::Command;
use url::Url;

use super::config::expand_env_map;
use super::{ToolConnection, ToolDescriptor, ToolSource};

type DynClientService = rmcp::service::RunningService<
    rmcp::service::RoleClient,
    Box<dyn rmcp::service::DynService<rmcp::service::RoleClient>>,
>;

/// Spawns a stdio MCP server per connection.
#[derive(Debug, Clone)]
pub struct SubprocessToolSource {
    name: String,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    root: PathBuf,
}

impl SubprocessToolSource {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
            env: HashMap::new(),
            root: root.into(),
        }
    }

    #[must_use]
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Full argument vector: configured args followed by the filesystem root.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(self.root.to_string_lossy().into_owned());
        args
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl ToolSource for SubprocessToolSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> anyhow::Result<Box<dyn ToolConnection>> {
        let mut cmd = Command::new(&self.command);
        cmd.args(self.launch_args()).kill_on_drop(true);
        for (k, v) in expand_env_map(&self.env) {
            cmd.env(k, v);
        }

        let transport = TokioChildProcess::new(cmd)
            .with_context(|| format!("failed to spawn tool server '{}'", self.name))?;
        let service = ().into_dyn().serve(transport).await.with_context(|| {
            format!("MCP handshake with tool server '{}' failed", self.name)
        })?;

        Ok(Box::new(RmcpConnection {
            source: self.name.clone(),
            service,
        }))
    }
}

/// Dials a streamable-HTTP MCP endpoint per connection.
#[derive(Debug, Clone)]
pub struct RemoteToolSource {
    name: String,
    url: Url,
}

impl RemoteToolSource {
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        Self {
            name: name.into(),
            url,
        }
    }
}

#[async_trait]
impl ToolSource for RemoteToolSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> anyhow::Result<Box<dyn ToolConnection>> {
        let transport = StreamableHttpClientTransport::from_uri(self.url.to_string());
        let service = ().into_dyn().serve(transport).await.with_context(|| {
            // Host only: the query string may carry credentials.
            format!(
                "failed to connect remote tool server '{}' at {}",
                self.name,
                self.url.host_str().unwrap_or("<no host>")
            )
        })?;

        Ok(Box::new(RmcpConnection {
            source: self.name.clone(),
            service,
        }))
    }
}

struct RmcpConnection {
    source: String,
    service: DynClientService,
}

fn descriptor_from_tool(tool: Tool) -> ToolDescriptor {
    ToolDescriptor {
        name: tool.name.to_string(),
        description: tool.description.as_deref().unwrap_or("").to_string(),
        input_schema: Value::Object((*tool.input_schema).clone()),
    }
}

#[async_trait]
impl ToolConnection for RmcpConnection {
    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDescriptor>> {
        let tools = self
            .service
            .list_all_tools()
            .await
            .with_context(|| format!("tools/list failed for '{}'", self.source))?;
        Ok(tools.into_iter().map(descriptor_from_tool).collect())
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> anyhow::Result<Value> {
        let res = self
            .service
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments: Some(arguments),
            })
            .await
            .with_context(|| format!("tools/call failed for {}::{name}", self.source))?;
        Ok(serde_json::to_value(res)?)
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        let Self { source, service } = *self;
        let reason = service
            .cancel()
            .await
            .with_context(|| format!("failed to shut down tool server '{source}'"))?;
        tracing::debug!(source = %source, reason = ?reason, "Tool server closed");
        Ok(())
    }
}
