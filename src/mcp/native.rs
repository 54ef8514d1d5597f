//! In-process tools behind the same [`ToolSource`] interface as MCP servers.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{ToolConnection, ToolDescriptor, ToolSource};

/// A tool implemented directly in Rust.
#[async_trait]
pub trait NativeTool: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> Value;
    async fn call(&self, args: Value) -> anyhow::Result<Value>;
}

/// Serves a fixed set of [`NativeTool`]s.
#[derive(Debug, Clone)]
pub struct InProcessToolSource {
    name: String,
    tools: Arc<Vec<Arc<dyn NativeTool>>>,
}

impl InProcessToolSource {
    pub fn new(name: impl Into<String>, tools: Vec<Arc<dyn NativeTool>>) -> Self {
        Self {
            name: name.into(),
            tools: Arc::new(tools),
        }
    }
}

#[async_trait]
impl ToolSource for InProcessToolSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> anyhow::Result<Box<dyn ToolConnection>> {
        Ok(Box::new(InProcessConnection {
            tools: Arc::clone(&self.tools),
        }))
    }
}

struct InProcessConnection {
    tools: Arc<Vec<Arc<dyn NativeTool>>>,
}

#[async_trait]
impl ToolConnection for InProcessConnection {
    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDescriptor>> {
        Ok(self
            .tools
            .iter()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.schema(),
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> anyhow::Result<Value> {
        let tool = self
            .tools
            .iter()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| anyhow!("unknown tool: {name}"))?;
        tool.call(Value::Object(arguments)).await
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        Ok(())
    }
}
