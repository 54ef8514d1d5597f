//! Instrumented fakes shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use mcp_fs_chat::llm::{ChatMessage, Generation, ModelInvoker, ToolCall, auto_invoke};
use mcp_fs_chat::mcp::{ToolCatalog, ToolConnection, ToolDescriptor, ToolSource};

/// Counts lifecycle events across every connection a source hands out.
#[derive(Debug, Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub calls: AtomicUsize,
    pub last_arguments: Mutex<Option<Map<String, Value>>>,
}

impl Counters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// A tool source whose failures are switched on per test.
#[derive(Debug, Clone)]
pub struct FakeSource {
    pub counters: Arc<Counters>,
    pub tools: Vec<ToolDescriptor>,
    pub reply: Value,
    pub fail_open: bool,
    pub open_delay: Option<Duration>,
    pub fail_list: bool,
    pub fail_call: bool,
    pub fail_close: bool,
}

impl FakeSource {
    pub fn filesystem(reply: Value) -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            tools: vec![
                descriptor("list_directory", "List entries of a directory"),
                descriptor("read_file", "Read a file"),
            ],
            reply,
            fail_open: false,
            open_delay: None,
            fail_list: false,
            fail_call: false,
            fail_close: false,
        }
    }
}

pub fn descriptor(name: &str, description: &str) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        }),
    }
}

#[async_trait]
impl ToolSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn open(&self) -> anyhow::Result<Box<dyn ToolConnection>> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_open {
            bail!("spawn failed: npx not found");
        }
        Ok(Box::new(FakeConnection {
            source: self.clone(),
        }))
    }
}

struct FakeConnection {
    source: FakeSource,
}

#[async_trait]
impl ToolConnection for FakeConnection {
    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDescriptor>> {
        if self.source.fail_list {
            bail!("tools/list failed");
        }
        Ok(self.source.tools.clone())
    }

    async fn call_tool(&self, _name: &str, arguments: Map<String, Value>) -> anyhow::Result<Value> {
        let counters = &self.source.counters;
        counters.calls.fetch_add(1, Ordering::SeqCst);
        *counters.last_arguments.lock().unwrap() = Some(arguments);
        if self.source.fail_call {
            bail!("tool server closed the pipe");
        }
        Ok(self.source.reply.clone())
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.source.counters.closes.fetch_add(1, Ordering::SeqCst);
        if self.source.fail_close {
            bail!("kill failed");
        }
        Ok(())
    }
}

/// What the scripted model does on `generate`.
#[derive(Debug, Clone)]
pub enum Script {
    Text(String),
    /// Request these `(tool, path)` calls, in order.
    Call(Vec<(&'static str, &'static str)>),
    Fail(String),
    Hang,
    Panic,
}

/// A model backend that follows a fixed script and records what it was offered.
#[derive(Debug)]
pub struct ScriptedModel {
    script: Script,
    pub offered_tools: Mutex<Vec<Vec<String>>>,
    pub seen_messages: Mutex<Vec<usize>>,
}

impl ScriptedModel {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            offered_tools: Mutex::new(Vec::new()),
            seen_messages: Mutex::new(Vec::new()),
        })
    }

    pub fn last_offered(&self) -> Vec<String> {
        self.offered_tools
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelInvoker for ScriptedModel {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        catalog: &ToolCatalog<'_>,
    ) -> anyhow::Result<Generation> {
        self.offered_tools
            .lock()
            .unwrap()
            .push(catalog.names().map(ToString::to_string).collect());
        self.seen_messages.lock().unwrap().push(messages.len());

        match &self.script {
            Script::Text(text) => Ok(Generation::text(text.clone())),
            Script::Call(calls) => {
                let calls = calls
                    .iter()
                    .enumerate()
                    .map(|(i, (tool, path))| {
                        let mut arguments = Map::new();
                        arguments.insert("path".to_string(), json!(path));
                        ToolCall {
                            tool_call_id: format!("call_{i}"),
                            tool_name: (*tool).to_string(),
                            arguments,
                        }
                    })
                    .collect();
                auto_invoke(String::new(), calls, catalog).await
            }
            Script::Fail(message) => Err(anyhow!("{message}")),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Generation::default())
            }
            Script::Panic => panic!("model driver exploded"),
        }
    }
}
