//! `OpenAI` Chat Completions driver (non-streaming).
//!
//! Works against any `OpenAI`-compatible `/v1/chat/completions` endpoint.

use anyhow::{Context, anyhow, bail};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::mcp::ToolCatalog;

use super::{ChatMessage, Generation, LlmSettings, ModelInvoker, ToolCall, auto_invoke};

const OPENAI_API_BASE: &str = "https://api.openai.com";

/// Driver for the Chat Completions API.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChatCompletionsDriver {
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    fn endpoint(&self) -> String {
        let base = self
            .settings
            .base_url
            .as_deref()
            .unwrap_or(OPENAI_API_BASE)
            .trim_end_matches('/');
        format!("{base}/v1/chat/completions")
    }

    fn build_body(&self, messages: &[ChatMessage], catalog: &ToolCatalog<'_>) -> Value {
        let tools: Vec<Value> = catalog
            .descriptors()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": self.settings.model,
            "stream": false,
            "temperature": self.settings.temperature,
            "messages": messages
                .iter()
                .map(|m| json!({"role": m.role, "content": m.content}))
                .collect::<Vec<_>>(),
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<CompletionToolCall>,
}

#[derive(Debug, Deserialize)]
struct CompletionToolCall {
    id: String,
    function: CompletionFunction,
}

#[derive(Debug, Deserialize)]
struct CompletionFunction {
    name: String,
    /// JSON-encoded arguments.
    #[serde(default)]
    arguments: String,
}

fn interpret(response: CompletionResponse) -> anyhow::Result<(String, Vec<ToolCall>)> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("chat completion returned no choices"))?;

    let calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(|tc| -> anyhow::Result<ToolCall> {
            let CompletionFunction { name, arguments } = tc.function;
            // Some backends send "" for parameterless calls.
            let arguments = if arguments.trim().is_empty() {
                Map::new()
            } else {
                serde_json::from_str::<Map<String, Value>>(&arguments)
                    .with_context(|| format!("invalid arguments for '{name}': {arguments}"))?
            };
            Ok(ToolCall {
                tool_call_id: tc.id,
                tool_name: name,
                arguments,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok((choice.message.content.unwrap_or_default(), calls))
}

#[async_trait::async_trait]
impl ModelInvoker for ChatCompletionsDriver {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        catalog: &ToolCatalog<'_>,
    ) -> anyhow::Result<Generation> {
        let body = self.build_body(messages, catalog);

        let mut rb = self.http.post(self.endpoint()).json(&body);
        if let Some(k) = &self.settings.api_key {
            rb = rb.bearer_auth(k);
        }

        let resp = rb
            .send()
            .await
            .context("Failed to send chat completion request")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("chat completion API error ({status}): {text}");
        }

        let parsed: CompletionResponse = resp
            .json()
            .await
            .context("Failed to decode chat completion response")?;
        let (text, calls) = interpret(parsed)?;
        auto_invoke(text, calls, catalog).await
    }
}
