//! Model backends and the per-request orchestrator.
//!
//! A [`ModelInvoker`] performs one non-streaming generation, offering the
//! request's [`ToolCatalog`] to the model. Backends that return tool calls
//! have the first one executed against the catalog before `generate`
//! returns (auto-invoke); see [`auto_invoke`].
//!
//! # Drivers
//!
//! - [`GeminiDriver`]: Google Generative Language `generateContent`
//! - [`ChatCompletionsDriver`]: `OpenAI`-compatible `/v1/chat/completions`

pub mod chat_completions;
pub mod gemini;
pub mod orchestrator;

pub use chat_completions::ChatCompletionsDriver;
pub use gemini::GeminiDriver;
pub use orchestrator::{Orchestrator, OrchestratorOptions};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mcp::ToolCatalog;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
/// Sampling temperature used when none is configured.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Environment variable holding the backend credential by default.
pub const DEFAULT_API_KEY_ENV: &str = "GOOGLE_GENERATIVE_AI_API_KEY";

/// Backend wire protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProtocol {
    /// Google Generative Language API.
    #[default]
    Gemini,
    /// `OpenAI` Chat Completions API.
    Chat,
}

/// Resolved backend settings.
#[derive(Clone)]
pub struct LlmSettings {
    pub protocol: LlmProtocol,
    /// Overrides the protocol's public endpoint.
    pub base_url: Option<String>,
    /// `None` when the credential variable is unset or blank.
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("protocol", &self.protocol)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A message in the caller's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    /// UI keying only; never sent to a backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            id: None,
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Correlates the call with its [`ToolResult`].
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

/// Result of executing a [`ToolCall`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Raw result payload from the tool provider.
    pub result: Value,
}

/// Output of one generation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub text: String,
    /// Every call the backend asked for, in order.
    pub tool_calls: Vec<ToolCall>,
    /// Results of the calls that were executed.
    pub tool_results: Vec<ToolResult>,
}

impl Generation {
    /// Plain text answer with no tool activity.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// The first tool call paired with its result, if both exist.
    pub fn first_exchange(&self) -> Option<(&ToolCall, &ToolResult)> {
        let call = self.tool_calls.first()?;
        let result = self
            .tool_results
            .iter()
            .find(|r| r.tool_call_id == call.tool_call_id)?;
        Some((call, result))
    }
}

/// A generative model backend.
#[async_trait::async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Run one generation over `messages`, offering `catalog` as callable tools.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails or its reply can't be decoded.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        catalog: &ToolCatalog<'_>,
    ) -> anyhow::Result<Generation>;
}

/// Execute the first requested tool call and assemble the [`Generation`].
///
/// Only one call per request is honoured. Further calls are kept in
/// `tool_calls` for diagnostics but never executed.
///
/// # Errors
///
/// A call that cannot be executed (unknown tool, transport failure, deadline)
/// fails the whole generation.
pub async fn auto_invoke(
    text: String,
    tool_calls: Vec<ToolCall>,
    catalog: &ToolCatalog<'_>,
) -> anyhow::Result<Generation> {
    let mut tool_results = Vec::new();

    if let Some(call) = tool_calls.first() {
        if tool_calls.len() > 1 {
            let ignored: Vec<&str> = tool_calls[1..].iter().map(|c| c.tool_name.as_str()).collect();
            tracing::warn!(
                executed = %call.tool_name,
                ignored = ?ignored,
                "Backend requested several tool calls; executing only the first"
            );
        }

        tracing::info!(
            tool_call_id = %call.tool_call_id,
            tool_name = %call.tool_name,
            "Executing tool call"
        );

        let result = catalog
            .invoke(&call.tool_name, call.arguments.clone())
            .await
            .inspect_err(|e| {
                tracing::error!(
                    tool_name = %call.tool_name,
                    error = %format!("{e:#}"),
                    "Tool call failed"
                );
            })
            .with_context(|| format!("executing tool '{}' failed", call.tool_name))?;

        tool_results.push(ToolResult {
            tool_call_id: call.tool_call_id.clone(),
            tool_name: call.tool_name.clone(),
            result,
        });
    }

    Ok(Generation {
        text,
        tool_calls,
        tool_results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            tool_call_id: id.to_string(),
            tool_name: name.to_string(),
            arguments: Map::new(),
        }
    }

    #[test]
    fn test_message_wire_format() {
        let msg: ChatMessage =
            serde_json::from_value(json!({"id": "17", "role": "user", "content": "hi"})).unwrap();
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.id.as_deref(), Some("17"));

        assert!(serde_json::from_value::<ChatMessage>(json!({"role": "wizard", "content": ""})).is_err());
    }

    #[test]
    fn test_tool_call_serializes_camel_case() {
        let value = serde_json::to_value(call("c1", "list_directory")).unwrap();
        assert_eq!(value["toolCallId"], "c1");
        assert_eq!(value["toolName"], "list_directory");
    }

    #[test]
    fn test_first_exchange_matches_by_id() {
        let generation = Generation {
            text: String::new(),
            tool_calls: vec![call("a", "one"), call("b", "two")],
            tool_results: vec![ToolResult {
                tool_call_id: "a".into(),
                tool_name: "one".into(),
                result: json!({}),
            }],
        };
        let (c, r) = generation.first_exchange().unwrap();
        assert_eq!(c.tool_name, "one");
        assert_eq!(r.tool_call_id, "a");

        let unmatched = Generation {
            tool_results: vec![],
            ..generation
        };
        assert!(unmatched.first_exchange().is_none());
    }

    #[tokio::test]
    async fn test_auto_invoke_without_connection_fails() {
        let catalog = ToolCatalog::empty();
        let err = auto_invoke(
            String::new(),
            vec![call("a", "list_directory"), call("b", "read_file")],
            &catalog,
        )
        .await
        .unwrap_err();

        assert!(format!("{err:#}").contains("executing tool 'list_directory' failed"));
    }

    #[tokio::test]
    async fn test_auto_invoke_without_calls_keeps_text() {
        let generation = auto_invoke("plain".into(), Vec::new(), &ToolCatalog::empty())
            .await
            .unwrap();
        assert_eq!(generation, Generation::text("plain"));
    }

    #[test]
    fn test_settings_debug_redacts_key() {
        let settings = LlmSettings {
            protocol: LlmProtocol::Gemini,
            base_url: None,
            api_key: Some("super-secret".into()),
            model: DEFAULT_MODEL.into(),
            temperature: DEFAULT_TEMPERATURE,
        };
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
