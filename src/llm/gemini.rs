//! Google Gemini driver (`models/{model}:generateContent`).
//!
//! The API key travels in the `x-goog-api-key` header, never in the URL, so
//! it cannot end up in request logs.

use anyhow::{Context, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::mcp::{ToolCatalog, ToolDescriptor};

use super::{ChatMessage, Generation, LlmSettings, MessageRole, ModelInvoker, ToolCall, auto_invoke};

/// Official Generative Language endpoint.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Schema keywords the Gemini function-declaration dialect rejects.
const UNSUPPORTED_SCHEMA_KEYS: [&str; 2] = ["$schema", "additionalProperties"];

/// Driver for the Gemini `generateContent` API.
#[derive(Clone)]
pub struct GeminiDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for GeminiDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl GeminiDriver {
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
            .unwrap_or(GEMINI_API_BASE)
            .trim_end_matches('/');
        format!("{base}/models/{}:generateContent", self.settings.model)
    }

    fn build_request(&self, messages: &[ChatMessage], catalog: &ToolCatalog<'_>) -> GeminiRequest {
        let contents = messages
            .iter()
            .map(|m| GeminiContent {
                role: match m.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant => "model",
                }
                .to_string(),
                parts: vec![GeminiPart::Text {
                    text: m.content.clone(),
                }],
            })
            .collect();

        let declarations: Vec<GeminiFunctionDeclaration> =
            catalog.descriptors().map(function_declaration).collect();

        GeminiRequest {
            contents,
            tools: (!declarations.is_empty()).then(|| {
                vec![GeminiTools {
                    function_declarations: declarations,
                }]
            }),
            generation_config: GeminiGenerationConfig {
                temperature: self.settings.temperature,
            },
        }
    }
}

fn function_declaration(tool: &ToolDescriptor) -> GeminiFunctionDeclaration {
    GeminiFunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: gemini_parameters(&tool.input_schema),
    }
}

/// Adapt a JSON Schema to Gemini's dialect. Parameterless tools get `None`.
fn gemini_parameters(schema: &Value) -> Option<Value> {
    let mut schema = schema.clone();
    strip_unsupported(&mut schema);

    let has_properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|p| !p.is_empty());
    let is_object = schema.get("type").and_then(Value::as_str) == Some("object");

    if is_object && !has_properties {
        None
    } else {
        Some(schema)
    }
}

fn strip_unsupported(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for key in UNSUPPORTED_SCHEMA_KEYS {
                map.remove(key);
            }
            for child in map.values_mut() {
                strip_unsupported(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_unsupported),
        _ => {}
    }
}

/// Split a candidate into concatenated text and requested calls.
fn interpret(response: GeminiResponse) -> anyhow::Result<(String, Vec<ToolCall>)> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "unknown".to_string());
        bail!("Gemini returned no candidates (block reason: {reason})");
    };

    let mut text = String::new();
    let mut calls = Vec::new();

    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        match part {
            GeminiPart::Text { text: t } => text.push_str(&t),
            GeminiPart::FunctionCall { function_call } => {
                let arguments = match function_call.args {
                    Value::Object(map) => map,
                    Value::Null => Map::new(),
                    other => bail!(
                        "function call '{}' has non-object args: {other}",
                        function_call.name
                    ),
                };
                calls.push(ToolCall {
                    tool_call_id: function_call
                        .id
                        .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
                    tool_name: function_call.name,
                    arguments,
                });
            }
            GeminiPart::Other(_) => {}
        }
    }

    Ok((text, calls))
}

#[async_trait::async_trait]
impl ModelInvoker for GeminiDriver {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        catalog: &ToolCatalog<'_>,
    ) -> anyhow::Result<Generation> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("Gemini API key is not configured"))?;

        let request = self.build_request(messages, catalog);

        tracing::debug!(
            model = %self.settings.model,
            message_count = request.contents.len(),
            tool_count = catalog.len(),
            "Sending generateContent request"
        );

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Gemini API error ({status}): {body}");
        }

        let response: GeminiResponse = resp
            .json()
            .await
            .context("Failed to decode Gemini response")?;

        let (text, calls) = interpret(response)?;
        auto_invoke(text, calls, catalog).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTools>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    /// Parts this driver doesn't use (thoughts, inline data, ...).
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTools {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}
