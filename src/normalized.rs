//! The single response shape returned to chat callers.
//!
//! ```rust
//! use mcp_fs_chat::llm::Generation;
//! use mcp_fs_chat::normalized::{NormalizedResponse, normalize};
//!
//! let response = normalize(&Generation::text("Hello"));
//! assert!(matches!(response, NormalizedResponse::Success { ref text, .. } if text == "Hello"));
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

use crate::error::ChatError;
use crate::llm::{Generation, ToolCall, ToolResult};
use crate::mcp::content::{PayloadError, ToolPayload};

/// Outcome of a chat request.
#[derive(Debug)]
pub enum NormalizedResponse {
    Success {
        text: String,
        /// Set when the text came from a tool result.
        tool_name: Option<String>,
    },
    Failure(ChatError),
}

impl NormalizedResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Success body: `{ result, toolName?, success: true }`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessBody<'a> {
    pub result: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<&'a str>,
    pub success: bool,
}

impl IntoResponse for NormalizedResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Success { text, tool_name } => (
                StatusCode::OK,
                Json(SuccessBody {
                    result: &text,
                    tool_name: tool_name.as_deref(),
                    success: true,
                }),
            )
                .into_response(),
            Self::Failure(err) => err.into_response(),
        }
    }
}

/// Build the response for a finished generation.
///
/// A tool call with a matching result wins over generated text.
pub fn normalize(generation: &Generation) -> NormalizedResponse {
    match generation.first_exchange() {
        Some((call, result)) => normalize_tool_result(call, result),
        None => NormalizedResponse::Success {
            text: generation.text.clone(),
            tool_name: None,
        },
    }
}

/// Only a result the tool did return can fail here; failures to execute the
/// call surface from the model invocation instead.
fn normalize_tool_result(call: &ToolCall, result: &ToolResult) -> NormalizedResponse {
    match render_tool_output(&result.result) {
        Ok(text) => NormalizedResponse::Success {
            text,
            tool_name: Some(call.tool_name.clone()),
        },
        Err(e) => {
            let e = anyhow::Error::from(e).context(format!(
                "could not render result of tool '{}'",
                call.tool_name
            ));
            NormalizedResponse::Failure(ChatError::tool_execution(&e, call.clone()))
        }
    }
}

/// Human-readable text for a raw tool result: the first content block's
/// text, or the compact JSON rendering of the whole result.
pub fn render_tool_output(raw: &Value) -> Result<String, PayloadError> {
    let payload = ToolPayload::from_value(raw)?;
    if payload.is_error {
        tracing::warn!("Tool reported an error result");
    }
    Ok(match payload.first_text() {
        Some(text) => text.to_string(),
        None => raw.to_string(),
    })
}
