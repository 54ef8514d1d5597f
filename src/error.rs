//! Error taxonomy for chat requests.
//!
//! Only [`ChatError`] ever reaches the caller. Connection and teardown
//! failures are recovered locally and exist here as [`ErrorKind`]s so log
//! events can be classified consistently.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::llm::ToolCall;

/// Classification attached to log events as `error.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing credential. Fails fast.
    Configuration,
    /// Tool provider unavailable. Degrades to an empty catalog.
    Connection,
    /// Tool call failed or its result could not be rendered.
    ToolExecution,
    /// Backend generation failed.
    Model,
    /// Closing the tool provider failed. Logged only.
    Teardown,
    /// Anything unexpected, including panics.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Connection => "connection",
            Self::ToolExecution => "tool_execution",
            Self::Model => "model",
            Self::Teardown => "teardown",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure surfaced to the caller.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Missing API key configuration")]
    Configuration,

    #[error("Model error")]
    Model {
        details: String,
        stack: Option<String>,
    },

    #[error("Error executing tool")]
    ToolExecution {
        details: String,
        stack: Option<String>,
        tool_call: ToolCall,
    },

    #[error("Server error")]
    Internal { details: String },
}

impl ChatError {
    pub fn model(err: &anyhow::Error) -> Self {
        Self::Model {
            details: format!("{err:#}"),
            stack: Some(error_stack(err)),
        }
    }

    pub fn tool_execution(err: &anyhow::Error, tool_call: ToolCall) -> Self {
        Self::ToolExecution {
            details: format!("{err:#}"),
            stack: Some(error_stack(err)),
            tool_call,
        }
    }

    pub fn internal(details: impl Into<String>) -> Self {
        Self::Internal {
            details: details.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration => ErrorKind::Configuration,
            Self::Model { .. } => ErrorKind::Model,
            Self::ToolExecution { .. } => ErrorKind::ToolExecution,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            Self::Configuration => None,
            Self::Model { details, .. }
            | Self::ToolExecution { details, .. }
            | Self::Internal { details } => Some(details),
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Error chain rendered one cause per line. Backtraces are left out so the
/// body stays the same whether or not `RUST_BACKTRACE` is set.
fn error_stack(err: &anyhow::Error) -> String {
    let mut stack = err.to_string();
    for (depth, cause) in err.chain().skip(1).enumerate() {
        if depth == 0 {
            stack.push_str("\n\nCaused by:");
        }
        stack.push_str(&format!("\n    {depth}: {cause}"));
    }
    stack
}

/// Failure body: `{ error, details?, stack?, toolCall? }`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody<'a> {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<&'a ToolCall>,
}

impl<'a> From<&'a ChatError> for ErrorBody<'a> {
    fn from(err: &'a ChatError) -> Self {
        let (stack, tool_call) = match err {
            ChatError::Model { stack, .. } => (stack.as_deref(), None),
            ChatError::ToolExecution {
                stack, tool_call, ..
            } => (stack.as_deref(), Some(tool_call)),
            ChatError::Configuration | ChatError::Internal { .. } => (None, None),
        };

        Self {
            error: err.to_string(),
            details: err.details(),
            stack,
            tool_call,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody::from(&self))).into_response()
    }
}
