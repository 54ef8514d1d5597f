//! Per-request chat orchestration.
//!
//! The orchestrator drives one chat request end to end:
//! 1. Fail fast when no backend credential is configured
//! 2. Open a fresh tool connection (failure degrades to no tools)
//! 3. List the connection's tools into a [`ToolCatalog`]
//! 4. Run one generation with the catalog
//! 5. Normalize the outcome
//! 6. Close the connection, on every path, after the model call has settled
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp_fs_chat::llm::{ChatMessage, Orchestrator, OrchestratorOptions};
//!
//! let orchestrator = Orchestrator::new(settings, tool_source, OrchestratorOptions::default());
//! let response = orchestrator.handle(vec![ChatMessage::user("list files in /tmp")]).await;
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use uuid::Uuid;

use crate::config::Deadlines;
use crate::error::{ChatError, ErrorKind};
use crate::mcp::{ToolCatalog, ToolConnection, ToolSource};
use crate::normalized::{NormalizedResponse, normalize};

use super::{ChatCompletionsDriver, ChatMessage, GeminiDriver, LlmProtocol, LlmSettings, ModelInvoker};

/// Tunables passed in at startup.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrchestratorOptions {
    pub deadlines: Deadlines,
    /// Log full message and tool payloads at debug level.
    pub log_payloads: bool,
}

/// Sequences tool connection, model call and normalization for each request.
///
/// Holds no per-request state; every [`Orchestrator::handle`] call gets its
/// own tool connection.
#[derive(Clone)]
pub struct Orchestrator {
    model: Arc<dyn ModelInvoker>,
    tools: Option<Arc<dyn ToolSource>>,
    credential_configured: bool,
    options: OrchestratorOptions,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tools", &self.tools)
            .field("credential_configured", &self.credential_configured)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator with the driver selected by `settings.protocol`.
    pub fn new(
        settings: LlmSettings,
        tools: Option<Arc<dyn ToolSource>>,
        options: OrchestratorOptions,
    ) -> Self {
        let credential_configured = settings.api_key.is_some();
        let model: Arc<dyn ModelInvoker> = match settings.protocol {
            LlmProtocol::Gemini => Arc::new(GeminiDriver::new(settings)),
            LlmProtocol::Chat => Arc::new(ChatCompletionsDriver::new(settings)),
        };
        Self::with_model(model, credential_configured, tools, options)
    }

    /// Create an orchestrator around an arbitrary model backend.
    pub fn with_model(
        model: Arc<dyn ModelInvoker>,
        credential_configured: bool,
        tools: Option<Arc<dyn ToolSource>>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            model,
            tools,
            credential_configured,
            options,
        }
    }

    /// Handle one chat request.
    pub async fn handle(&self, messages: Vec<ChatMessage>) -> NormalizedResponse {
        let request_id = Uuid::new_v4().to_string();

        if !self.credential_configured {
            tracing::error!(
                request_id = %request_id,
                error.kind = %ErrorKind::Configuration,
                "Backend credential is not configured"
            );
            return NormalizedResponse::Failure(ChatError::Configuration);
        }

        tracing::info!(
            request_id = %request_id,
            message_count = messages.len(),
            "Received chat request"
        );
        if self.options.log_payloads {
            tracing::debug!(request_id = %request_id, messages = ?messages, "Request messages");
        }

        let connection = self.open_connection(&request_id).await;

        let response = AssertUnwindSafe(self.respond(&request_id, &messages, connection.as_deref()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    request_id = %request_id,
                    error.kind = %ErrorKind::Internal,
                    panic = %message,
                    "Chat request panicked"
                );
                NormalizedResponse::Failure(ChatError::internal(message))
            });

        if let Some(connection) = connection {
            self.close_connection(&request_id, connection).await;
        }

        match &response {
            NormalizedResponse::Success { tool_name, .. } => tracing::info!(
                request_id = %request_id,
                tool_name = ?tool_name,
                "Chat request succeeded"
            ),
            NormalizedResponse::Failure(e) => tracing::error!(
                request_id = %request_id,
                error.kind = %e.kind(),
                details = ?e.details(),
                "Chat request failed"
            ),
        }

        response
    }

    /// Everything between open and close. The catalog borrows `connection`,
    /// so it is gone by the time this returns.
    async fn respond(
        &self,
        request_id: &str,
        messages: &[ChatMessage],
        connection: Option<&dyn ToolConnection>,
    ) -> NormalizedResponse {
        let catalog = match connection {
            Some(conn) => self.load_catalog(request_id, conn).await,
            None => ToolCatalog::empty(),
        };

        tracing::info!(
            request_id = %request_id,
            tool_count = catalog.len(),
            tools = ?catalog.names().collect::<Vec<_>>(),
            "Invoking model"
        );

        let generation = match tokio::time::timeout(
            self.options.deadlines.model,
            self.model.generate(messages, &catalog),
        )
        .await
        {
            Ok(Ok(generation)) => generation,
            Ok(Err(e)) => return NormalizedResponse::Failure(ChatError::model(&e)),
            Err(_) => {
                let e = anyhow::anyhow!(
                    "model call did not finish within {}s",
                    self.options.deadlines.model.as_secs()
                );
                return NormalizedResponse::Failure(ChatError::model(&e));
            }
        };

        tracing::debug!(
            request_id = %request_id,
            tool_calls = generation.tool_calls.len(),
            tool_results = generation.tool_results.len(),
            "Generation completed"
        );
        if self.options.log_payloads {
            tracing::debug!(request_id = %request_id, generation = ?generation, "Generation payload");
        }

        normalize(&generation)
    }

    async fn open_connection(&self, request_id: &str) -> Option<Box<dyn ToolConnection>> {
        let source = self.tools.as_ref()?;

        match tokio::time::timeout(self.options.deadlines.open, source.open()).await {
            Ok(Ok(connection)) => {
                tracing::debug!(request_id = %request_id, source = %source.name(), "Tool connection opened");
                Some(connection)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    request_id = %request_id,
                    source = %source.name(),
                    error.kind = %ErrorKind::Connection,
                    error = %format!("{e:#}"),
                    "Tool connection failed, continuing without tools"
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    request_id = %request_id,
                    source = %source.name(),
                    error.kind = %ErrorKind::Connection,
                    "Tool connection timed out, continuing without tools"
                );
                None
            }
        }
    }

    async fn load_catalog<'c>(
        &self,
        request_id: &str,
        connection: &'c dyn ToolConnection,
    ) -> ToolCatalog<'c> {
        match tokio::time::timeout(self.options.deadlines.list_tools, connection.list_tools()).await {
            Ok(Ok(tools)) => ToolCatalog::new(connection, tools, self.options.deadlines.tool_call),
            Ok(Err(e)) => {
                tracing::warn!(
                    request_id = %request_id,
                    error.kind = %ErrorKind::Connection,
                    error = %format!("{e:#}"),
                    "Listing tools failed, continuing without tools"
                );
                ToolCatalog::empty()
            }
            Err(_) => {
                tracing::warn!(
                    request_id = %request_id,
                    error.kind = %ErrorKind::Connection,
                    "Listing tools timed out, continuing without tools"
                );
                ToolCatalog::empty()
            }
        }
    }

    /// Teardown failures are logged and never replace the request outcome.
    async fn close_connection(&self, request_id: &str, connection: Box<dyn ToolConnection>) {
        match tokio::time::timeout(self.options.deadlines.close, connection.close()).await {
            Ok(Ok(())) => tracing::debug!(request_id = %request_id, "Tool connection closed"),
            Ok(Err(e)) => tracing::error!(
                request_id = %request_id,
                error.kind = %ErrorKind::Teardown,
                error = %format!("{e:#}"),
                "Closing tool connection failed"
            ),
            Err(_) => tracing::error!(
                request_id = %request_id,
                error.kind = %ErrorKind::Teardown,
                "Closing tool connection timed out"
            ),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
