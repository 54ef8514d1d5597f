use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tracing::{info, warn};

use crate::AppState;
use crate::error::ChatError;
use crate::llm::ChatMessage;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;

    Router::new()
        .route("/api/chat", post(api_chat))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for chat API.
#[derive(Debug, Deserialize)]
struct ChatRequest {
    /// Conversation so far, oldest first.
    messages: Vec<ChatMessage>,
}

/// POST /api/chat - Answer a conversation, possibly through one tool call.
///
/// The request runs on its own task so a client disconnect cannot cancel it
/// between opening and closing the tool connection. A body that can't be
/// read or decoded gets the same JSON failure shape as any other error.
async fn api_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!(
                status = %rejection.status(),
                error = %rejection.body_text(),
                "Rejected chat request body"
            );
            return ChatError::internal(rejection.body_text()).into_response();
        }
    };

    let orchestrator = Arc::clone(&state.orchestrator);
    let task = tokio::spawn(async move { orchestrator.handle(req.messages).await });

    match task.await {
        Ok(response) => response.into_response(),
        Err(e) => ChatError::internal(e.to_string()).into_response(),
    }
}

/// GET /health - Liveness check.
async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
