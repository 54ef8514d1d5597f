//! MCP filesystem chat server.
//!
//! Entry point: loads configuration, installs tracing and serves the chat API.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use dotenvy::dotenv;
use tracing::{info, warn};

use mcp_fs_chat::AppState;
use mcp_fs_chat::config::{AppConfig, Deadlines};
use mcp_fs_chat::llm::{Orchestrator, OrchestratorOptions};
use mcp_fs_chat::mcp::config::build_tool_source;
use mcp_fs_chat::{server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before reading configuration
    let _ = dotenv();

    let config = AppConfig::load()?;
    telemetry::init(&config.logging);

    let settings = config.llm_settings();
    info!(
        name: "llm.config.loaded",
        protocol = ?settings.protocol,
        model = %settings.model,
        "LLM configuration loaded"
    );
    if settings.api_key.is_none() {
        warn!(
            env_var = %config.llm.api_key_env,
            "Model credential not set; chat requests will fail with a configuration error"
        );
    }

    let tools = build_tool_source(&config.tools)?;
    match &tools {
        Some(source) => info!(
            name: "tools.source.configured",
            source = %source.name(),
            root = %config.tools.root,
            "Tool source configured"
        ),
        None => info!("Tools disabled"),
    }

    let orchestrator = Orchestrator::new(
        settings,
        tools,
        OrchestratorOptions {
            deadlines: Deadlines::from(&config.deadlines),
            log_payloads: config.logging.log_payloads,
        },
    );

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        config: Arc::new(config),
    };

    server::start_server(state).await
}
