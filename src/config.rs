use crate::llm::{
    DEFAULT_API_KEY_ENV, DEFAULT_MODEL, DEFAULT_TEMPERATURE, LlmProtocol, LlmSettings,
};
use crate::mcp::config::ToolsConfig;
use crate::telemetry::LoggingConfig;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Address to bind
    #[arg(long, env = "BIND_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Filesystem root exposed to the tool server
    #[arg(long, env = "TOOLS_ROOT")]
    pub tools_root: Option<String>,

    /// Model identifier
    #[arg(long, env = "LLM_MODEL")]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub tools: ToolsConfig,
    pub deadlines: DeadlineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            body_limit_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub protocol: LlmProtocol,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    /// Name of the environment variable holding the backend credential.
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            protocol: LlmProtocol::Gemini,
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
        }
    }
}

/// Per-suspension-point limits, in seconds.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeadlineConfig {
    pub open_secs: u64,
    pub list_tools_secs: u64,
    pub tool_call_secs: u64,
    pub model_secs: u64,
    pub close_secs: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            open_secs: 30,
            list_tools_secs: 10,
            tool_call_secs: 30,
            model_secs: 120,
            close_secs: 5,
        }
    }
}

/// Resolved deadlines handed to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    pub open: Duration,
    pub list_tools: Duration,
    pub tool_call: Duration,
    pub model: Duration,
    pub close: Duration,
}

impl From<&DeadlineConfig> for Deadlines {
    fn from(cfg: &DeadlineConfig) -> Self {
        Self {
            open: Duration::from_secs(cfg.open_secs),
            list_tools: Duration::from_secs(cfg.list_tools_secs),
            tool_call: Duration::from_secs(cfg.tool_call_secs),
            model: Duration::from_secs(cfg.model_secs),
            close: Duration::from_secs(cfg.close_secs),
        }
    }
}

impl Default for Deadlines {
    fn default() -> Self {
        Self::from(&DeadlineConfig::default())
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Layering, lowest to highest: struct defaults, config file,
    /// `APP_`-prefixed environment (`APP_SERVER__PORT=8000`), CLI flags and
    /// their env fallbacks.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            // ./config.{yaml,toml,json} when present
            None => builder.add_source(File::with_name("config").required(false)),
        };

        builder = builder.add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(root) = cli.tools_root {
            builder = builder.set_override("tools.root", root)?;
        }
        if let Some(model) = cli.model {
            builder = builder.set_override("llm.model", model)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Resolve backend settings, reading the credential from the environment.
    pub fn llm_settings(&self) -> LlmSettings {
        let api_key = std::env::var(&self.llm.api_key_env)
            .ok()
            .filter(|s| !s.trim().is_empty());

        LlmSettings {
            protocol: self.llm.protocol,
            base_url: self.llm.base_url.clone().filter(|s| !s.trim().is_empty()),
            api_key,
            model: self.llm.model.clone(),
            temperature: self.llm.temperature,
        }
    }
}
