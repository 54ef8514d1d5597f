use serde::Deserialize;
use std::{collections::HashMap, path::PathBuf, sync::Arc};

use anyhow::{Context, anyhow};
use url::Url;

use super::ToolSource;
use super::fs_tools::filesystem_tools;
use super::native::InProcessToolSource;
use super::rmcp_source::{RemoteToolSource, SubprocessToolSource};

/// Default launcher for the filesystem tool server.
pub const DEFAULT_COMMAND: &str = "npx";
pub const DEFAULT_ARGS: [&str; 2] = ["-y", "@modelcontextprotocol/server-filesystem"];

/// Which kind of tool provider to attach to chat requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSourceKind {
    #[default]
    Subprocess,
    Remote,
    /// Built-in `list_directory` and `read_file` over `root`.
    InProcess,
    Disabled,
}

/// `tools` section of the application config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub source: ToolSourceKind,
    /// Executable for the subprocess source.
    pub command: String,
    /// Arguments placed before `root`.
    pub args: Vec<String>,
    /// Filesystem root the tools are scoped to. The subprocess source gets it
    /// as its last argument.
    pub root: String,
    /// Endpoint for the remote source.
    pub url: Option<String>,
    /// Extra environment for the subprocess. Values may use `${VAR}`.
    pub env: HashMap<String, String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            source: ToolSourceKind::Subprocess,
            command: DEFAULT_COMMAND.to_string(),
            args: DEFAULT_ARGS.iter().map(ToString::to_string).collect(),
            root: ".".to_string(),
            url: None,
            env: HashMap::new(),
        }
    }
}

/// Build the configured tool source, or `None` when tools are disabled.
pub fn build_tool_source(cfg: &ToolsConfig) -> anyhow::Result<Option<Arc<dyn ToolSource>>> {
    let source: Arc<dyn ToolSource> = match cfg.source {
        ToolSourceKind::Disabled => return Ok(None),
        ToolSourceKind::Subprocess => Arc::new(
            SubprocessToolSource::new(
                "filesystem",
                cfg.command.clone(),
                cfg.args.clone(),
                PathBuf::from(&cfg.root),
            )
            .with_env(cfg.env.clone()),
        ),
        ToolSourceKind::Remote => {
            let raw = cfg
                .url
                .as_deref()
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| anyhow!("tools.url is required when tools.source = \"remote\""))?;
            let url = Url::parse(&expand_env_placeholders(raw))
                .with_context(|| format!("invalid tools.url: {raw}"))?;
            Arc::new(RemoteToolSource::new("remote", url))
        }
        ToolSourceKind::InProcess => Arc::new(InProcessToolSource::new(
            "filesystem",
            filesystem_tools(&cfg.root),
        )),
    };
    Ok(Some(source))
}

/// Expand `${VAR}` placeholders from the process environment.
/// Unknown variables are left as written.
pub fn expand_env_placeholders(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let name = &after[..end];
        match std::env::var(name) {
            Ok(value) if !name.is_empty() => out.push_str(&value),
            _ => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

pub fn expand_env_map(map: &HashMap<String, String>) -> HashMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.clone(), expand_env_placeholders(v)))
        .collect()
}
