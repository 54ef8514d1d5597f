//! Filesystem tools served in-process, confined to one root directory.
//!
//! Selected with `tools.source = "in_process"`. Output mirrors the MCP
//! filesystem server: `[DIR] name` / `[FILE] name` listings and raw file
//! text, wrapped in a `content` array.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use serde_json::{Value, json};

use super::native::NativeTool;

/// Files larger than this are refused by `read_file`.
const MAX_READ_BYTES: u64 = 1024 * 1024;

/// The `list_directory` and `read_file` tools over `root`.
pub fn filesystem_tools(root: impl Into<PathBuf>) -> Vec<Arc<dyn NativeTool>> {
    let sandbox = Arc::new(Sandbox { root: root.into() });
    vec![
        Arc::new(ListDirectory {
            sandbox: Arc::clone(&sandbox),
        }),
        Arc::new(ReadFile { sandbox }),
    ]
}

#[derive(Debug)]
struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Resolve `requested` (absolute, or relative to the root) to an existing
    /// path inside the root. Symlinks are followed before the check.
    async fn resolve(&self, requested: &str) -> anyhow::Result<PathBuf> {
        let root = tokio::fs::canonicalize(&self.root)
            .await
            .with_context(|| format!("tool root {} is not accessible", self.root.display()))?;

        let requested_path = Path::new(requested);
        let candidate = if requested_path.is_absolute() {
            requested_path.to_path_buf()
        } else {
            root.join(requested_path)
        };

        let resolved = tokio::fs::canonicalize(&candidate)
            .await
            .with_context(|| format!("{requested}: no such file or directory"))?;
        if !resolved.starts_with(&root) {
            bail!("access denied: {requested} is outside the allowed directory");
        }
        Ok(resolved)
    }
}

fn path_arg(args: &Value) -> anyhow::Result<&str> {
    args["path"]
        .as_str()
        .ok_or_else(|| anyhow!("missing string argument `path`"))
}

fn text_result(text: String) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}

fn path_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "path": {"type": "string", "description": description}
        },
        "required": ["path"]
    })
}

#[derive(Debug)]
struct ListDirectory {
    sandbox: Arc<Sandbox>,
}

#[async_trait]
impl NativeTool for ListDirectory {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the files and directories at a path. Entries are prefixed with [FILE] or [DIR]."
    }

    fn schema(&self) -> Value {
        path_schema("Directory to list")
    }

    async fn call(&self, args: Value) -> anyhow::Result<Value> {
        let dir = self.sandbox.resolve(path_arg(&args)?).await?;

        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("cannot list {}", dir.display()))?;
        while let Some(entry) = reader.next_entry().await? {
            let marker = if entry.file_type().await?.is_dir() {
                "[DIR]"
            } else {
                "[FILE]"
            };
            entries.push(format!("{marker} {}", entry.file_name().to_string_lossy()));
        }
        entries.sort_by(|a, b| a.split_once(' ').map(|p| p.1).cmp(&b.split_once(' ').map(|p| p.1)));

        Ok(text_result(entries.join("\n")))
    }
}

#[derive(Debug)]
struct ReadFile {
    sandbox: Arc<Sandbox>,
}

#[async_trait]
impl NativeTool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the complete contents of a UTF-8 text file."
    }

    fn schema(&self) -> Value {
        path_schema("File to read")
    }

    async fn call(&self, args: Value) -> anyhow::Result<Value> {
        let file = self.sandbox.resolve(path_arg(&args)?).await?;

        let size = tokio::fs::metadata(&file).await?.len();
        if size > MAX_READ_BYTES {
            bail!("{} is {size} bytes, over the {MAX_READ_BYTES} byte limit", file.display());
        }
        let text = tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("cannot read {}", file.display()))?;

        Ok(text_result(text))
    }
}
