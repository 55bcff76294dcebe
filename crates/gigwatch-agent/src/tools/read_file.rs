//! The `read_file` tool.

use super::{number_arg, Tool};
use crate::Result;
use async_trait::async_trait;
use gigwatch_core::ToolOutput;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const DEFAULT_MAX_BYTES: u64 = 200_000;

/// Reads UTF-8 files that live under one of a fixed set of roots.
///
/// Containment is checked twice: lexically on the requested path, then on
/// the canonical path so a symlink cannot lead outside the roots.
pub struct ReadFileTool {
    roots: Vec<PathBuf>,
    max_bytes: u64,
}

impl ReadFileTool {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().map(|root| normalize(&absolute(&root))).collect(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    /// Default size limit when the caller passes no `maxBytes`.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes.max(1);
        self
    }

    fn is_allowed(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| path.starts_with(root))
    }

    async fn canonical_roots(&self) -> Vec<PathBuf> {
        let mut roots = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            roots.push(tokio::fs::canonicalize(root).await.unwrap_or_else(|_| root.clone()));
        }
        roots
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file's contents (only files inside the allowed directories)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file to read (must be inside an allowed directory)"
                },
                "maxBytes": {
                    "type": "number",
                    "description": format!("Largest file size to read, default {}", self.max_bytes),
                    "default": self.max_bytes
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let Some(path) = args.get("path").and_then(Value::as_str).filter(|p| !p.is_empty()) else {
            return Ok(ToolOutput::error("path is required"));
        };
        let limit = number_arg(&args, "maxBytes")
            .filter(|n| *n > 0)
            .unwrap_or(self.max_bytes);

        let requested = normalize(&absolute(Path::new(path)));
        if !self.is_allowed(&requested) {
            return Ok(ToolOutput::error("Path not allowed"));
        }

        let canonical = match tokio::fs::canonicalize(&requested).await {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::error(e.to_string())),
        };
        let roots = self.canonical_roots().await;
        if !roots.iter().any(|root| canonical.starts_with(root)) {
            return Ok(ToolOutput::error("Path not allowed"));
        }

        let metadata = match tokio::fs::metadata(&canonical).await {
            Ok(m) => m,
            Err(e) => return Ok(ToolOutput::error(e.to_string())),
        };
        if !metadata.is_file() {
            return Ok(ToolOutput::error("Path is not a file"));
        }
        let size = metadata.len();
        if size > limit {
            return Ok(ToolOutput::error(format!("File too large ({} bytes)", size)));
        }

        let content = match tokio::fs::read_to_string(&canonical).await {
            Ok(c) => c,
            Err(e) => return Ok(ToolOutput::error(e.to_string())),
        };

        debug!(path = %canonical.display(), size, "read_file");
        Ok(ToolOutput::success(json!({
            "path": path,
            "size": size,
            "content": content,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup() -> (tempfile::TempDir, ReadFileTool) {
        let dir = tempfile::tempdir().unwrap();
        let allowed = dir.path().join("config");
        fs::create_dir(&allowed).unwrap();
        fs::write(allowed.join("monitoring.json"), "{\"cities\": [\"Shanghai\"]}").unwrap();
        fs::write(dir.path().join("secret.txt"), "nope").unwrap();
        let tool = ReadFileTool::new([allowed]);
        (dir, tool)
    }

    #[tokio::test]
    async fn test_reads_allowed_file() {
        let (dir, tool) = setup();
        let path = dir.path().join("config/monitoring.json");

        let out = tool
            .execute(json!({"path": path.to_string_lossy()}))
            .await
            .unwrap();

        assert!(out.success, "{:?}", out);
        let data = out.data.unwrap();
        assert_eq!(data["size"], 24);
        assert_eq!(data["content"], "{\"cities\": [\"Shanghai\"]}");
    }

    #[tokio::test]
    async fn test_outside_roots_rejected() {
        let (dir, tool) = setup();

        let outside = dir.path().join("secret.txt");
        let out = tool.execute(json!({"path": outside.to_string_lossy()})).await.unwrap();
        assert_eq!(out.error.as_deref(), Some("Path not allowed"));

        let sneaky = dir.path().join("config/../secret.txt");
        let out = tool.execute(json!({"path": sneaky.to_string_lossy()})).await.unwrap();
        assert_eq!(out.error.as_deref(), Some("Path not allowed"));

        // A sibling whose name shares the root's prefix is not inside it.
        let sibling = dir.path().join("config-old");
        fs::create_dir(&sibling).unwrap();
        fs::write(sibling.join("a.txt"), "x").unwrap();
        let out = tool
            .execute(json!({"path": sibling.join("a.txt").to_string_lossy()}))
            .await
            .unwrap();
        assert_eq!(out.error.as_deref(), Some("Path not allowed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_rejected() {
        let (dir, tool) = setup();
        let link = dir.path().join("config/link.txt");
        std::os::unix::fs::symlink(dir.path().join("secret.txt"), &link).unwrap();

        let out = tool.execute(json!({"path": link.to_string_lossy()})).await.unwrap();
        assert_eq!(out.error.as_deref(), Some("Path not allowed"));
    }

    #[tokio::test]
    async fn test_directory_and_size_limits() {
        let (dir, tool) = setup();

        let out = tool
            .execute(json!({"path": dir.path().join("config").to_string_lossy()}))
            .await
            .unwrap();
        assert_eq!(out.error.as_deref(), Some("Path is not a file"));

        let file = dir.path().join("config/monitoring.json");
        let out = tool
            .execute(json!({"path": file.to_string_lossy(), "maxBytes": 10}))
            .await
            .unwrap();
        assert_eq!(out.error.as_deref(), Some("File too large (24 bytes)"));
    }

    #[tokio::test]
    async fn test_missing_path_argument() {
        let (_dir, tool) = setup();
        let out = tool.execute(json!({})).await.unwrap();
        assert_eq!(out.error.as_deref(), Some("path is required"));
    }
}
