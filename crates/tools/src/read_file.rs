//! Read file tool: read a text file with size and extension checks.

use async_trait::async_trait;
use rivet_config::ReadFileConfig;
use rivet_core::error::ToolError;
use rivet_core::tool::{Tool, ToolArgs, required_str};
use serde_json::Value;
use std::path::Path;

use crate::READ_FILE;

const MB: u64 = 1024 * 1024;

/// Stat `path` and reject directories and files above `max_size_mb`.
/// Returns the file size in bytes.
pub(crate) async fn checked_size(tool: &str, path: &str, max_size_mb: u64) -> Result<u64, ToolError> {
    let failed = |reason: String| ToolError::ExecutionFailed {
        tool_name: tool.into(),
        reason,
    };

    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            failed(format!("file does not exist: {path}"))
        } else {
            failed(format!("cannot stat {path}: {e}"))
        }
    })?;

    if metadata.is_dir() {
        return Err(failed(format!("path is a directory, not a file: {path}")));
    }

    let size = metadata.len();
    if size > max_size_mb.saturating_mul(MB) {
        return Err(failed(format!(
            "file is {} MB, limit is {max_size_mb} MB",
            size / MB
        )));
    }

    Ok(size)
}

pub struct ReadFileTool {
    max_size_mb: u64,
    allowed_extensions: Vec<String>,
}

impl ReadFileTool {
    pub fn new(max_size_mb: u64, allowed_extensions: Vec<String>) -> Self {
        Self {
            max_size_mb,
            allowed_extensions,
        }
    }

    pub fn from_config(config: &ReadFileConfig) -> Self {
        Self::new(config.max_size_mb, config.allowed_extensions.clone())
    }

    /// `ext` includes the leading dot, or is empty.
    fn is_extension_allowed(&self, ext: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|a| a.eq_ignore_ascii_case(ext))
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        READ_FILE
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Parameters: filepath (path of the file to read)."
    }

    fn parameter_names(&self) -> &[&'static str] {
        &["filepath"]
    }

    async fn execute(&self, arguments: &ToolArgs) -> Result<Value, ToolError> {
        let filepath = required_str(arguments, "filepath")?;
        let size = checked_size(READ_FILE, filepath, self.max_size_mb).await?;

        let ext = Path::new(filepath)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        if !self.is_extension_allowed(&ext) {
            return Err(ToolError::PermissionDenied {
                tool_name: READ_FILE.into(),
                reason: format!("extension '{ext}' is not allowed"),
            });
        }

        let bytes = tokio::fs::read(filepath)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: READ_FILE.into(),
                reason: format!("failed to read file: {e}"),
            })?;
        let content = String::from_utf8_lossy(&bytes).into_owned();
        let lines = content.matches('\n').count() + 1;

        Ok(serde_json::json!({
            "filepath": filepath,
            "content": content,
            "size": size,
            "lines": lines,
        }))
    }
}
