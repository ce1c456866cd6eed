//! Write code tool: write generated source to a file.

use async_trait::async_trait;
use rivet_config::WriteCodeConfig;
use rivet_core::error::ToolError;
use rivet_core::tool::{Tool, ToolArgs, required_str};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::WRITE_CODE;

pub struct WriteCodeTool {
    max_lines: usize,
    supported_languages: Vec<String>,
}

impl WriteCodeTool {
    pub fn new(max_lines: usize, supported_languages: Vec<String>) -> Self {
        Self {
            max_lines,
            supported_languages,
        }
    }

    pub fn from_config(config: &WriteCodeConfig) -> Self {
        Self::new(config.max_lines, config.supported_languages.clone())
    }

    fn is_language_supported(&self, language: &str) -> bool {
        self.supported_languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language))
    }

    fn failed(reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: WRITE_CODE.into(),
            reason: reason.into(),
        }
    }
}

/// Infer a language from the file extension.
fn language_from_extension(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    let language = match ext.as_str() {
        "py" => "python",
        "go" => "go",
        "js" => "javascript",
        "ts" => "typescript",
        "java" => "java",
        "c" => "c",
        "cpp" | "cc" | "cxx" => "cpp",
        "rs" => "rust",
        _ => return None,
    };
    Some(language)
}

fn non_empty<'a>(arguments: &'a ToolArgs, key: &str) -> Option<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl Tool for WriteCodeTool {
    fn name(&self) -> &str {
        WRITE_CODE
    }

    fn description(&self) -> &str {
        "Write code to a file. Parameters: filepath (target path), code (file contents), language (programming language, inferred from the extension when empty)."
    }

    fn parameter_names(&self) -> &[&'static str] {
        &["filepath", "code", "language"]
    }

    async fn execute(&self, arguments: &ToolArgs) -> Result<Value, ToolError> {
        let filepath = match non_empty(arguments, "file_path") {
            Some(path) if non_empty(arguments, "filepath").is_none() => path,
            _ => required_str(arguments, "filepath")?,
        };
        let code = required_str(arguments, "code")?;

        let language = match non_empty(arguments, "language") {
            Some(language) => language,
            None => language_from_extension(filepath).ok_or_else(|| {
                ToolError::InvalidArguments(
                    "cannot infer the language from the extension, pass 'language'".into(),
                )
            })?,
        };

        if !self.is_language_supported(language) {
            return Err(Self::failed(format!("unsupported language: {language}")));
        }

        let lines = code.split('\n').count();
        if lines > self.max_lines {
            return Err(Self::failed(format!(
                "code has {lines} lines, limit is {}",
                self.max_lines
            )));
        }

        if let Some(parent) = Path::new(filepath).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::failed(format!("failed to create directory: {e}")))?;
        }

        tokio::fs::write(filepath, code)
            .await
            .map_err(|e| Self::failed(format!("failed to write file: {e}")))?;

        debug!(path = %filepath, language, lines, "Wrote code file");

        Ok(serde_json::json!({
            "filepath": filepath,
            "lines": lines,
            "bytes": code.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> WriteCodeTool {
        WriteCodeTool::from_config(&WriteCodeConfig::default())
    }

    fn args(value: Value) -> ToolArgs {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn language_inference() {
        assert_eq!(language_from_extension("a/b.PY"), Some("python"));
        assert_eq!(language_from_extension("x.cc"), Some("cpp"));
        assert_eq!(language_from_extension("main.rs"), Some("rust"));
        assert_eq!(language_from_extension("README"), None);
    }

    #[tokio::test]
    async fn writes_file_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src/nested/hello.py");
        let result = tool()
            .execute(&args(serde_json::json!({
                "filepath": path.to_str().unwrap(),
                "code": "print('hi')\nprint('bye')",
                "language": "",
            })))
            .await
            .unwrap();

        assert_eq!(result["lines"], 2);
        assert_eq!(result["bytes"], 24);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "print('hi')\nprint('bye')"
        );
    }

    #[tokio::test]
    async fn file_path_alias_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.go");
        tool()
            .execute(&args(serde_json::json!({
                "file_path": path.to_str().unwrap(),
                "code": "package main",
            })))
            .await
            .unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn unsupported_language_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.cob");
        let err = tool()
            .execute(&args(serde_json::json!({
                "filepath": path.to_str().unwrap(),
                "code": "DISPLAY 'HI'",
                "language": "cobol",
            })))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported language"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn line_limit_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.py");
        let err = WriteCodeTool::new(2, vec!["python".into()])
            .execute(&args(serde_json::json!({
                "filepath": path.to_str().unwrap(),
                "code": "a\nb\nc",
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn missing_path_is_invalid() {
        let err = tool()
            .execute(&args(serde_json::json!({"code": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
