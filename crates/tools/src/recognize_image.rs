//! Recognize image tool: load an image and hand it to a vision backend.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rivet_config::RecognizeImageConfig;
use rivet_core::error::ToolError;
use rivet_core::tool::{Tool, ToolArgs, required_str};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::RECOGNIZE_IMAGE;
use crate::read_file::checked_size;

/// A backend that turns a base64-encoded image into a description.
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    async fn describe(&self, image_base64: &str, format: &str) -> Result<String, ToolError>;
}

pub struct RecognizeImageTool {
    max_size_mb: u64,
    supported_formats: Vec<String>,
    describer: Option<Arc<dyn ImageDescriber>>,
}

impl RecognizeImageTool {
    pub fn new(max_size_mb: u64, supported_formats: Vec<String>) -> Self {
        Self {
            max_size_mb,
            supported_formats,
            describer: None,
        }
    }

    pub fn from_config(config: &RecognizeImageConfig) -> Self {
        Self::new(config.max_size_mb, config.supported_formats.clone())
    }

    pub fn with_describer(mut self, describer: Arc<dyn ImageDescriber>) -> Self {
        self.describer = Some(describer);
        self
    }

    fn is_format_supported(&self, format: &str) -> bool {
        self.supported_formats
            .iter()
            .any(|f| f.eq_ignore_ascii_case(format))
    }
}

#[async_trait]
impl Tool for RecognizeImageTool {
    fn name(&self) -> &str {
        RECOGNIZE_IMAGE
    }

    fn description(&self) -> &str {
        "Describe the contents of an image. Parameters: filepath (path of the image file)."
    }

    fn parameter_names(&self) -> &[&'static str] {
        &["filepath"]
    }

    async fn execute(&self, arguments: &ToolArgs) -> Result<Value, ToolError> {
        let filepath = required_str(arguments, "filepath")?;
        let size = checked_size(RECOGNIZE_IMAGE, filepath, self.max_size_mb).await?;

        let format = Path::new(filepath)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !self.is_format_supported(&format) {
            return Err(ToolError::PermissionDenied {
                tool_name: RECOGNIZE_IMAGE.into(),
                reason: format!("unsupported image format: '{format}'"),
            });
        }

        let Some(describer) = &self.describer else {
            return Ok(serde_json::json!({
                "filepath": filepath,
                "size": size,
                "format": format,
                "message": "image recognition backend not configured",
            }));
        };

        let bytes = tokio::fs::read(filepath)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: RECOGNIZE_IMAGE.into(),
                reason: format!("failed to read image: {e}"),
            })?;
        let encoded = STANDARD.encode(&bytes);
        debug!(path = %filepath, size, format = %format, "Sending image to describer");

        let description = describer.describe(&encoded, &format).await?;

        Ok(serde_json::json!({
            "filepath": filepath,
            "size": size,
            "format": format,
            "description": description,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingDescriber {
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ImageDescriber for RecordingDescriber {
        async fn describe(&self, image_base64: &str, format: &str) -> Result<String, ToolError> {
            self.seen
                .lock()
                .unwrap()
                .push((image_base64.to_string(), format.to_string()));
            Ok("a red square".into())
        }
    }

    fn args(path: &Path) -> ToolArgs {
        let mut args = ToolArgs::new();
        args.insert("filepath".into(), Value::String(path.to_str().unwrap().into()));
        args
    }

    #[tokio::test]
    async fn without_backend_reports_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.PNG");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let result = RecognizeImageTool::from_config(&RecognizeImageConfig::default())
            .execute(&args(&path))
            .await
            .unwrap();
        assert_eq!(result["format"], "png");
        assert_eq!(result["size"], 4);
        assert_eq!(result["message"], "image recognition backend not configured");
        assert!(result.get("description").is_none());
    }

    #[tokio::test]
    async fn backend_receives_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("square.jpg");
        std::fs::write(&path, b"abc").unwrap();

        let describer = Arc::new(RecordingDescriber::default());
        let result = RecognizeImageTool::new(1, vec!["jpg".into()])
            .with_describer(describer.clone())
            .execute(&args(&path))
            .await
            .unwrap();

        assert_eq!(result["description"], "a red square");
        let seen = describer.seen.lock().unwrap();
        assert_eq!(seen[0], ("YWJj".to_string(), "jpg".to_string()));
    }

    #[tokio::test]
    async fn unsupported_format_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector.svg");
        std::fs::write(&path, "<svg/>").unwrap();
        let err = RecognizeImageTool::from_config(&RecognizeImageConfig::default())
            .execute(&args(&path))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("svg"));
    }
}
