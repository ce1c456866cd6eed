//! Intent analysis: one model call ahead of a turn that works out what the
//! user wants and gathers any files or images worth attaching.

use crate::prompts;
use rivet_core::error::Error;
use rivet_core::message::Message;
use rivet_core::provider::{Provider, ProviderRequest};
use rivet_core::tool::{ToolArgs, ToolRegistry};
use rivet_tools::{READ_FILE, RECOGNIZE_IMAGE};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Attached file contents are cut at this many characters.
pub const MAX_FILE_CHARS: usize = 20_000;

/// The JSON object the model is asked to produce.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IntentReport {
    pub intent: String,
    pub need_code_analysis: bool,
    pub need_image_analysis: bool,
    pub target_files: Vec<String>,
    pub target_images: Vec<String>,
}

impl IntentReport {
    /// Parse the report out of a raw model reply. The object is looked for
    /// after the thinking block so braces in the reasoning do not confuse it.
    pub fn from_reply(reply: &str) -> Option<Self> {
        let body = reply
            .find("</thinking>")
            .map_or(reply, |idx| &reply[idx..]);
        let json = prompts::extract_object(body)?;
        serde_json::from_str(json).ok()
    }
}

pub struct IntentAnalyzer {
    provider: Arc<dyn Provider>,
    tools: ToolRegistry,
    model: String,
}

impl IntentAnalyzer {
    pub fn new(provider: Arc<dyn Provider>, tools: ToolRegistry, model: impl Into<String>) -> Self {
        Self {
            provider,
            tools,
            model: model.into(),
        }
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Produce the annotation attached to the user's request.
    ///
    /// When the reply holds no parsable report the raw reply is used as is.
    pub async fn analyze(&self, input: &str) -> Result<String, Error> {
        let request = ProviderRequest::new(
            self.model.clone(),
            vec![Message::user(prompts::intent_prompt(input))],
        );
        let reply = self.provider.complete(request).await?.message.content;

        let Some(report) = IntentReport::from_reply(&reply) else {
            debug!("Intent reply carried no report, using it verbatim");
            return Ok(reply);
        };

        info!(
            intent = %report.intent,
            files = report.target_files.len(),
            images = report.target_images.len(),
            "Intent analysed"
        );

        let thinking = prompts::extract_thinking(&reply).unwrap_or_default();
        let mut annotation = format!("Reasoning: {thinking}\n\nIntent: {}", report.intent);

        if report.need_code_analysis {
            for path in report.target_files.iter().filter(|p| !p.trim().is_empty()) {
                if let Some(content) = self.read_file(path).await {
                    annotation.push_str(&format!(
                        "\n\nContents of {path}:\n{}",
                        prompts::truncate_chars(&content, MAX_FILE_CHARS)
                    ));
                }
            }
        }

        if report.need_image_analysis {
            for path in report.target_images.iter().filter(|p| !p.trim().is_empty()) {
                if let Some(description) = self.describe_image(path).await {
                    annotation.push_str(&format!("\n\nImage {path}: {description}"));
                }
            }
        }

        Ok(annotation)
    }

    async fn read_file(&self, path: &str) -> Option<String> {
        let result = self.call(READ_FILE, path).await?;
        result.get("content")?.as_str().map(str::to_string)
    }

    async fn describe_image(&self, path: &str) -> Option<String> {
        let result = self.call(RECOGNIZE_IMAGE, path).await?;
        result
            .get("description")
            .or_else(|| result.get("message"))?
            .as_str()
            .map(str::to_string)
    }

    /// Run a capability on one path; failures are logged and skipped.
    async fn call(&self, tool: &str, path: &str) -> Option<Value> {
        let mut arguments = ToolArgs::new();
        arguments.insert("filepath".into(), Value::String(path.to_string()));
        match self.tools.execute(tool, &arguments).await {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(tool, path, error = %e, "Skipping target during intent analysis");
                None
            }
        }
    }
}
