//! Provider trait: the abstraction over chat-completion backends.
//!
//! A Provider sends a message list (plus the declared capabilities) to an
//! LLM and returns either a whole response or, in streaming mode, hands
//! each content fragment to a caller-supplied sink as it is decoded.

use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-chunk callback used by [`Provider::stream`].
///
/// Invoked synchronously, in wire order, once per non-empty content fragment.
/// Returning an error stops the stream immediately.
pub type ChunkSink<'a> = dyn FnMut(&str) -> std::io::Result<()> + Send + 'a;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available capabilities the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Tool selection policy ("auto", "none"); only sent with tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

impl ProviderRequest {
    /// A plain request: no tools, provider-default sampling.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            tools: Vec::new(),
            tool_choice: None,
        }
    }

    /// Attach capability definitions with `tool_choice = "auto"`.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tool_choice = (!tools.is_empty()).then(|| "auto".to_string());
        self.tools = tools;
        self
    }
}

/// A tool definition sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The capability name
    pub name: String,

    /// Description of what the capability does
    pub description: String,

    /// JSON Schema describing the parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// What a finished stream produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamOutcome {
    /// All content fragments, concatenated in arrival order
    pub content: String,

    /// Tool calls assembled from incremental deltas, ordered by index
    pub tool_calls: Vec<MessageToolCall>,

    /// The last `finish_reason` seen, if any
    pub finish_reason: Option<String>,
}

impl StreamOutcome {
    /// Fold the outcome into an assistant message.
    pub fn into_message(self) -> Message {
        Message::assistant_with_tool_calls(self.content, self.tool_calls)
    }
}

/// The core Provider trait.
///
/// The tool-calling loop and the stage pipeline call `complete()` or
/// `stream()` without knowing which backend sits behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Send a request and feed content fragments to `on_chunk` as they arrive.
    ///
    /// Default implementation calls `complete()` and emits the whole content
    /// as a single fragment.
    async fn stream(
        &self,
        request: ProviderRequest,
        on_chunk: &mut ChunkSink<'_>,
    ) -> std::result::Result<StreamOutcome, ProviderError> {
        let response = self.complete(request).await?;
        let content = response.message.content;
        if !content.is_empty() {
            on_chunk(&content).map_err(|e| ProviderError::CallbackAborted(e.to_string()))?;
        }
        Ok(StreamOutcome {
            content,
            tool_calls: response.message.tool_calls,
            finish_reason: None,
        })
    }
}
