//! Tool trait: the capability contract.
//!
//! Capabilities are what let the assistant act: write code, read files,
//! describe images, run shell commands. Each declares an ordered list of
//! parameter names; the JSON schema sent to the model is derived from it,
//! with every parameter typed as a string and marked required.

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Arguments handed to a capability: the parsed tool-call payload.
pub type ToolArgs = Map<String, Value>;

/// The capability contract.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this capability (e.g., "read_file").
    fn name(&self) -> &str;

    /// A description of what it does (sent to the LLM).
    fn description(&self) -> &str;

    /// Declared parameter names, in order.
    fn parameter_names(&self) -> &[&'static str];

    /// Execute with the parsed argument object.
    async fn execute(&self, arguments: &ToolArgs) -> std::result::Result<Value, ToolError>;

    /// JSON Schema for the parameters: all strings, all required.
    fn parameters_schema(&self) -> Value {
        let names = self.parameter_names();
        let properties: Map<String, Value> = names
            .iter()
            .map(|name| {
                (
                    (*name).to_string(),
                    serde_json::json!({ "type": "string", "description": name }),
                )
            })
            .collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": names,
        })
    }

    /// Convert this capability into a ToolDefinition for the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available capabilities.
///
/// Built once per session from the enabled list. The loop uses it to
/// 1. get the definitions to send to the LLM
/// 2. resolve a requested capability by name
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability. Replaces any existing one with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a capability by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// All definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Execute a capability by name.
    pub async fn execute(
        &self,
        name: &str,
        arguments: &ToolArgs,
    ) -> std::result::Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(arguments).await
    }

    /// List all registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// One "- name: description" line per capability.
    pub fn describe(&self) -> String {
        self.tools
            .values()
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Read a required string argument.
pub fn required_str<'a>(arguments: &'a ToolArgs, key: &str) -> std::result::Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing '{key}' argument")))
}
