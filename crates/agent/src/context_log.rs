//! Per-turn record of side effects worth showing the next turn.
//!
//! A fresh [`ContextLog`] is created when a turn starts, written while its
//! tool calls run, and drained exactly once when the turn ends. Being a
//! plain value owned by the turn, two turns can never share one.

use rivet_core::error::ToolError;
use rivet_core::tool::ToolArgs;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct ContextLog {
    entries: Vec<String>,
}

impl ContextLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `[kind] content`. Blank content is dropped.
    pub fn record(&mut self, kind: &str, content: &str) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }
        self.entries.push(format!("[{kind}] {content}"));
    }

    /// Record a shell command and how it ended.
    ///
    /// The entry is the command line followed by `| error=...` when the
    /// capability failed or reported an error, else `| success=<bool>`.
    pub fn record_command_outcome(&mut self, arguments: &ToolArgs, outcome: &Result<Value, ToolError>) {
        let Some(command_line) = command_line(arguments) else {
            return;
        };

        let entry = match outcome {
            Err(e) => format!("{command_line} | error={e}"),
            Ok(result) => {
                let error = result
                    .get("error")
                    .and_then(Value::as_str)
                    .filter(|e| !e.is_empty());
                match (error, result.get("success").and_then(Value::as_bool)) {
                    (Some(error), _) => format!("{command_line} | error={error}"),
                    (None, Some(success)) => format!("{command_line} | success={success}"),
                    (None, None) => command_line,
                }
            }
        };

        self.record(rivet_tools::EXECUTE_COMMAND, &entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take every entry, joined by blank lines. `None` when nothing was logged.
    pub fn drain(&mut self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let combined = self.entries.join("\n\n");
        self.entries.clear();
        Some(combined)
    }
}

/// The literal command string: `command` plus any `args`.
fn command_line(arguments: &ToolArgs) -> Option<String> {
    let command = arguments.get("command")?.as_str()?.trim();
    if command.is_empty() {
        return None;
    }

    let args: Vec<String> = match arguments.get("args") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) if s.trim().is_empty() => Vec::new(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if s.is_empty() => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect(),
        Some(other) => vec![other.to_string()],
    };

    if args.is_empty() {
        Some(command.to_string())
    } else {
        Some(format!("{command} {}", args.join(" ")))
    }
}
