//! Execute command tool: run a system command through the platform shell.
//!
//! Supports an optional base-command allowlist and a per-call timeout.

use async_trait::async_trait;
use rivet_config::ExecuteCommandConfig;
use rivet_core::error::ToolError;
use rivet_core::tool::{Tool, ToolArgs, required_str};
use serde_json::Value;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::EXECUTE_COMMAND;

pub struct ExecuteCommandTool {
    timeout: Duration,
    /// If non-empty, only these base commands may run.
    allowed_commands: Vec<String>,
}

impl ExecuteCommandTool {
    pub fn new(timeout: Duration, allowed_commands: Vec<String>) -> Self {
        Self {
            timeout,
            allowed_commands,
        }
    }

    pub fn from_config(config: &ExecuteCommandConfig) -> Self {
        Self::new(
            Duration::from_secs(config.timeout_secs),
            config.allowed_commands.clone(),
        )
    }

    /// With an allowlist in place, only the base command is checked, so any
    /// line the shell could split into further commands is refused.
    fn check_allowed(&self, command: &str) -> Result<(), String> {
        if self.allowed_commands.is_empty() {
            return Ok(());
        }
        if let Some(c) = command.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
            return Err(format!(
                "Command contains shell metacharacter {c:?}, which is not permitted with an allowlist"
            ));
        }
        let base_cmd = command.split_whitespace().next().unwrap_or("");
        if self.allowed_commands.iter().any(|a| a == base_cmd) {
            Ok(())
        } else {
            Err(format!("Command '{base_cmd}' not in allowlist"))
        }
    }
}

const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '$', '`', '>', '<', '(', ')', '\n', '\r'];

/// `command` plus the optional `args` (a string or an array of values).
fn command_line(arguments: &ToolArgs) -> Result<String, ToolError> {
    let mut line = required_str(arguments, "command")?.to_string();
    match arguments.get("args") {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) if s.trim().is_empty() => {}
        Some(Value::String(s)) => {
            line.push(' ');
            line.push_str(s.trim());
        }
        Some(Value::Array(items)) => {
            for item in items {
                line.push(' ');
                match item {
                    Value::String(s) => line.push_str(s),
                    other => line.push_str(&other.to_string()),
                }
            }
        }
        Some(other) => {
            return Err(ToolError::InvalidArguments(format!(
                "'args' must be a string or an array, got {other}"
            )));
        }
    }
    Ok(line)
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        EXECUTE_COMMAND
    }

    fn description(&self) -> &str {
        "Execute a system command and return its combined output. Parameters: command (the command line), args (optional extra arguments)."
    }

    fn parameter_names(&self) -> &[&'static str] {
        &["command"]
    }

    async fn execute(&self, arguments: &ToolArgs) -> Result<Value, ToolError> {
        let command = command_line(arguments)?;

        if let Err(reason) = self.check_allowed(&command) {
            warn!(command = %command, reason = %reason, "Command refused");
            return Err(ToolError::PermissionDenied {
                tool_name: EXECUTE_COMMAND.into(),
                reason,
            });
        }

        debug!(command = %command, "Executing command");

        let mut shell = if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command.as_str()]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command.as_str()]);
            cmd
        };
        shell.kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, shell.output()).await {
            Ok(result) => result.map_err(|e| ToolError::ExecutionFailed {
                tool_name: EXECUTE_COMMAND.into(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                warn!(command = %command, "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: EXECUTE_COMMAND.into(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            return Ok(serde_json::json!({
                "command": command,
                "output": combined,
                "success": true,
            }));
        }

        let code = output.status.code().unwrap_or(-1);
        warn!(command = %command, exit_code = code, "Command failed");
        Ok(serde_json::json!({
            "command": command,
            "output": combined,
            "error": format!("exit status {code}"),
            "success": false,
        }))
    }
}
