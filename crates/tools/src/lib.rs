//! Built-in capabilities for rivet.
//!
//! Capabilities give the assistant the ability to act: write code to disk,
//! read files, describe images and run shell commands. The registry is
//! built once per session from the configured enabled list.

pub mod execute_command;
pub mod read_file;
pub mod recognize_image;
pub mod write_code;

use rivet_config::ToolsConfig;
use rivet_core::tool::ToolRegistry;
use std::sync::Arc;
use tracing::warn;

pub use execute_command::ExecuteCommandTool;
pub use read_file::ReadFileTool;
pub use recognize_image::{ImageDescriber, RecognizeImageTool};
pub use write_code::WriteCodeTool;

pub const WRITE_CODE: &str = "write_code";
pub const READ_FILE: &str = "read_file";
pub const RECOGNIZE_IMAGE: &str = "recognize_image";
pub const EXECUTE_COMMAND: &str = "execute_command";

/// Build a registry holding the enabled capabilities.
///
/// Unknown names are logged and skipped.
pub fn build_registry(config: &ToolsConfig) -> ToolRegistry {
    build_registry_with(config, None)
}

/// Like [`build_registry`], attaching an image backend to `recognize_image`.
pub fn build_registry_with(
    config: &ToolsConfig,
    describer: Option<Arc<dyn ImageDescriber>>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for name in &config.enabled {
        match name.as_str() {
            WRITE_CODE => registry.register(Arc::new(WriteCodeTool::from_config(&config.write_code))),
            READ_FILE => registry.register(Arc::new(ReadFileTool::from_config(&config.read_file))),
            RECOGNIZE_IMAGE => {
                let mut tool = RecognizeImageTool::from_config(&config.recognize_image);
                if let Some(describer) = &describer {
                    tool = tool.with_describer(describer.clone());
                }
                registry.register(Arc::new(tool));
            }
            EXECUTE_COMMAND => registry.register(Arc::new(ExecuteCommandTool::from_config(
                &config.execute_command,
            ))),
            unknown => warn!(tool = %unknown, "Unknown tool in enabled list, skipping"),
        }
    }
    registry
}
