//! # Rivet Core
//!
//! Domain types, traits, and error definitions for the rivet assistant.
//! This crate has no transport or storage dependencies; it defines the
//! model every other crate implements against.
//!
//! ## Layout
//!
//! - [`message`]: conversation messages and the tool calls they carry
//! - [`provider`]: the chat-completion backend abstraction
//! - [`tool`]: the capability contract and the name → capability registry
//! - [`error`]: one error enum per bounded context, folded into [`Error`]

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, GraphError, MemoryError, ProviderError, Result, ToolError};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{
    ChunkSink, Provider, ProviderRequest, ProviderResponse, StreamOutcome, ToolDefinition, Usage,
};
pub use tool::{Tool, ToolArgs, ToolRegistry};
