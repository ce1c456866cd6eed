//! Error types for the rivet domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! is what a failed turn or pipeline run surfaces to the caller.

use thiserror::Error;

/// The top-level error type for all rivet operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A transport failure inside the tool-calling loop.
    #[error("Transport failed on iteration {iteration}: {source}")]
    Transport {
        iteration: u32,
        #[source]
        source: ProviderError,
    },

    #[error("Iteration budget exceeded: no final answer after {max_iterations} iterations")]
    IterationBudgetExceeded { max_iterations: u32 },

    #[error("Turn cancelled on iteration {iteration}")]
    Cancelled { iteration: u32 },

    /// The caller's output sink refused a write.
    #[error("Output sink failed: {0}")]
    Output(#[from] std::io::Error),

    // --- Graph errors ---
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Non-success HTTP status. `message` carries the captured response body.
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The per-chunk callback reported an error; the stream was abandoned.
    #[error("Stream consumer aborted: {0}")]
    CallbackAborted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Node '{node}' depends on missing node '{dependency}'")]
    MissingDependency { node: String, dependency: String },

    #[error("Dependency cycle detected: {0}")]
    CycleDetected(String),

    #[error("Node '{node}' failed: {reason}")]
    NodeFailed { node: String, reason: String },

    #[error("Failed node(s) present: {}", .0.join(", "))]
    FailedNodes(Vec<String>),

    #[error("Graph execution timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Graph execution cancelled")]
    Cancelled,

    #[error("Graph has not completed a successful run")]
    NotExecuted,
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Corrupted record {id}: {reason}")]
    Corrupted { id: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
