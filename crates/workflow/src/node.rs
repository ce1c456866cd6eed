//! Task nodes and the handler trait they run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Key-value map flowing into and out of a node.
pub type Payload = serde_json::Map<String, Value>;

/// What kind of stage a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Think,
    Decision,
    ToolExec,
    End,
}

/// Node lifecycle. Completed and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Failed)
    }
}

/// The unit of work bound to a node: accept inputs, produce outputs or fail.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn run(&self, input: Payload) -> rivet_core::Result<Payload>;
}

/// Adapter that lets an async closure serve as a [`NodeHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> NodeHandler for FnHandler<F>
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: Future<Output = rivet_core::Result<Payload>> + Send,
{
    async fn run(&self, input: Payload) -> rivet_core::Result<Payload> {
        (self.0)(input).await
    }
}

/// Wrap an async closure as a shared handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn NodeHandler>
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = rivet_core::Result<Payload>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A named stage with declared dependencies.
///
/// Status, output and error are written only by the graph executor.
pub struct TaskNode {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) kind: StageKind,
    pub(crate) dependencies: Vec<String>,
    pub(crate) status: NodeStatus,
    pub(crate) input: Payload,
    pub(crate) output: Payload,
    pub(crate) error: Option<String>,
    pub(crate) handler: Option<Arc<dyn NodeHandler>>,
}

impl TaskNode {
    pub fn new(id: impl Into<String>, kind: StageKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            dependencies: Vec::new(),
            status: NodeStatus::Pending,
            input: Payload::new(),
            output: Payload::new(),
            error: None,
            handler: None,
        }
    }

    /// Human-readable label used in logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Declare a dependency. Duplicate ids are ignored.
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.dependencies.contains(&id) {
            self.dependencies.push(id);
        }
        self
    }

    /// Seed one input key.
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn NodeHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Input as seen by the handler (after dependency outputs were merged).
    pub fn input(&self) -> &Payload {
        &self.input
    }

    pub fn output(&self) -> &Payload {
        &self.output
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("dependencies", &self.dependencies)
            .field("status", &self.status)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let node = TaskNode::new("think", StageKind::Think)
            .depends_on("start")
            .depends_on("start")
            .with_input("user_input", "hi");
        assert_eq!(node.name(), "think");
        assert_eq!(node.status(), NodeStatus::Pending);
        assert_eq!(node.dependencies(), ["start".to_string()]);
        assert_eq!(node.input()["user_input"], "hi");
    }

    #[tokio::test]
    async fn closure_handler_runs() {
        let handler = handler_fn(|mut input: Payload| async move {
            input.insert("seen".into(), Value::Bool(true));
            Ok::<_, rivet_core::Error>(input)
        });
        let out = handler.run(Payload::new()).await.unwrap();
        assert_eq!(out["seen"], Value::Bool(true));
    }
}
