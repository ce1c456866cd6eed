//! Stage scheduler: a small dependency graph of named stages.
//!
//! Stages ([`TaskNode`]) declare the ids they depend on and carry a bound
//! [`NodeHandler`]. A [`Graph`] validates the dependency relation (no
//! missing ids, no cycles) and then runs every stage with bounded
//! parallelism, fail-fast semantics and an overall deadline.
//!
//! ```no_run
//! use std::time::Duration;
//! use rivet_workflow::{Graph, StageKind, TaskNode};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), rivet_core::GraphError> {
//! let mut graph = Graph::new(4, Duration::from_secs(300));
//! graph.add_node(TaskNode::new("think", StageKind::Think))?;
//! graph.add_node(TaskNode::new("summary", StageKind::End).depends_on("think"))?;
//! graph.execute(&CancellationToken::new()).await?;
//! let outputs = graph.results()?;
//! # let _ = outputs;
//! # Ok(())
//! # }
//! ```

pub mod graph;
pub mod node;

pub use graph::Graph;
pub use node::{FnHandler, NodeHandler, NodeStatus, Payload, StageKind, TaskNode, handler_fn};
