//! The dependency graph and its executor.
//!
//! Nodes become eligible when every dependency is Completed and they are
//! still Pending. Completions arrive through a `JoinSet`, so the executor
//! re-evaluates eligibility exactly when something finishes.

use crate::node::{NodeStatus, Payload, TaskNode};
use rivet_core::GraphError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{Id as TaskId, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type NodeRun = Result<Payload, String>;

/// A small static DAG of stages.
pub struct Graph {
    nodes: HashMap<String, TaskNode>,
    /// Insertion order, for deterministic scans and logs
    order: Vec<String>,
    parallelism: usize,
    timeout: Duration,
    verbose: bool,
    succeeded: bool,
}

impl Graph {
    pub fn new(parallelism: usize, timeout: Duration) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            parallelism: parallelism.max(1),
            timeout,
            verbose: false,
            succeeded: false,
        }
    }

    /// Promote node lifecycle events from `debug` to `info`.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Insert a node. A duplicate id is rejected and the graph is left unchanged.
    pub fn add_node(&mut self, node: TaskNode) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        self.order.push(node.id.clone());
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Check that every dependency exists and the relation is acyclic.
    pub fn validate(&self) -> Result<(), GraphError> {
        for id in &self.order {
            for dep in &self.nodes[id].dependencies {
                if !self.nodes.contains_key(dep) {
                    return Err(GraphError::MissingDependency {
                        node: id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        for id in &self.order {
            if !visited.contains(id.as_str()) && self.dfs_cycle(id, &mut visited, &mut stack) {
                return Err(GraphError::CycleDetected(stack.join(" -> ")));
            }
        }
        Ok(())
    }

    /// Depth-first walk; `stack` is the recursion stack. On a back-edge the
    /// stack is trimmed to the cycle itself.
    fn dfs_cycle<'a>(
        &'a self,
        id: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
    ) -> bool {
        visited.insert(id);
        stack.push(id);

        for dep in &self.nodes[id].dependencies {
            if let Some(pos) = stack.iter().position(|s| *s == dep.as_str()) {
                stack.push(dep.as_str());
                stack.drain(..pos);
                return true;
            }
            if !visited.contains(dep.as_str()) && self.dfs_cycle(dep, visited, stack) {
                return true;
            }
        }

        stack.pop();
        false
    }

    /// Run every node to completion.
    ///
    /// Up to `parallelism` handlers run at once. On the first handler
    /// failure no further nodes are launched; nodes already in flight are
    /// allowed to finish, then the failure is returned. The deadline and
    /// `cancel` are checked whenever the executor waits; in-flight handlers
    /// are detached rather than aborted when either fires.
    pub async fn execute(&mut self, cancel: &CancellationToken) -> Result<(), GraphError> {
        self.validate()?;
        self.succeeded = false;

        let deadline = Instant::now() + self.timeout;
        let gate = Arc::new(Semaphore::new(self.parallelism));
        let mut running: JoinSet<NodeRun> = JoinSet::new();
        let mut in_flight: HashMap<TaskId, String> = HashMap::new();
        let mut failure: Option<GraphError> = None;

        self.log(&format!("Executing graph with {} nodes", self.nodes.len()));

        loop {
            if failure.is_none() {
                for id in self.ready_nodes() {
                    if !self.launch(&id, &gate, &mut running, &mut in_flight) {
                        break;
                    }
                }
            }

            if running.is_empty() {
                if let Some(err) = failure {
                    return Err(err);
                }
                if self.order.iter().all(|id| self.nodes[id].status == NodeStatus::Completed) {
                    break;
                }
                let failed = self.ids_with_status(NodeStatus::Failed);
                warn!(failed = ?failed, "Graph stalled with unfinished nodes");
                return Err(GraphError::FailedNodes(failed));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(in_flight = running.len(), "Graph execution cancelled");
                    running.detach_all();
                    return Err(GraphError::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(in_flight = running.len(), "Graph execution timed out");
                    running.detach_all();
                    return Err(GraphError::Timeout { timeout_secs: self.timeout.as_secs() });
                }
                Some(joined) = running.join_next_with_id() => {
                    let (task_id, run) = match joined {
                        Ok((task_id, run)) => (task_id, run),
                        Err(e) => {
                            let reason = if e.is_panic() { "handler panicked" } else { "handler task aborted" };
                            (e.id(), Err(reason.to_string()))
                        }
                    };
                    if let Some(id) = in_flight.remove(&task_id)
                        && let Some(err) = self.finish(&id, run)
                        && failure.is_none()
                    {
                        failure = Some(err);
                    }
                }
            }
        }

        self.succeeded = true;
        self.log("Graph execution completed");
        Ok(())
    }

    /// Node id → output map. Only valid after a successful `execute`.
    pub fn results(&self) -> Result<HashMap<String, Payload>, GraphError> {
        if !self.succeeded {
            return Err(GraphError::NotExecuted);
        }
        Ok(self.partial_results())
    }

    /// Outputs of every node that reached Completed, whatever the run outcome.
    pub fn partial_results(&self) -> HashMap<String, Payload> {
        self.nodes
            .values()
            .filter(|n| n.status == NodeStatus::Completed)
            .map(|n| (n.id.clone(), n.output.clone()))
            .collect()
    }

    fn ready_nodes(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| {
                let node = &self.nodes[*id];
                node.status == NodeStatus::Pending
                    && node.dependencies.iter().all(|dep| {
                        self.nodes
                            .get(dep)
                            .is_some_and(|d| d.status == NodeStatus::Completed)
                    })
            })
            .cloned()
            .collect()
    }

    fn ids_with_status(&self, status: NodeStatus) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.nodes[*id].status == status)
            .cloned()
            .collect()
    }

    /// Take an admission permit, merge dependency outputs into the node's
    /// input (declared order, later keys overwrite) and spawn its handler.
    ///
    /// Returns false when the gate is full; the node stays Pending until a
    /// running handler finishes and frees a permit.
    fn launch(
        &mut self,
        id: &str,
        gate: &Arc<Semaphore>,
        running: &mut JoinSet<NodeRun>,
        in_flight: &mut HashMap<TaskId, String>,
    ) -> bool {
        let Ok(permit) = gate.clone().try_acquire_owned() else {
            return false;
        };

        let mut input = self.nodes[id].input.clone();
        for dep in &self.nodes[id].dependencies {
            for (key, value) in &self.nodes[dep].output {
                input.insert(key.clone(), value.clone());
            }
        }

        let Some(node) = self.nodes.get_mut(id) else {
            return true;
        };
        node.status = NodeStatus::Running;
        node.input = input.clone();
        let handler = node.handler.clone();
        let name = node.name.clone();
        self.log(&format!("Starting node {name}"));

        let handle = running.spawn(async move {
            let _permit = permit;
            match handler {
                Some(handler) => handler.run(input).await.map_err(|e| e.to_string()),
                None => Ok(Payload::new()),
            }
        });
        in_flight.insert(handle.id(), id.to_string());
        true
    }

    /// Record a handler outcome. Returns the error to surface if it failed.
    fn finish(&mut self, id: &str, run: NodeRun) -> Option<GraphError> {
        let verbose = self.verbose;
        let node = self.nodes.get_mut(id)?;
        if node.status.is_terminal() {
            return None;
        }
        match run {
            Ok(output) => {
                node.status = NodeStatus::Completed;
                node.output = output;
                if verbose {
                    info!(node = %node.id, outputs = node.output.len(), "Node completed");
                } else {
                    debug!(node = %node.id, outputs = node.output.len(), "Node completed");
                }
                None
            }
            Err(reason) => {
                warn!(node = %node.id, error = %reason, "Node failed");
                node.status = NodeStatus::Failed;
                node.error = Some(reason.clone());
                Some(GraphError::NodeFailed {
                    node: node.id.clone(),
                    reason,
                })
            }
        }
    }

    fn log(&self, message: &str) {
        if self.verbose {
            info!("{message}");
        } else {
            debug!("{message}");
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.order)
            .field("parallelism", &self.parallelism)
            .field("timeout", &self.timeout)
            .field("verbose", &self.verbose)
            .finish()
    }
}
