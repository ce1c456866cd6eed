//! The four-stage pipeline: think → decision → act → summary, run as a
//! dependency graph on `rivet-workflow`.

use crate::prompts;
use async_trait::async_trait;
use rivet_config::DagConfig;
use rivet_core::error::Error;
use rivet_core::message::Message;
use rivet_core::provider::{Provider, ProviderRequest};
use rivet_core::tool::{ToolArgs, ToolRegistry};
use rivet_workflow::{Graph, NodeHandler, Payload, StageKind, TaskNode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Returned when the summary stage produced nothing.
pub const FALLBACK_ANSWER: &str = "The pipeline finished without producing a summary.";

/// What every stage needs to talk to the model and the capabilities.
struct StageContext {
    provider: Arc<dyn Provider>,
    tools: ToolRegistry,
    model: String,
}

impl StageContext {
    async fn ask(&self, prompt: String) -> rivet_core::Result<String> {
        let request = ProviderRequest::new(self.model.clone(), vec![Message::user(prompt)]);
        Ok(self.provider.complete(request).await?.message.content)
    }
}

fn text<'a>(input: &'a Payload, key: &str) -> &'a str {
    input.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn output(key: &str, value: impl Into<Value>) -> Payload {
    let mut payload = Payload::new();
    payload.insert(key.to_string(), value.into());
    payload
}

struct ThinkStage(Arc<StageContext>);

#[async_trait]
impl NodeHandler for ThinkStage {
    async fn run(&self, input: Payload) -> rivet_core::Result<Payload> {
        let prompt = prompts::think_prompt(
            &self.0.tools.describe(),
            text(&input, "user_input"),
            text(&input, "intention"),
        );
        let thinking = self.0.ask(prompt).await?;
        info!(chars = thinking.len(), "Think stage done");
        Ok(output("thinking", thinking))
    }
}

struct DecisionStage(Arc<StageContext>);

#[async_trait]
impl NodeHandler for DecisionStage {
    async fn run(&self, input: Payload) -> rivet_core::Result<Payload> {
        let prompt = prompts::decision_prompt(text(&input, "thinking"), text(&input, "user_input"));
        let plan = self.0.ask(prompt).await?;
        info!(chars = plan.len(), "Decision stage done");
        Ok(output("plan", plan))
    }
}

/// One entry of the decision stage's plan.
#[derive(Debug, Deserialize)]
struct PlannedCall {
    tool: String,
    #[serde(default)]
    params: ToolArgs,
}

fn parse_plan(plan: &str) -> Vec<PlannedCall> {
    let Some(json) = prompts::extract_array(plan) else {
        return Vec::new();
    };
    serde_json::from_str(json).unwrap_or_else(|e| {
        warn!(error = %e, "Unparsable plan, running no tools");
        Vec::new()
    })
}

struct ActStage(Arc<StageContext>);

#[async_trait]
impl NodeHandler for ActStage {
    async fn run(&self, input: Payload) -> rivet_core::Result<Payload> {
        let calls = parse_plan(text(&input, "plan"));
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            let Some(tool) = self.0.tools.get(&call.tool) else {
                warn!(tool = %call.tool, "Planned tool not found");
                results.push(Value::String(format!("❌ {}: capability not found", call.tool)));
                continue;
            };
            debug!(tool = %call.tool, "Running planned call");
            let line = match tool.execute(&call.params).await {
                Ok(value) => {
                    let pretty = serde_json::to_string_pretty(&value)?;
                    format!("✅ {} succeeded:\n{pretty}", call.tool)
                }
                Err(e) => format!("❌ {} failed: {e}", call.tool),
            };
            results.push(Value::String(line));
        }

        info!(calls = results.len(), "Act stage done");
        Ok(output("results", results))
    }
}

struct SummaryStage(Arc<StageContext>);

#[async_trait]
impl NodeHandler for SummaryStage {
    async fn run(&self, input: Payload) -> rivet_core::Result<Payload> {
        let user_input = text(&input, "user_input");
        let results: Vec<&str> = input
            .get("results")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let prompt = if results.is_empty() {
            user_input.to_string()
        } else {
            prompts::summary_prompt(user_input, &results.join("\n\n"))
        };
        let result = self.0.ask(prompt).await?;
        Ok(output("result", result))
    }
}

pub struct Pipeline {
    provider: Arc<dyn Provider>,
    tools: ToolRegistry,
    model: String,
    parallelism: usize,
    timeout: Duration,
    verbose: bool,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: ToolRegistry,
        model: impl Into<String>,
        dag: &DagConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            model: model.into(),
            parallelism: dag.parallel_nodes,
            timeout: Duration::from_secs(dag.timeout_secs),
            verbose: dag.verbose,
        }
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    fn build_graph(&self, input: &str, intention: &str) -> Result<Graph, Error> {
        let context = Arc::new(StageContext {
            provider: self.provider.clone(),
            tools: self.tools.clone(),
            model: self.model.clone(),
        });

        let mut graph = Graph::new(self.parallelism, self.timeout).with_verbose(self.verbose);
        graph.add_node(
            TaskNode::new("think", StageKind::Think)
                .named("Think")
                .with_input("user_input", input)
                .with_input("intention", intention)
                .with_handler(Arc::new(ThinkStage(context.clone()))),
        )?;
        graph.add_node(
            TaskNode::new("decision", StageKind::Decision)
                .named("Decision")
                .depends_on("think")
                .with_input("user_input", input)
                .with_handler(Arc::new(DecisionStage(context.clone()))),
        )?;
        graph.add_node(
            TaskNode::new("act", StageKind::ToolExec)
                .named("Act")
                .depends_on("decision")
                .with_handler(Arc::new(ActStage(context.clone()))),
        )?;
        graph.add_node(
            TaskNode::new("summary", StageKind::End)
                .named("Summary")
                .depends_on("act")
                .with_input("user_input", input)
                .with_handler(Arc::new(SummaryStage(context))),
        )?;
        Ok(graph)
    }

    /// Run the four stages for one request and return the summary.
    pub async fn run(
        &self,
        input: &str,
        intention: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String, Error> {
        let mut graph = self.build_graph(input, intention.unwrap_or_default())?;
        graph.execute(cancel).await?;

        let results = graph.results()?;
        let answer = results
            .get("summary")
            .and_then(|out| out.get("result"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(FALLBACK_ANSWER);
        Ok(answer.to_string())
    }
}
