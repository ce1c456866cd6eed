//! A conversation session: ties intent analysis, the tool-calling loop and
//! the stage pipeline to one user's persona and model choice.

use crate::intent::IntentAnalyzer;
use crate::loop_runner::{AgentLoop, TurnOutcome, TurnRequest};
use crate::pipeline::Pipeline;
use rivet_config::{AgentMode, AppConfig};
use rivet_core::error::Error;
use rivet_core::message::Message;
use rivet_core::provider::{ChunkSink, Provider};
use rivet_core::tool::ToolRegistry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct Session {
    agent: AgentLoop,
    analyzer: Option<IntentAnalyzer>,
    pipeline: Pipeline,
    mode: AgentMode,
    model: String,
    persona: Option<String>,
    /// Context log of the last finished turn, replayed into the next one.
    carried_notes: Option<String>,
}

impl Session {
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>, tools: ToolRegistry) -> Self {
        let model = config.api.model.clone();
        let agent = AgentLoop::new(provider.clone(), tools.clone(), model.clone())
            .with_max_iterations(config.agent.max_iterations)
            .with_streaming(config.agent.stream);
        let analyzer = config
            .agent
            .analyze_intent
            .then(|| IntentAnalyzer::new(provider.clone(), tools.clone(), model.clone()));
        let pipeline = Pipeline::new(provider, tools, model.clone(), &config.dag);

        Self {
            agent,
            analyzer,
            pipeline,
            mode: config.agent.mode,
            model,
            persona: None,
            carried_notes: None,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        self.agent.set_model(model.clone());
        if let Some(analyzer) = &mut self.analyzer {
            analyzer.set_model(model.clone());
        }
        self.pipeline.set_model(model.clone());
        self.model = model;
    }

    pub fn persona(&self) -> Option<&str> {
        self.persona.as_deref()
    }

    pub fn set_persona(&mut self, persona: Option<String>) {
        self.persona = persona.filter(|p| !p.trim().is_empty());
    }

    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: AgentMode) {
        self.mode = mode;
    }

    /// Notes the next turn will see.
    pub fn carried_notes(&self) -> Option<&str> {
        self.carried_notes.as_deref()
    }

    /// Forget carried notes, e.g. when a new conversation starts.
    pub fn reset(&mut self) {
        self.carried_notes = None;
    }

    /// Run one turn in the session's mode.
    ///
    /// Intent analysis failures are logged and the turn proceeds without
    /// an annotation. Carried notes are only replaced when the turn succeeds.
    pub async fn handle(
        &mut self,
        input: &str,
        history: &[Message],
        sink: &mut ChunkSink<'_>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, Error> {
        let analysis = self.analysis(input).await;

        let outcome = match self.mode {
            AgentMode::Loop => {
                let request = TurnRequest::new(input)
                    .with_history(history)
                    .with_persona(self.persona.as_deref())
                    .with_analysis(analysis.as_deref());
                self.agent.run(request, sink, cancel).await?
            }
            AgentMode::Pipeline => self.run_pipeline(input, analysis.as_deref(), sink, cancel).await?,
        };

        self.carried_notes = outcome.context_log.clone();
        Ok(outcome)
    }

    async fn run_pipeline(
        &self,
        input: &str,
        analysis: Option<&str>,
        sink: &mut ChunkSink<'_>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, Error> {
        let answer = self.pipeline.run(input, analysis, cancel).await?;
        sink(&answer)?;
        Ok(TurnOutcome {
            answer,
            // one pass through the graph
            iterations: 1,
            tool_calls_made: 0,
            context_log: None,
        })
    }

    /// Intent annotation plus notes carried from the previous turn.
    async fn analysis(&self, input: &str) -> Option<String> {
        let intent = match &self.analyzer {
            Some(analyzer) => match analyzer.analyze(input).await {
                Ok(annotation) => Some(annotation),
                Err(e) => {
                    warn!(error = %e, "Intent analysis failed, continuing without it");
                    None
                }
            },
            None => None,
        };

        let Some(notes) = self.carried_notes.as_deref() else {
            return intent;
        };
        debug!(chars = notes.len(), "Replaying notes from previous turn");
        let notes = format!("Actions taken in the previous turn:\n{notes}");
        Some(match intent {
            Some(intent) => format!("{intent}\n\n{notes}"),
            None => notes,
        })
    }
}
