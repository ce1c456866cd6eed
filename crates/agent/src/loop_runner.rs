//! The tool-calling loop.
//!
//! One user turn: call the model with the accumulated messages and every
//! declared capability; if it answers with plain text, that is the final
//! answer; if it asks for tools, run them in order, feed the results back
//! and ask again. Bad arguments, unknown tools and tool failures become
//! tool-role messages. Transport failures, cancellation and running out of
//! iterations end the turn with an error.

use crate::context_log::ContextLog;
use crate::prompts;
use rivet_core::error::{Error, ProviderError};
use rivet_core::message::{Message, MessageToolCall};
use rivet_core::provider::{ChunkSink, Provider, ProviderRequest, ToolDefinition};
use rivet_core::tool::{ToolArgs, ToolRegistry};
use rivet_tools::EXECUTE_COMMAND;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Inputs of one turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    pub input: &'a str,
    /// Prior conversation, replayed verbatim after the system message.
    pub history: &'a [Message],
    pub persona: Option<&'a str>,
    /// Upstream analysis attached to the user's request.
    pub analysis: Option<&'a str>,
}

impl<'a> TurnRequest<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            history: &[],
            persona: None,
            analysis: None,
        }
    }

    pub fn with_history(mut self, history: &'a [Message]) -> Self {
        self.history = history;
        self
    }

    pub fn with_persona(mut self, persona: Option<&'a str>) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_analysis(mut self, analysis: Option<&'a str>) -> Self {
        self.analysis = analysis;
        self
    }
}

/// What a finished turn produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub answer: String,
    /// Model calls made, including the one that produced the answer.
    pub iterations: u32,
    pub tool_calls_made: usize,
    /// Side effects worth telling the next turn about.
    pub context_log: Option<String>,
}

/// The core agent loop that orchestrates LLM calls and tool execution.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: ToolRegistry,
    model: String,
    max_iterations: u32,
    stream: bool,
    temperature: Option<f32>,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, tools: ToolRegistry, model: impl Into<String>) -> Self {
        Self {
            provider,
            tools,
            model: model.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            stream: false,
            temperature: None,
        }
    }

    /// Set the maximum number of model calls per turn.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Forward content fragments to the sink while the model is still writing.
    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one user turn.
    ///
    /// The final answer is written to `sink` exactly once: as streamed
    /// fragments in streaming mode, else as one write when it arrives.
    /// Tool progress lines go to the same sink.
    pub async fn run(
        &self,
        request: TurnRequest<'_>,
        sink: &mut ChunkSink<'_>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, Error> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(prompts::system_message(request.persona));
        messages.extend(request.history.iter().cloned());
        messages.push(prompts::user_request(request.input, request.analysis));

        let definitions = self.tools.definitions();
        let mut context_log = ContextLog::new();
        let mut tool_calls_made = 0;

        info!(
            model = %self.model,
            history = request.history.len(),
            tools = definitions.len(),
            "Starting turn"
        );

        for iteration in 1..=self.max_iterations {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled { iteration });
            }

            debug!(iteration, messages = messages.len(), "Agent loop iteration");

            let model_request = self.build_request(messages.clone(), definitions.clone());
            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled { iteration }),
                reply = self.call_model(model_request, sink) => reply,
            };
            let (reply, streamed) = reply.map_err(|source| Error::Transport { iteration, source })?;

            if !reply.has_tool_calls() {
                if !streamed && !reply.content.is_empty() {
                    sink(&reply.content)?;
                }
                info!(iteration, tool_calls_made, "Turn finished");
                return Ok(TurnOutcome {
                    answer: reply.content,
                    iterations: iteration,
                    tool_calls_made,
                    context_log: context_log.drain(),
                });
            }

            debug!(tool_count = reply.tool_calls.len(), "Executing tool calls");
            let calls = reply.tool_calls.clone();
            messages.push(reply);

            for call in &calls {
                let result = self.run_tool_call(call, &mut context_log, sink).await?;
                messages.push(result);
                tool_calls_made += 1;
            }

            if cancel.is_cancelled() {
                return Err(Error::Cancelled { iteration });
            }
        }

        warn!(max_iterations = self.max_iterations, "Iteration budget exhausted");
        Err(Error::IterationBudgetExceeded {
            max_iterations: self.max_iterations,
        })
    }

    fn build_request(&self, messages: Vec<Message>, tools: Vec<ToolDefinition>) -> ProviderRequest {
        let mut request = ProviderRequest::new(self.model.clone(), messages).with_tools(tools);
        request.temperature = self.temperature;
        request
    }

    /// One model round-trip. The flag tells whether content already went
    /// to the sink.
    async fn call_model(
        &self,
        request: ProviderRequest,
        sink: &mut ChunkSink<'_>,
    ) -> Result<(Message, bool), ProviderError> {
        if self.stream {
            let outcome = self.provider.stream(request, sink).await?;
            Ok((outcome.into_message(), true))
        } else {
            let response = self.provider.complete(request).await?;
            if let Some(usage) = &response.usage {
                debug!(model = %response.model, tokens = usage.total_tokens, "Model replied");
            }
            Ok((response.message, false))
        }
    }

    /// Execute one requested call and produce the tool-role message that
    /// answers it. Only sink failures escape as errors.
    async fn run_tool_call(
        &self,
        call: &MessageToolCall,
        context_log: &mut ContextLog,
        sink: &mut ChunkSink<'_>,
    ) -> Result<Message, Error> {
        let arguments = match parse_arguments(&call.arguments) {
            Ok(arguments) => arguments,
            Err(reason) => {
                warn!(tool = %call.name, call_id = %call.id, %reason, "Malformed tool arguments");
                sink(&format!("❌ {}: invalid arguments\n", call.name))?;
                return Ok(Message::tool_result(
                    &call.id,
                    format!("Error: invalid arguments for '{}': {reason}", call.name),
                ));
            }
        };

        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.id, "Requested tool not found");
            sink(&format!("❌ Tool '{}' not found\n", call.name))?;
            return Ok(Message::tool_result(
                &call.id,
                format!("Error: capability '{}' not found", call.name),
            ));
        };

        sink(&format!("⚙️ Executing tool: {}\n", call.name))?;
        info!(tool = %call.name, call_id = %call.id, "Tool call");

        let outcome = tool.execute(&arguments).await;
        if tool.name() == EXECUTE_COMMAND {
            context_log.record_command_outcome(&arguments, &outcome);
        }

        match outcome {
            Ok(value) => {
                sink(&format!("✅ {} done\n", call.name))?;
                Ok(Message::tool_result(&call.id, value.to_string()))
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                sink(&format!("❌ {} failed: {e}\n", call.name))?;
                Ok(Message::tool_result(&call.id, format!("Error: {e}")))
            }
        }
    }
}

/// Parse a raw argument payload. It must be a JSON object; an empty
/// payload counts as `{}`.
fn parse_arguments(raw: &str) -> Result<ToolArgs, String> {
    if raw.trim().is_empty() {
        return Ok(ToolArgs::new());
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {other}")),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use async_trait::async_trait;
    use rivet_core::error::ToolError;
    use rivet_core::message::Role;
    use rivet_core::tool::Tool;
    use serde_json::Value;
    use std::sync::Mutex;

    /// Records the `text` argument of every call and returns a fixed outcome.
    struct RecordingTool {
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
        outcome: Result<Value, ToolError>,
    }

    impl RecordingTool {
        fn new(name: &'static str, outcome: Result<Value, ToolError>) -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let tool = Arc::new(Self {
                name,
                calls: calls.clone(),
                outcome,
            });
            (tool, calls)
        }
    }

    #[async_trait]
    impl Tool for RecordingTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "records calls"
        }
        fn parameter_names(&self) -> &[&'static str] {
            &["text"]
        }
        async fn execute(&self, arguments: &ToolArgs) -> Result<Value, ToolError> {
            let text = arguments
                .get("text")
                .or_else(|| arguments.get("command"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            self.calls.lock().unwrap().push(text.to_string());
            self.outcome.clone()
        }
    }

    fn agent(provider: Arc<SequentialMockProvider>, tools: ToolRegistry) -> AgentLoop {
        AgentLoop::new(provider, tools, "mock-model")
    }

    #[tokio::test]
    async fn plain_answer_ends_on_first_iteration() {
        let provider = Arc::new(SequentialMockProvider::single_text("Hello! How can I help?"));
        let (echo, _) = RecordingTool::new("echo", Ok(Value::Null));
        let mut tools = ToolRegistry::new();
        tools.register(echo);

        let history = vec![Message::user("earlier"), Message::assistant("reply")];
        let mut out = String::new();
        let outcome = agent(provider.clone(), tools)
            .run(
                TurnRequest::new("Hello!")
                    .with_history(&history)
                    .with_persona(Some("Be brief."))
                    .with_analysis(Some("Intent: greeting")),
                &mut |c: &str| {
                    out.push_str(c);
                    Ok(())
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.answer, "Hello! How can I help?");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.tool_calls_made, 0);
        assert_eq!(outcome.context_log, None);
        assert_eq!(out, "Hello! How can I help?");

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        let roles: Vec<Role> = requests[0].messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant, Role::User]);
        assert!(requests[0].messages[0].content.starts_with("Be brief."));
        assert_eq!(requests[0].messages[1].content, "earlier");
        assert!(requests[0].messages[3].content.contains("Intent: greeting"));
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[0].tool_choice.as_deref(), Some("auto"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_and_turn_continues() {
        let provider = Arc::new(SequentialMockProvider::replies(vec![
            make_tool_call_response(
                vec![make_tool_call("call_1", "teleport", serde_json::json!({"to": "mars"}))],
                "",
            ),
            make_text_response("I cannot teleport."),
        ]));

        let mut out = String::new();
        let outcome = agent(provider.clone(), ToolRegistry::new())
            .run(
                TurnRequest::new("go to mars"),
                &mut |c: &str| {
                    out.push_str(c);
                    Ok(())
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.answer, "I cannot teleport.");
        assert_eq!(outcome.iterations, 2);
        assert!(out.contains("not found"));

        let second = &provider.requests()[1].messages;
        let assistant = &second[second.len() - 2];
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.tool_calls[0].name, "teleport");
        let tool_msg = second.last().unwrap();
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_msg.content.contains("not found"));
    }

    #[tokio::test]
    async fn malformed_arguments_are_recoverable() {
        let (echo, calls) = RecordingTool::new("echo", Ok(Value::Null));
        let mut tools = ToolRegistry::new();
        tools.register(echo);

        let provider = Arc::new(SequentialMockProvider::replies(vec![
            make_tool_call_response(
                vec![
                    make_raw_tool_call("call_bad", "echo", "{not json"),
                    make_raw_tool_call("call_arr", "echo", "[1, 2]"),
                ],
                "",
            ),
            make_text_response("done"),
        ]));

        let outcome = agent(provider.clone(), tools)
            .run(TurnRequest::new("x"), &mut |_: &str| Ok(()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.answer, "done");
        assert!(calls.lock().unwrap().is_empty());
        let second = &provider.requests()[1].messages;
        let n = second.len();
        assert!(second[n - 2].content.contains("invalid arguments"));
        assert_eq!(second[n - 2].tool_call_id.as_deref(), Some("call_bad"));
        assert!(second[n - 1].content.contains("expected a JSON object"));
    }

    #[tokio::test]
    async fn tool_calls_run_in_model_order() {
        let (echo, calls) = RecordingTool::new("echo", Ok(serde_json::json!({"ok": true})));
        let mut tools = ToolRegistry::new();
        tools.register(echo);

        let provider = Arc::new(SequentialMockProvider::replies(vec![
            make_tool_call_response(
                vec![
                    make_tool_call("c1", "echo", serde_json::json!({"text": "first"})),
                    make_tool_call("c2", "echo", serde_json::json!({"text": "second"})),
                    make_tool_call("c3", "echo", serde_json::json!({"text": "third"})),
                ],
                "working on it",
            ),
            make_text_response("all done"),
        ]));

        let outcome = agent(provider.clone(), tools)
            .run(TurnRequest::new("x"), &mut |_: &str| Ok(()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), ["first", "second", "third"]);
        assert_eq!(outcome.tool_calls_made, 3);

        let second = &provider.requests()[1].messages;
        let ids: Vec<_> = second
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.tool_call_id.clone().unwrap())
            .collect();
        assert_eq!(ids, ["c1", "c2", "c3"]);
        assert_eq!(second.last().unwrap().content, r#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn tool_failure_becomes_tool_message() {
        let (echo, _) = RecordingTool::new(
            "echo",
            Err(ToolError::ExecutionFailed {
                tool_name: "echo".into(),
                reason: "disk full".into(),
            }),
        );
        let mut tools = ToolRegistry::new();
        tools.register(echo);

        let provider = Arc::new(SequentialMockProvider::replies(vec![
            make_tool_call_response(vec![make_tool_call("c1", "echo", serde_json::json!({"text": "x"}))], ""),
            make_text_response("sorry"),
        ]));

        let mut out = String::new();
        let outcome = agent(provider.clone(), tools)
            .run(
                TurnRequest::new("x"),
                &mut |c: &str| {
                    out.push_str(c);
                    Ok(())
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.answer, "sorry");
        assert!(out.contains("⚙️ Executing tool: echo"));
        assert!(out.contains("❌ echo failed"));
        let last = provider.requests()[1].messages.last().unwrap().clone();
        assert!(last.content.starts_with("Error: "));
        assert!(last.content.contains("disk full"));
    }

    #[tokio::test]
    async fn budget_exhaustion_is_fatal() {
        let (echo, calls) = RecordingTool::new("echo", Ok(Value::Null));
        let mut tools = ToolRegistry::new();
        tools.register(echo);

        let call = make_tool_call("loop", "echo", serde_json::json!({"text": "again"}));
        let provider = Arc::new(SequentialMockProvider::always_tool_call(call, 10));

        let mut out = String::new();
        let err = agent(provider.clone(), tools)
            .run(
                TurnRequest::new("x"),
                &mut |c: &str| {
                    out.push_str(c);
                    Ok(())
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::IterationBudgetExceeded { max_iterations: 10 }));
        assert_eq!(provider.call_count(), 10);
        assert_eq!(calls.lock().unwrap().len(), 10);
        assert!(!out.contains("again"));
    }

    #[tokio::test]
    async fn custom_budget_is_honoured() {
        let call = make_tool_call("c", "missing", serde_json::json!({}));
        let provider = Arc::new(SequentialMockProvider::always_tool_call(call, 3));
        let err = agent(provider.clone(), ToolRegistry::new())
            .with_max_iterations(3)
            .run(TurnRequest::new("x"), &mut |_: &str| Ok(()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IterationBudgetExceeded { max_iterations: 3 }));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn only_shell_calls_reach_the_context_log() {
        let (shell, _) = RecordingTool::new(
            EXECUTE_COMMAND,
            Ok(serde_json::json!({"command": "echo hi", "output": "hi\n", "success": true})),
        );
        let (echo, _) = RecordingTool::new("echo", Ok(Value::Null));
        let mut tools = ToolRegistry::new();
        tools.register(shell);
        tools.register(echo);

        let provider = Arc::new(SequentialMockProvider::replies(vec![
            make_tool_call_response(
                vec![
                    make_tool_call("c1", EXECUTE_COMMAND, serde_json::json!({"command": "echo hi"})),
                    make_tool_call("c2", "echo", serde_json::json!({"text": "quiet"})),
                ],
                "",
            ),
            make_text_response("ran it"),
        ]));

        let outcome = agent(provider, tools)
            .run(TurnRequest::new("x"), &mut |_: &str| Ok(()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome.context_log.as_deref(),
            Some("[execute_command] echo hi | success=true")
        );
    }

    #[tokio::test]
    async fn transport_failure_carries_iteration() {
        let (echo, _) = RecordingTool::new("echo", Ok(Value::Null));
        let mut tools = ToolRegistry::new();
        tools.register(echo);

        let provider = Arc::new(SequentialMockProvider::new(vec![
            Ok(make_tool_call_response(
                vec![make_tool_call("c1", "echo", serde_json::json!({"text": "x"}))],
                "",
            )),
            Err(ProviderError::ApiError {
                status_code: 500,
                message: "boom".into(),
            }),
        ]));

        let err = agent(provider, tools)
            .run(TurnRequest::new("x"), &mut |_: &str| Ok(()), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::Transport { iteration, source } => {
                assert_eq!(iteration, 2);
                assert!(matches!(source, ProviderError::ApiError { status_code: 500, .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_turn_makes_no_calls() {
        let provider = Arc::new(SequentialMockProvider::single_text("unused"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = agent(provider.clone(), ToolRegistry::new())
            .run(TurnRequest::new("x"), &mut |_: &str| Ok(()), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled { iteration: 1 }));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn cancel_during_last_tool_batch_is_not_budget_exhaustion() {
        let (echo, calls) = RecordingTool::new("echo", Ok(Value::Null));
        let mut tools = ToolRegistry::new();
        tools.register(echo);

        let call = make_tool_call("c", "echo", serde_json::json!({"text": "x"}));
        let provider = Arc::new(SequentialMockProvider::always_tool_call(call, 1));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let err = agent(provider, tools)
            .with_max_iterations(1)
            .run(
                TurnRequest::new("x"),
                &mut |_: &str| {
                    trigger.cancel();
                    Ok(())
                },
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled { iteration: 1 }));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn streaming_emits_answer_once() {
        let provider = Arc::new(SequentialMockProvider::single_text("streamed answer"));
        let mut chunks = Vec::new();
        let outcome = agent(provider, ToolRegistry::new())
            .with_streaming(true)
            .run(
                TurnRequest::new("x"),
                &mut |c: &str| {
                    chunks.push(c.to_string());
                    Ok(())
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.answer, "streamed answer");
        assert_eq!(chunks, ["streamed answer"]);
    }

    #[tokio::test]
    async fn sink_failure_aborts_turn() {
        let provider = Arc::new(SequentialMockProvider::single_text("answer"));
        let err = agent(provider, ToolRegistry::new())
            .run(
                TurnRequest::new("x"),
                &mut |_: &str| Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed")),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Output(_)));
    }

    #[test]
    fn argument_parsing() {
        assert!(parse_arguments("").unwrap().is_empty());
        assert_eq!(parse_arguments(r#"{"a":"b"}"#).unwrap()["a"], "b");
        assert!(parse_arguments("null").is_err());
        assert!(parse_arguments("{").is_err());
    }
}
