//! Prompt text and the small parsers that read structured parts back out
//! of model replies.

use rivet_core::message::Message;

/// Persona used when the user has not stored one.
pub const DEFAULT_PERSONA: &str = "You are a capable command-line assistant.";

/// Appended to every system message in the tool-calling loop.
pub const TOOL_POLICY: &str = "\
Use the provided tools when the request needs file access, code output or shell commands. \
Call tools through the function-calling interface, one step at a time, and read each result \
before deciding the next step. When the task is complete, or no tool is needed, answer the \
user directly without calling any tool.";

/// System message: persona followed by the tool policy.
pub fn system_message(persona: Option<&str>) -> Message {
    let persona = persona
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PERSONA);
    Message::system(format!("{persona}\n\n{TOOL_POLICY}"))
}

/// The user's request, annotated with upstream analysis when present.
pub fn user_request(input: &str, analysis: Option<&str>) -> Message {
    match analysis.map(str::trim).filter(|a| !a.is_empty()) {
        Some(analysis) => Message::user(format!(
            "Prior analysis:\n{analysis}\n\nUser request: {input}"
        )),
        None => Message::user(input),
    }
}

pub fn intent_prompt(input: &str) -> String {
    format!(
        r#"Analyse the user's intent and decide what is needed to fulfil it.

User request: {input}

Answer in this format:

<thinking>
Reason about what the user wants and which information or tools are required.
</thinking>

{{
  "intent": "one-line summary of what the user wants",
  "need_code_analysis": true or false,
  "need_image_analysis": true or false,
  "target_files": ["paths of source files worth reading, if any"],
  "target_images": ["paths of images worth describing, if any"]
}}"#
    )
}

pub fn think_prompt(tools: &str, input: &str, intention: &str) -> String {
    format!(
        r#"Based on the request and the intent analysis, think through how to complete the task.

Available tools:
{tools}

User request: {input}
Intent analysis: {intention}

Work out the steps, which tools they need, in what order and with which parameters.
Reply with JSON:
{{
  "steps": ["step 1", "step 2"],
  "tools_needed": ["tool_a"],
  "reasoning": "your reasoning"
}}"#
    )
}

pub fn decision_prompt(thinking: &str, input: &str) -> String {
    format!(
        r#"Turn the following plan into concrete tool calls.

Plan:
{thinking}

User request: {input}

Reply with a JSON array of calls:
[
  {{"tool": "tool_name", "params": {{"param1": "value1"}}}}
]

Reply with [] when no tool is needed."#
    )
}

pub fn summary_prompt(input: &str, results: &str) -> String {
    format!(
        r#"Write a friendly reply to the user that summarises these tool results.

User request: {input}

Tool results:
{results}

Say whether the task is complete and what the concrete outcome was."#
    )
}

/// Contents of the first `<thinking>...</thinking>` block, trimmed.
pub fn extract_thinking(text: &str) -> Option<&str> {
    let start = text.find("<thinking>")? + "<thinking>".len();
    let end = start + text[start..].find("</thinking>")?;
    let thinking = text[start..end].trim();
    (!thinking.is_empty()).then_some(thinking)
}

/// Slice from the first `open` to the last `close`, inclusive.
fn delimited(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// The JSON object embedded in a reply: first `{` to last `}`.
pub fn extract_object(text: &str) -> Option<&str> {
    delimited(text, '{', '}')
}

/// The JSON array embedded in a reply: first `[` to last `]`.
pub fn extract_array(text: &str) -> Option<&str> {
    delimited(text, '[', ']')
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}\n... (truncated)", &text[..byte_idx]),
        None => text.to_string(),
    }
}
