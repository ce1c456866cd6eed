//! Server-Sent-Events decoding for streamed chat completions.
//!
//! The body is a sequence of newline-delimited lines. Only `data:` lines
//! matter; `data: [DONE]` ends the stream. A data line that does not parse
//! as a delta object is skipped and decoding carries on with the next line.

use futures::{Stream, StreamExt};
use rivet_core::error::ProviderError;
use rivet_core::message::MessageToolCall;
use rivet_core::provider::{ChunkSink, StreamOutcome};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, trace};

const DATA_PREFIX: &str = "data:";
const DONE_TOKEN: &str = "[DONE]";

/// Incremental decoder state. Bytes may be split anywhere, including
/// inside a multi-byte character; lines are cut on raw `\n` bytes.
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    content: String,
    tool_calls: BTreeMap<u32, ToolCallAccumulator>,
    finish_reason: Option<String>,
    skipped: usize,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes. Returns `true` once the termination token was seen;
    /// bytes after it are ignored.
    pub fn feed(&mut self, bytes: &[u8], on_chunk: &mut ChunkSink<'_>) -> Result<bool, ProviderError> {
        if self.done {
            return Ok(true);
        }
        self.buffer.extend_from_slice(bytes);
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            self.handle_line(&line, on_chunk)?;
            if self.done {
                self.buffer.clear();
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Process a trailing line that arrived without a newline.
    pub fn flush(&mut self, on_chunk: &mut ChunkSink<'_>) -> Result<(), ProviderError> {
        if self.done || self.buffer.is_empty() {
            return Ok(());
        }
        let line = std::mem::take(&mut self.buffer);
        self.handle_line(&line, on_chunk)
    }

    /// Number of data lines dropped because they did not parse.
    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Everything decoded so far.
    pub fn finish(self) -> StreamOutcome {
        StreamOutcome {
            content: self.content,
            tool_calls: self
                .tool_calls
                .into_iter()
                .map(|(index, acc)| acc.into_tool_call(index))
                .collect(),
            finish_reason: self.finish_reason,
        }
    }

    fn handle_line(&mut self, raw: &[u8], on_chunk: &mut ChunkSink<'_>) -> Result<(), ProviderError> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();

        // Blank separators and SSE comments
        if line.is_empty() || line.starts_with(':') {
            return Ok(());
        }
        // event:, id:, retry: carry nothing we use
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            return Ok(());
        };
        let data = data.trim();

        if data == DONE_TOKEN {
            self.done = true;
            return Ok(());
        }

        let event = match serde_json::from_str::<StreamResponse>(data) {
            Ok(event) => event,
            Err(e) => {
                self.skipped += 1;
                trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                return Ok(());
            }
        };

        let Some(choice) = event.choices.into_iter().next() else {
            return Ok(());
        };

        for delta in choice.delta.tool_calls.unwrap_or_default() {
            let acc = self.tool_calls.entry(delta.index).or_default();
            if let Some(id) = delta.id {
                acc.id = id;
            }
            if let Some(function) = delta.function {
                if let Some(name) = function.name {
                    acc.name.push_str(&name);
                }
                if let Some(args) = function.arguments {
                    acc.arguments.push_str(&args);
                }
            }
        }

        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            self.content.push_str(&content);
            on_chunk(&content).map_err(|e| ProviderError::CallbackAborted(e.to_string()))?;
        }

        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
        }
        Ok(())
    }
}

/// Drain a byte stream through an [`SseDecoder`].
///
/// Stops at `[DONE]`, at end of body, or as soon as `on_chunk` errors.
/// A read error mid-body, or no bytes for `idle_timeout`, surfaces as
/// [`ProviderError::StreamInterrupted`].
pub async fn read_event_stream<S, B, E>(
    stream: S,
    idle_timeout: Duration,
    on_chunk: &mut ChunkSink<'_>,
) -> Result<StreamOutcome, ProviderError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = SseDecoder::new();

    loop {
        let next = tokio::time::timeout(idle_timeout, stream.next())
            .await
            .map_err(|_| {
                ProviderError::StreamInterrupted(format!(
                    "no data received for {}s",
                    idle_timeout.as_secs()
                ))
            })?;
        let Some(next) = next else { break };
        let bytes = next.map_err(|e| ProviderError::StreamInterrupted(e.to_string()))?;
        if decoder.feed(bytes.as_ref(), on_chunk)? {
            break;
        }
    }
    decoder.flush(on_chunk)?;

    if !decoder.is_done() {
        debug!("Stream ended without a termination event");
    }
    if decoder.skipped_lines() > 0 {
        debug!(skipped = decoder.skipped_lines(), "Skipped malformed stream events");
    }
    Ok(decoder.finish())
}

// --- Wire types ---

/// A single `data: {...}` payload.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta; id and name arrive first, arguments in fragments.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn into_tool_call(self, index: u32) -> MessageToolCall {
        MessageToolCall {
            id: if self.id.is_empty() {
                format!("call_{index}")
            } else {
                self.id
            },
            name: self.name,
            arguments: self.arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    type Chunk = Result<Vec<u8>, io::Error>;

    const IDLE: Duration = Duration::from_secs(30);

    fn body(parts: &[&str]) -> impl Stream<Item = Chunk> {
        let owned: Vec<Chunk> = parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(owned)
    }

    async fn collect(parts: &[&str]) -> (StreamOutcome, Vec<String>) {
        let mut seen = Vec::new();
        let outcome = read_event_stream(body(parts), IDLE, &mut |chunk: &str| {
            seen.push(chunk.to_string());
            Ok(())
        })
        .await
        .unwrap();
        (outcome, seen)
    }

    #[tokio::test]
    async fn content_fragments_arrive_in_order() {
        let (outcome, seen) = collect(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"ab\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"cd\"}}]}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;
        assert_eq!(outcome.content, "abcd");
        assert_eq!(seen, vec!["ab".to_string(), "cd".to_string()]);
    }

    #[tokio::test]
    async fn invalid_line_is_skipped() {
        let mut decoder = SseDecoder::new();
        let mut seen = Vec::new();
        let payload = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"ab\"}}]}\n",
            "data: {not json\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"cd\"}}]}\n",
            "data: [DONE]\n",
        );
        let done = decoder
            .feed(payload.as_bytes(), &mut |chunk: &str| {
                seen.push(chunk.to_string());
                Ok(())
            })
            .unwrap();
        assert!(done);
        assert_eq!(decoder.skipped_lines(), 1);
        assert_eq!(decoder.finish().content, "abcd");
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn lines_split_across_reads() {
        let (outcome, seen) = collect(&[
            "data: {\"choices\":[{\"del",
            "ta\":{\"content\":\"héllo\"}}]}\n",
            "\ndata: [DO",
            "NE]\n",
        ])
        .await;
        assert_eq!(outcome.content, "héllo");
        assert_eq!(seen, vec!["héllo".to_string()]);
    }

    #[tokio::test]
    async fn multibyte_char_split_between_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"日本\"}}]}\n".as_bytes();
        // Split inside the first character's UTF-8 sequence
        let cut = line.iter().position(|b| *b >= 0x80).unwrap() + 1;
        let parts: Vec<Chunk> = vec![Ok(line[..cut].to_vec()), Ok(line[cut..].to_vec())];
        let outcome = read_event_stream(futures::stream::iter(parts), IDLE, &mut |_: &str| Ok(()))
            .await
            .unwrap();
        assert_eq!(outcome.content, "日本");
    }

    #[tokio::test]
    async fn nothing_after_done_is_read() {
        let (outcome, seen) = collect(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n",
            "data: [DONE]\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
        ])
        .await;
        assert_eq!(outcome.content, "x");
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn eof_without_done_is_success() {
        let (outcome, _) = collect(&[
            ": keep-alive\n",
            "event: message\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}",
        ])
        .await;
        assert_eq!(outcome.content, "tail");
    }

    #[tokio::test]
    async fn empty_content_is_not_forwarded() {
        let (outcome, seen) = collect(&[
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n",
            "data: [DONE]\n",
        ])
        .await;
        assert!(seen.is_empty());
        assert_eq!(outcome.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn callback_error_stops_reading() {
        let mut calls = 0;
        let err = read_event_stream(
            body(&[
                "data: {\"choices\":[{\"delta\":{\"content\":\"one\"}}]}\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"two\"}}]}\n",
                "data: [DONE]\n",
            ]),
            IDLE,
            &mut |_: &str| {
                calls += 1;
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProviderError::CallbackAborted(ref m) if m.contains("stdout closed")));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn read_error_interrupts_stream() {
        let parts: Vec<Chunk> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n".to_vec()),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let err = read_event_stream(futures::stream::iter(parts), IDLE, &mut |_: &str| Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::StreamInterrupted(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_body_times_out() {
        let first: Chunk = Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n".to_vec());
        let stalled = futures::stream::iter([first]).chain(futures::stream::pending());
        let mut seen = Vec::new();
        let err = read_event_stream(stalled, Duration::from_secs(5), &mut |chunk: &str| {
            seen.push(chunk.to_string());
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ProviderError::StreamInterrupted(ref m) if m.contains("5s")));
        assert_eq!(seen, ["a"]);
    }

    #[tokio::test]
    async fn tool_call_deltas_are_assembled_by_index() {
        let (outcome, seen) = collect(&[
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":1,\"id\":\"call_b\",\"function\":{\"name\":\"read_file\",\"arguments\":\"\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_a\",\"function\":{\"name\":\"execute_command\",\"arguments\":\"{\\\"command\\\"\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\":\\\"ls\\\"}\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n",
            "data: [DONE]\n",
        ])
        .await;
        assert!(seen.is_empty());
        assert_eq!(outcome.tool_calls.len(), 2);
        assert_eq!(outcome.tool_calls[0].id, "call_a");
        assert_eq!(outcome.tool_calls[0].name, "execute_command");
        assert_eq!(outcome.tool_calls[0].arguments, "{\"command\":\"ls\"}");
        assert_eq!(outcome.tool_calls[1].name, "read_file");
        assert_eq!(outcome.finish_reason.as_deref(), Some("tool_calls"));
    }
}
