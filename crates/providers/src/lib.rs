//! Chat-completion transports for rivet.
//!
//! All providers implement the `rivet_core::Provider` trait. The SSE
//! decoder is exposed separately so it can be driven from any byte stream.

pub mod openai_compat;
pub mod sse;

pub use openai_compat::OpenAiCompatProvider;
pub use sse::{SseDecoder, read_event_stream};
