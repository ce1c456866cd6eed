//! The agent: what happens between a user typing a request and an answer
//! coming back.
//!
//! A turn goes through up to three steps:
//!
//! 1. **Analyse** the request ([`IntentAnalyzer`]): one model call that
//!    works out the intent and attaches any files or images it names.
//! 2. **Run** either the tool-calling loop ([`AgentLoop`]) or the fixed
//!    four-stage [`Pipeline`].
//! 3. **Carry** the turn's [`ContextLog`] into the next turn's prompt.
//!
//! [`Session`] strings these together for one user.

pub mod context_log;
pub mod intent;
pub mod loop_runner;
pub mod pipeline;
pub mod prompts;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use context_log::ContextLog;
pub use intent::{IntentAnalyzer, IntentReport};
pub use loop_runner::{AgentLoop, DEFAULT_MAX_ITERATIONS, TurnOutcome, TurnRequest};
pub use pipeline::Pipeline;
pub use session::Session;
