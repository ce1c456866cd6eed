//! On-disk storage for rivet: saved conversations and per-user personas.

pub mod history;
pub mod persona;

pub use history::{ConversationRecord, HistoryMessage, HistoryStore};
pub use persona::{PersonaRecord, PersonaStore};
