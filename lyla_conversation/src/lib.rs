#![warn(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Multi-turn conversation sessions.
//!
//! A session keeps the full transcript of one user (optionally scoped to a
//! profile), forwards a bounded memory window of it to the chat backend on
//! every turn, and persists it through a `KeyValueStore`.

mod history;
mod manager;
mod session;

pub use history::{HistoryConfig, HistoryManager, HistoryStats, HistoryWindow};
pub use manager::{
    ConversationConfig, ConversationError, ConversationManager, Profile, Reply, SessionState,
    TurnResult, TurnUsage,
};
pub use session::{ConversationSession, SNAPSHOT_VERSION, SessionSnapshot, session_key};
