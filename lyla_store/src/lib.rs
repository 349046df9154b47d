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

//! Interchangeable `KeyValueStore` backends for persisted sessions.

mod database;
mod file;
mod github;
mod key;
mod memory;

pub use database::DatabaseStore;
pub use file::FileStore;
pub use github::GitHubStore;
pub use key::{decode_key, encode_key};
pub use memory::MemoryStore;
