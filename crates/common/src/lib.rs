//! Storage contract and shared errors for `session-seal` crates.

pub mod error;
pub mod storage;

pub use error::StorageError;
pub use storage::{MemoryStore, SessionStore};
