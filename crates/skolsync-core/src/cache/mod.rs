//! Persistent cache for offline data access.
//!
//! The engine persists every successful network result as a JSON string
//! under `"{entity}_{key}"` and reads it back on the first load of a
//! resource. Two backends are provided:
//! - `MemoryStorage`: process-local map, for tests and ephemeral sessions
//! - `FileStorage`: one JSON file per entry in a cache directory

pub mod storage;

pub use storage::{FileStorage, MemoryStorage, Storage};
