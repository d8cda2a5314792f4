//! Shared data structures and utilities for the task orchestrator.
//!
//! This crate contains the task/event model, the state machine both the
//! manager and the worker enforce, the pluggable storage contract, the node
//! model, and the wire types exchanged between the two processes' HTTP APIs.

pub mod api;
pub mod config;
pub mod node;
pub mod storage;
pub mod task;

pub use node::Node;
pub use storage::{InMemoryStore, SqliteStore, Store, StorageError};
pub use task::{State, Task, TaskEvent};

/// Result type alias used throughout the shared crate and both binaries.
pub type Result<T> = anyhow::Result<T>;

/// Error kinds common to the manager and the worker, per the control-plane
/// error handling design: validation, scheduling, transport, runtime, and
/// storage failures each carry distinct recovery semantics for callers.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("scheduling error: {0}")]
    Scheduling(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_basic_imports() {
        // Smoke test to ensure all modules can be imported.
    }
}
