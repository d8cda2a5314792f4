//! Node model: a logical worker the manager places tasks on.

use serde::{Deserialize, Serialize};

/// A worker node as seen by the manager. Created once from static
/// configuration at manager startup; never added or removed at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// The node's `host:port`, also its unique name.
    pub name: String,
    /// Base URL of the worker's HTTP API, e.g. `http://10.0.0.2:8089`.
    pub api: String,
    pub role: String,
    /// Total memory capacity in bytes.
    pub memory: u64,
    /// Memory currently allocated to tasks, in bytes.
    pub memory_allocated: u64,
    /// Total disk capacity in bytes.
    pub disk: u64,
    /// Disk currently allocated to tasks, in bytes.
    pub disk_allocated: u64,
    /// Number of tasks currently assigned to this node.
    pub task_count: usize,
    /// Observed CPU utilisation in the range [0.0, 1.0], refreshed by the
    /// manager's poll loop from the worker's `/stats` response.
    pub cpu_utilization: f64,
}

impl Node {
    pub fn new(name: impl Into<String>, api: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api: api.into(),
            role: "worker".to_string(),
            memory: 0,
            memory_allocated: 0,
            disk: 0,
            disk_allocated: 0,
            task_count: 0,
            cpu_utilization: 0.0,
        }
    }

    /// Bytes of memory not yet committed to a task.
    pub fn available_memory(&self) -> u64 {
        self.memory.saturating_sub(self.memory_allocated)
    }
}
