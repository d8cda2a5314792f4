//! Wire types for the manager and worker HTTP APIs.
//!
//! Both APIs share the same task-event submission and task-listing shapes;
//! this module defines them once so neither process's handlers nor the CLI
//! client drift out of sync with each other.

use crate::node::Node;
use crate::task::{Task, TaskEvent};
use serde::{Deserialize, Serialize};

/// Body of `POST /tasks` on both the manager and the worker. Unknown fields
/// are rejected so malformed intents fail fast rather than silently losing
/// data, mirroring `TaskEvent`'s own `deny_unknown_fields`.
pub type SubmitTaskRequest = TaskEvent;

/// Response body for `GET /tasks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<Task>,
}

/// Response body for `GET /nodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListNodesResponse {
    pub nodes: Vec<Node>,
}

/// Snapshot of a worker's host statistics, returned by `GET /stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub memory_total: u64,
    pub memory_available: u64,
    pub disk_total: u64,
    pub disk_available: u64,
    /// Load average over the last minute, as reported by the kernel.
    pub load_avg_1: f64,
    pub task_count: usize,
}

/// Liveness payload for `GET /health` on both processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self { status: "ok" }
    }
}

/// Generic error body returned alongside non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub mod endpoints {
    pub const TASKS: &str = "/tasks";
    pub const NODES: &str = "/nodes";
    pub const STATS: &str = "/stats";
    pub const HEALTH: &str = "/health";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::State;

    #[test]
    fn submit_task_request_is_a_task_event() {
        let task = Task::new("web", "nginx:latest");
        let event = TaskEvent::new(State::Scheduled, task);
        let json = serde_json::to_string(&event).unwrap();
        let decoded: SubmitTaskRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn health_response_default_is_ok() {
        let response = HealthResponse::default();
        assert_eq!(response.status, "ok");
    }
}
