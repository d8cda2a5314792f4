//! Shared, mutex-guarded manager state: the pending event queue, the task
//! and event stores, the worker/task bookkeeping maps, and the node list.
//!
//! Each aggregate is guarded independently so the dispatch, poll, and
//! health-check loops, plus the HTTP handlers, never serialise on state they
//! don't touch. No lock here is ever held across a network call.

use crate::scheduler::Scheduler;
use shared::{InMemoryStore, Node, SqliteStore, Store, Task, TaskEvent};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

pub struct ManagerState {
    pending: Mutex<VecDeque<TaskEvent>>,
    pub tasks: Box<dyn Store<Task>>,
    pub events: Box<dyn Store<TaskEvent>>,
    worker_task_map: Mutex<HashMap<String, HashSet<Uuid>>>,
    task_worker_map: Mutex<HashMap<Uuid, String>>,
    nodes: Mutex<Vec<Node>>,
    pub scheduler: Box<dyn Scheduler>,
}

impl ManagerState {
    pub fn new(
        tasks: Box<dyn Store<Task>>,
        events: Box<dyn Store<TaskEvent>>,
        nodes: Vec<Node>,
        scheduler: Box<dyn Scheduler>,
    ) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            tasks,
            events,
            worker_task_map: Mutex::new(HashMap::new()),
            task_worker_map: Mutex::new(HashMap::new()),
            nodes: Mutex::new(nodes),
            scheduler,
        }
    }

    pub fn for_memory(nodes: Vec<Node>, scheduler: Box<dyn Scheduler>) -> Self {
        Self::new(
            Box::new(InMemoryStore::new()),
            Box::new(InMemoryStore::new()),
            nodes,
            scheduler,
        )
    }

    pub fn for_sqlite(
        data_dir: &std::path::Path,
        nodes: Vec<Node>,
        scheduler: Box<dyn Scheduler>,
    ) -> shared::Result<Self> {
        let tasks = SqliteStore::open(data_dir.join("tasks.db"), "tasks")?;
        let events = SqliteStore::open(data_dir.join("events.db"), "events")?;
        Ok(Self::new(Box::new(tasks), Box::new(events), nodes, scheduler))
    }

    pub fn enqueue(&self, event: TaskEvent) {
        self.pending
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push_back(event);
    }

    pub fn dequeue(&self) -> Option<TaskEvent> {
        self.pending
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .pop_front()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|poison| poison.into_inner()).len()
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.lock().unwrap_or_else(|poison| poison.into_inner()).clone()
    }

    pub fn update_node<F: FnOnce(&mut Node)>(&self, name: &str, f: F) {
        let mut nodes = self.nodes.lock().unwrap_or_else(|poison| poison.into_inner());
        if let Some(node) = nodes.iter_mut().find(|n| n.name == name) {
            f(node);
        }
    }

    /// Records that `task_id` is assigned to `worker`. Enforces invariant 1:
    /// a task is a member of exactly one worker's set.
    pub fn assign(&self, task_id: Uuid, worker: &str) {
        let mut task_worker = self.task_worker_map.lock().unwrap_or_else(|poison| poison.into_inner());
        let mut worker_task = self.worker_task_map.lock().unwrap_or_else(|poison| poison.into_inner());

        if let Some(previous) = task_worker.insert(task_id, worker.to_string()) {
            if previous != worker {
                if let Some(set) = worker_task.get_mut(&previous) {
                    set.remove(&task_id);
                }
            }
        }
        worker_task.entry(worker.to_string()).or_default().insert(task_id);
    }

    pub fn assigned_worker(&self, task_id: Uuid) -> Option<String> {
        self.task_worker_map
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(&task_id)
            .cloned()
    }

    pub fn tasks_for_worker(&self, worker: &str) -> HashSet<Uuid> {
        self.worker_task_map
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(worker)
            .cloned()
            .unwrap_or_default()
    }

    pub fn task_count_for_worker(&self, worker: &str) -> usize {
        self.tasks_for_worker(worker).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::RoundRobin;

    #[test]
    fn assign_keeps_maps_mutually_consistent() {
        let state = ManagerState::for_memory(vec![Node::new("a", "http://a")], Box::new(RoundRobin::new()));
        let id = Uuid::new_v4();
        state.assign(id, "a");
        assert_eq!(state.assigned_worker(id), Some("a".to_string()));
        assert!(state.tasks_for_worker("a").contains(&id));
    }

    #[test]
    fn reassign_removes_task_from_previous_worker() {
        let state = ManagerState::for_memory(
            vec![Node::new("a", "http://a"), Node::new("b", "http://b")],
            Box::new(RoundRobin::new()),
        );
        let id = Uuid::new_v4();
        state.assign(id, "a");
        state.assign(id, "b");
        assert!(!state.tasks_for_worker("a").contains(&id));
        assert!(state.tasks_for_worker("b").contains(&id));
    }
}
