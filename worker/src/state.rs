//! Worker-local shared state: the pending queue, the task store, the
//! container runtime, and the latest host-stats snapshot. Mirrors the
//! `ManagerState` aggregate split on the other side of the wire.

use crate::runtime::Runtime;
use crate::stats::StatsSnapshot;
use shared::storage::{InMemoryStore, SqliteStore, Store};
use shared::{Task, TaskEvent};
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

pub struct WorkerState {
    pub name: String,
    pending: Mutex<VecDeque<TaskEvent>>,
    pub tasks: Box<dyn Store<Task>>,
    pub runtime: Box<dyn Runtime>,
    stats: Mutex<StatsSnapshot>,
}

impl WorkerState {
    pub fn new(name: impl Into<String>, tasks: Box<dyn Store<Task>>, runtime: Box<dyn Runtime>) -> Self {
        Self {
            name: name.into(),
            pending: Mutex::new(VecDeque::new()),
            tasks,
            runtime,
            stats: Mutex::new(StatsSnapshot::default()),
        }
    }

    pub fn for_memory(name: impl Into<String>, runtime: Box<dyn Runtime>) -> Self {
        Self::new(name, Box::new(InMemoryStore::new()), runtime)
    }

    pub fn for_sqlite(
        name: impl Into<String>,
        data_dir: &std::path::Path,
        runtime: Box<dyn Runtime>,
    ) -> shared::Result<Self> {
        let tasks: SqliteStore<Task> = SqliteStore::open(data_dir.join("tasks.db"), "tasks")?;
        Ok(Self::new(name, Box::new(tasks), runtime))
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
        self.pending
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .len()
    }

    pub fn task(&self, id: Uuid) -> Option<Task> {
        self.tasks.get(id).ok()
    }

    pub fn update_stats(&self, snapshot: StatsSnapshot) {
        *self.stats.lock().unwrap_or_else(|poison| poison.into_inner()) = snapshot;
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.lock().unwrap_or_else(|poison| poison.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;

    #[test]
    fn enqueue_dequeue_is_fifo() {
        let state = WorkerState::for_memory("w1", Box::new(FakeRuntime::default()));
        let task_a = Task::new("a", "img");
        let task_b = Task::new("b", "img");
        state.enqueue(TaskEvent::new(shared::State::Scheduled, task_a.clone()));
        state.enqueue(TaskEvent::new(shared::State::Scheduled, task_b.clone()));

        assert_eq!(state.pending_len(), 2);
        assert_eq!(state.dequeue().unwrap().task.id, task_a.id);
        assert_eq!(state.dequeue().unwrap().task.id, task_b.id);
        assert!(state.dequeue().is_none());
    }
}
