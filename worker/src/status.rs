//! Status loop: reconciles every persisted Running task against what the
//! runtime actually reports, every 15 seconds.

use crate::state::WorkerState;
use shared::State;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub async fn run(
    state: Arc<WorkerState>,
    interval_seconds: u64,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                status_once(&state).await;
            }
            _ = shutdown_rx.recv() => {
                info!("status loop shutting down");
                break;
            }
        }
    }
}

async fn status_once(state: &WorkerState) {
    let tasks = match state.tasks.list() {
        Ok(tasks) => tasks,
        Err(e) => {
            error!(error = %e, "failed to list tasks for status reconciliation");
            return;
        }
    };

    for mut task in tasks.into_iter().filter(|t| t.state == State::Running) {
        let Some(container_id) = task.container_id.clone() else {
            warn!(task_id = %task.id, "running task has no container id, skipping inspect");
            continue;
        };

        let inspected = match state.runtime.inspect(&container_id).await {
            Ok(inspected) => inspected,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "failed to inspect container");
                continue;
            }
        };

        if inspected.is_exited() {
            task.state = State::Failed;
            warn!(task_id = %task.id, "container exited or missing, marking task failed");
        } else {
            task.host_ports = inspected.host_ports;
        }

        if let Err(e) = state.tasks.put(task.id, &task) {
            error!(task_id = %task.id, error = %e, "failed to persist task after status check");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;
    use shared::Task;

    #[tokio::test]
    async fn missing_container_marks_task_failed() {
        let runtime = FakeRuntime::default();
        let worker = Arc::new(WorkerState::for_memory("w1", Box::new(runtime)));
        let mut task = Task::new("web", "nginx:latest");
        task.state = State::Running;
        task.container_id = Some("nonexistent".to_string());
        worker.tasks.put(task.id, &task).unwrap();

        status_once(&worker).await;

        let stored = worker.task(task.id).unwrap();
        assert_eq!(stored.state, State::Failed);
    }

    #[tokio::test]
    async fn running_container_refreshes_host_ports() {
        let runtime = FakeRuntime::default();
        let mut task = Task::new("web", "nginx:latest");
        let result = {
            use crate::runtime::Runtime;
            runtime.run(&task).await.unwrap()
        };
        task.state = State::Running;
        task.container_id = Some(result.container_id.clone());

        let worker = Arc::new(WorkerState::for_memory("w1", Box::new(runtime)));
        worker.tasks.put(task.id, &task).unwrap();

        status_once(&worker).await;

        let stored = worker.task(task.id).unwrap();
        assert_eq!(stored.state, State::Running);
        assert!(!stored.host_ports.is_empty());
    }
}
