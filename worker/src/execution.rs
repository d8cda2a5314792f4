//! Execution loop: dequeues one task event per tick, validates the
//! transition, and drives the container runtime.

use crate::state::WorkerState;
use chrono::Utc;
use shared::{State, TaskEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub async fn run(
    state: Arc<WorkerState>,
    interval_seconds: u64,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(event) = state.dequeue() {
                    process_event(&state, event).await;
                }
            }
            _ = shutdown_rx.recv() => {
                info!("execution loop shutting down");
                break;
            }
        }
    }
}

async fn process_event(state: &WorkerState, event: TaskEvent) {
    let persisted = match state.task(event.task.id) {
        Some(task) => task,
        None => {
            // First sighting of this task: seed the store from the event's
            // embedded snapshot before validating the transition.
            let seed = event.task.clone();
            if let Err(e) = state.tasks.put(seed.id, &seed) {
                error!(task_id = %seed.id, error = %e, "failed to seed task record");
                return;
            }
            seed
        }
    };

    // A restart-targeted event carries target state Running even when the
    // worker's own persisted record is Failed, the one controlled exception
    // to the transition table (the manager-side mirror of this exception
    // forces Failed -> Scheduled for the same restart path).
    let is_restart = event.state == State::Running && persisted.state == State::Failed;
    if !persisted.state.can_transition_to(event.state) && !is_restart {
        error!(
            task_id = %persisted.id,
            from = ?persisted.state,
            to = ?event.state,
            "rejected invalid state transition"
        );
        return;
    }

    match event.state {
        State::Scheduled => start_task(state, persisted).await,
        State::Running => start_task(state, persisted).await,
        State::Completed => stop_task(state, persisted).await,
        other => {
            error!(task_id = %persisted.id, target = ?other, "execution loop received an unsupported target state");
        }
    }
}

async fn start_task(state: &WorkerState, mut task: shared::Task) {
    match state.runtime.run(&task).await {
        Ok(result) => {
            task.state = State::Running;
            task.container_id = Some(result.container_id);
            task.host_ports = result.host_ports;
            task.start_time = Some(Utc::now());
            info!(task_id = %task.id, "task started");
        }
        Err(e) => {
            task.state = State::Failed;
            error!(task_id = %task.id, error = %e, "failed to start task");
        }
    }
    if let Err(e) = state.tasks.put(task.id, &task) {
        error!(task_id = %task.id, error = %e, "failed to persist task after start");
    }
}

async fn stop_task(state: &WorkerState, mut task: shared::Task) {
    if let Some(container_id) = &task.container_id {
        if let Err(e) = state.runtime.stop(container_id).await {
            error!(task_id = %task.id, error = %e, "failed to stop container, proceeding anyway");
        }
    }
    task.state = State::Completed;
    task.finish_time = Some(Utc::now());
    if let Err(e) = state.tasks.put(task.id, &task) {
        error!(task_id = %task.id, error = %e, "failed to persist task after stop");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;
    use shared::Task;

    fn state() -> Arc<WorkerState> {
        Arc::new(WorkerState::for_memory("w1", Box::new(FakeRuntime::default())))
    }

    #[tokio::test]
    async fn scheduled_event_starts_the_task() {
        let state = state();
        let task = Task::new("web", "nginx:latest");
        let event = TaskEvent::new(State::Scheduled, task.clone());
        process_event(&state, event).await;

        let stored = state.task(task.id).unwrap();
        assert_eq!(stored.state, State::Running);
        assert!(stored.container_id.is_some());
        assert!(stored.start_time.is_some());
    }

    #[tokio::test]
    async fn completed_event_stops_a_running_task() {
        let state = state();
        let task = Task::new("web", "nginx:latest");
        process_event(&state, TaskEvent::new(State::Scheduled, task.clone())).await;
        let running = state.task(task.id).unwrap();

        process_event(&state, TaskEvent::new(State::Completed, running)).await;
        let stopped = state.task(task.id).unwrap();
        assert_eq!(stopped.state, State::Completed);
        assert!(stopped.finish_time.is_some());
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected() {
        let state = state();
        let mut task = Task::new("web", "nginx:latest");
        task.state = State::Pending;
        let bad_event = TaskEvent::new(State::Running, task.clone());
        process_event(&state, bad_event).await;

        let stored = state.task(task.id).unwrap();
        assert_eq!(stored.state, State::Pending);
    }

    #[tokio::test]
    async fn runtime_failure_marks_task_failed() {
        let state = Arc::new(WorkerState::for_memory(
            "w1",
            Box::new(FakeRuntime {
                fail_run: true,
                ..Default::default()
            }),
        ));
        let task = Task::new("web", "nginx:latest");
        process_event(&state, TaskEvent::new(State::Scheduled, task.clone())).await;

        let stored = state.task(task.id).unwrap();
        assert_eq!(stored.state, State::Failed);
    }
}
