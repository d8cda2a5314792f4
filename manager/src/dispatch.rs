//! Dispatch loop: drains the pending event queue, assigns unplaced tasks to
//! a worker via the scheduler, and forwards stop requests for tasks that are
//! already assigned.

use crate::state::ManagerState;
use shared::{State, TaskEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub async fn run(
    state: Arc<ManagerState>,
    http: reqwest::Client,
    interval_seconds: u64,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(event) = state.dequeue() {
                    process_event(&state, &http, event).await;
                }
            }
            _ = shutdown_rx.recv() => {
                info!("dispatch loop received shutdown signal");
                break;
            }
        }
    }
}

async fn process_event(state: &Arc<ManagerState>, http: &reqwest::Client, event: TaskEvent) {
    if let Err(e) = state.events.put(event.id, &event) {
        error!(error = %e, "failed to persist task event");
    }

    let task_id = event.task.id;

    if let Some(worker) = state.assigned_worker(task_id) {
        match event.state {
            State::Completed => stop_assigned_task(state, http, &worker, event).await,
            State::Running => redispatch_to_assigned_worker(state, http, &worker, event).await,
            other => {
                warn!(task_id = %task_id, target = ?other, "dispatch: rejecting event for already-assigned task");
            }
        }
        return;
    }

    schedule_new_task(state, http, event).await;
}

/// Re-sends an event (typically a health-check restart) to the worker a
/// task is already assigned to, bypassing the scheduler entirely.
async fn redispatch_to_assigned_worker(
    state: &Arc<ManagerState>,
    http: &reqwest::Client,
    worker: &str,
    event: TaskEvent,
) {
    let Some(node) = state.nodes().into_iter().find(|n| n.name == worker) else {
        error!(worker = %worker, "dispatch: assigned worker not found in node list");
        return;
    };

    let url = format!("{}{}", node.api, shared::api::endpoints::TASKS);
    match http.post(&url).json(&event).send().await {
        Ok(resp) if resp.status().is_success() => {
            info!(task_id = %event.task.id, worker = %worker, "dispatch: restart delivered");
        }
        Ok(resp) => {
            warn!(task_id = %event.task.id, status = %resp.status(), "dispatch: worker rejected restart");
        }
        Err(e) => {
            warn!(task_id = %event.task.id, error = %e, "dispatch: transport error on restart, requeuing");
            state.enqueue(event);
        }
    }
}

/// A task with a known assignment may only be asked to complete or restart.
async fn stop_assigned_task(
    state: &Arc<ManagerState>,
    http: &reqwest::Client,
    worker: &str,
    event: TaskEvent,
) {
    let task_id = event.task.id;
    let persisted = match state.tasks.get(task_id) {
        Ok(t) => t,
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "dispatch: unknown assigned task, dropping event");
            return;
        }
    };

    if event.state != State::Completed || !persisted.state.can_transition_to(State::Completed) {
        warn!(
            task_id = %task_id,
            from = ?persisted.state,
            to = ?event.state,
            "dispatch: rejecting event, not a valid stop transition"
        );
        return;
    }

    let node = state.nodes().into_iter().find(|n| n.name == worker);
    let Some(node) = node else {
        error!(worker = %worker, "dispatch: assigned worker not found in node list");
        return;
    };

    let url = format!("{}{}/{}", node.api, shared::api::endpoints::TASKS, task_id);
    match http.delete(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            debug!(task_id = %task_id, worker = %worker, "dispatch: stop request delivered");
        }
        Ok(resp) => {
            warn!(task_id = %task_id, status = %resp.status(), "dispatch: worker rejected stop request");
        }
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "dispatch: transport error on stop, requeuing");
            state.enqueue(event);
        }
    }
}

async fn schedule_new_task(state: &Arc<ManagerState>, http: &reqwest::Client, mut event: TaskEvent) {
    let nodes = state.nodes();
    let Some(node) = state.scheduler.place(&event.task, &nodes) else {
        warn!(task_id = %event.task.id, "dispatch: no available candidates, dropping event");
        return;
    };

    event.task.state = State::Scheduled;
    if let Err(e) = state.tasks.put(event.task.id, &event.task) {
        error!(task_id = %event.task.id, error = %e, "dispatch: failed to persist scheduled task");
        return;
    }
    state.assign(event.task.id, &node.name);

    let url = format!("{}{}", node.api, shared::api::endpoints::TASKS);
    match http.post(&url).json(&event).send().await {
        Ok(resp) if resp.status().is_success() => {
            info!(task_id = %event.task.id, worker = %node.name, "dispatch: task assigned");
        }
        Ok(resp) => {
            warn!(task_id = %event.task.id, status = %resp.status(), "dispatch: worker rejected task event");
        }
        Err(e) => {
            warn!(task_id = %event.task.id, error = %e, "dispatch: transport error, requeuing");
            state.enqueue(event);
        }
    }
}
