//! Health-check loop: probes running tasks' health endpoints and restarts
//! tasks that fail the probe or were last observed Failed, up to a
//! configurable restart cap.

use crate::state::ManagerState;
use shared::{State, Task, TaskEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub async fn run(
    state: Arc<ManagerState>,
    http: reqwest::Client,
    interval_seconds: u64,
    max_restart_count: u32,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                check_all(&state, &http, max_restart_count).await;
            }
            _ = shutdown_rx.recv() => {
                info!("health-check loop received shutdown signal");
                break;
            }
        }
    }
}

async fn check_all(state: &Arc<ManagerState>, http: &reqwest::Client, max_restart_count: u32) {
    let tasks = match state.tasks.list() {
        Ok(tasks) => tasks,
        Err(e) => {
            error!(error = %e, "health-check: failed to list tasks");
            return;
        }
    };

    for task in tasks {
        if task.restart_count >= max_restart_count {
            continue;
        }

        match task.state {
            State::Running => {
                if !probe_healthy(state, http, &task).await {
                    restart(state, task).await;
                }
            }
            State::Failed => {
                restart(state, task).await;
            }
            _ => {}
        }
    }
}

/// Derives `http://<host>:<observed-host-port><health_check>` by splitting
/// the assigned worker's `host:port` and substituting the ephemeral host
/// port last copied in by the poll loop. Skips the probe (treating it as
/// healthy, since we have no way to check) if no host port has been
/// observed yet for this task.
async fn probe_healthy(state: &Arc<ManagerState>, http: &reqwest::Client, task: &Task) -> bool {
    let Some(worker) = state.assigned_worker(task.id) else {
        warn!(task_id = %task.id, "health-check: running task has no assigned worker");
        return true;
    };
    let Some((host, _port)) = worker.split_once(':') else {
        error!(worker = %worker, "health-check: worker name is not host:port");
        return true;
    };
    let Some(host_port) = task.host_ports.values().next() else {
        error!(task_id = %task.id, "health-check: no host port observed yet, skipping probe");
        return true;
    };

    let url = format!("http://{host}:{host_port}{}", task.health_check);
    match http.get(&url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(e) => {
            warn!(task_id = %task.id, error = %e, "health-check: probe failed");
            false
        }
    }
}

async fn restart(state: &Arc<ManagerState>, mut task: Task) {
    let worker = match state.assigned_worker(task.id) {
        Some(worker) => worker,
        None => {
            error!(task_id = %task.id, "health-check: cannot restart, no assigned worker");
            return;
        }
    };

    task.restart_count += 1;
    task.state = State::Scheduled;
    if let Err(e) = state.tasks.put(task.id, &task) {
        error!(task_id = %task.id, error = %e, "health-check: failed to persist restart");
        return;
    }

    info!(task_id = %task.id, worker = %worker, restart_count = task.restart_count, "health-check: restarting task");
    let event = TaskEvent::new(State::Running, task);
    state.enqueue(event);
}
