//! Poll loop: periodically refreshes observed task fields from each
//! worker's task list, and the node's utilisation from its stats endpoint.

use crate::state::ManagerState;
use shared::api::{ListTasksResponse, StatsResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

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
                poll_once(&state, &http).await;
            }
            _ = shutdown_rx.recv() => {
                info!("poll loop received shutdown signal");
                break;
            }
        }
    }
}

async fn poll_once(state: &Arc<ManagerState>, http: &reqwest::Client) {
    for node in state.nodes() {
        poll_tasks(state, http, &node.name, &node.api).await;
        poll_stats(state, http, &node.name, &node.api).await;
    }
}

async fn poll_tasks(state: &Arc<ManagerState>, http: &reqwest::Client, worker: &str, api: &str) {
    let url = format!("{}{}", api, shared::api::endpoints::TASKS);
    let response = match http.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => resp,
        Ok(resp) => {
            warn!(worker = %worker, status = %resp.status(), "poll: worker returned non-success");
            return;
        }
        Err(e) => {
            warn!(worker = %worker, error = %e, "poll: transport error listing tasks");
            return;
        }
    };

    let body: ListTasksResponse = match response.json().await {
        Ok(body) => body,
        Err(e) => {
            warn!(worker = %worker, error = %e, "poll: failed to decode task list");
            return;
        }
    };

    for observed in body.tasks {
        match state.tasks.get(observed.id) {
            Ok(mut known) => {
                known.state = observed.state;
                known.start_time = observed.start_time;
                known.finish_time = observed.finish_time;
                known.container_id = observed.container_id;
                known.host_ports = observed.host_ports;
                if let Err(e) = state.tasks.put(known.id, &known) {
                    warn!(task_id = %known.id, error = %e, "poll: failed to persist refreshed task");
                } else {
                    debug!(task_id = %known.id, state = ?known.state, "poll: task refreshed");
                }
            }
            Err(_) => {
                warn!(task_id = %observed.id, worker = %worker, "poll: worker reports unknown task, ignoring");
            }
        }
    }
}

async fn poll_stats(state: &Arc<ManagerState>, http: &reqwest::Client, worker: &str, api: &str) {
    let url = format!("{}{}", api, shared::api::endpoints::STATS);
    let response = match http.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => resp,
        _ => return,
    };

    let stats: StatsResponse = match response.json().await {
        Ok(stats) => stats,
        Err(e) => {
            warn!(worker = %worker, error = %e, "poll: failed to decode stats response");
            return;
        }
    };

    let task_count = state.task_count_for_worker(worker);
    state.update_node(worker, |node| {
        node.memory = stats.memory_total;
        node.memory_allocated = stats.memory_total.saturating_sub(stats.memory_available);
        node.disk = stats.disk_total;
        node.disk_allocated = stats.disk_total.saturating_sub(stats.disk_available);
        node.cpu_utilization = (stats.load_avg_1 / num_cpus_fallback()).min(1.0);
        node.task_count = task_count;
    });
}

/// A single logical core is assumed when normalising load average into a
/// 0.0-1.0 utilisation ratio, since no core-count crate is in the dependency
/// tree.
fn num_cpus_fallback() -> f64 {
    1.0
}
