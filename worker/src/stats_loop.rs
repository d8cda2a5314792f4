//! Stats loop: refreshes the worker's host-statistics snapshot every 15
//! seconds, feeding `GET /stats`. Task count is derived from the task
//! store directly at request time rather than cached here.

use crate::state::WorkerState;
use crate::stats::HostStats;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub async fn run(
    state: Arc<WorkerState>,
    host_stats: Box<dyn HostStats>,
    interval_seconds: u64,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                state.update_stats(host_stats.snapshot());
            }
            _ = shutdown_rx.recv() => {
                info!("stats loop shutting down");
                break;
            }
        }
    }
}
