//! Worker core: the local execution queue, the container-runtime adapter,
//! and the status/stats reconciliation loops for one node.

pub mod api;
pub mod config;
pub mod execution;
pub mod runtime;
pub mod state;
pub mod stats;
pub mod stats_loop;
pub mod status;

use runtime::{BollardRuntime, Runtime};
use shared::config::{DbType, WorkerConfig};
use state::WorkerState;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn build_runtime() -> shared::Result<Box<dyn Runtime>> {
    Ok(Box::new(BollardRuntime::connect().map_err(|e| {
        anyhow::anyhow!("failed to connect to container runtime: {e}")
    })?))
}

/// Runs the worker until `shutdown_tx` fires. Spawns the execution,
/// status, and stats loops as background tasks, serves the HTTP API on the
/// configured listen address, and joins every loop on graceful shutdown.
pub async fn run(
    config: WorkerConfig,
    data_dir: &std::path::Path,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
) -> shared::Result<()> {
    config.validate()?;

    let runtime = build_runtime()?;
    let state = Arc::new(match config.dbtype {
        DbType::Memory => WorkerState::for_memory(config.name.clone(), runtime),
        DbType::Persistent => WorkerState::for_sqlite(config.name.clone(), data_dir, runtime)?,
    });

    let host_stats = stats::host_stats(data_dir);

    let execution_handle = tokio::spawn(execution::run(
        Arc::clone(&state),
        config.execution_interval_seconds,
        shutdown_tx.subscribe(),
    ));
    let status_handle = tokio::spawn(status::run(
        Arc::clone(&state),
        config.status_interval_seconds,
        shutdown_tx.subscribe(),
    ));
    let stats_handle = tokio::spawn(stats_loop::run(
        Arc::clone(&state),
        host_stats,
        config.stats_interval_seconds,
        shutdown_tx.subscribe(),
    ));

    let listen_address: std::net::SocketAddr = config.listen_address.parse()?;
    let listener = tokio::net::TcpListener::bind(listen_address).await?;
    info!(address = %listen_address, name = %state.name, "worker HTTP API listening");

    let router = api::create_router(Arc::clone(&state));
    let mut shutdown_rx = shutdown_tx.subscribe();
    let shutdown_signal = async move {
        let _ = shutdown_rx.recv().await;
        info!("worker HTTP server received shutdown signal");
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    let shutdown_timeout = Duration::from_secs(config.graceful_shutdown_timeout_seconds);
    for (name, handle) in [
        ("execution", execution_handle),
        ("status", status_handle),
        ("stats", stats_handle),
    ] {
        if tokio::time::timeout(shutdown_timeout, handle).await.is_err() {
            tracing::warn!(loop_name = name, "timed out waiting for loop to exit");
        }
    }

    Ok(())
}
