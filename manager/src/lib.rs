//! Manager core: the control plane's intake, dispatch, poll, and
//! health-check loops, the scheduler abstraction, and the bookkeeping that
//! ties tasks to the worker nodes they are assigned to.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod poll;
pub mod scheduler;
pub mod state;

use scheduler::{Epvm, RoundRobin, Scheduler};
use shared::config::{DbType, ManagerConfig, SchedulerKind};
use shared::Node;
use state::ManagerState;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub fn build_scheduler(kind: SchedulerKind) -> Box<dyn Scheduler> {
    match kind {
        SchedulerKind::RoundRobin => Box::new(RoundRobin::new()),
        SchedulerKind::Epvm => Box::new(Epvm::new()),
    }
}

pub fn build_nodes(config: &ManagerConfig) -> Vec<Node> {
    config
        .workers
        .iter()
        .map(|worker| Node::new(worker.clone(), format!("http://{worker}")))
        .collect()
}

/// Runs the manager until `shutdown_tx` fires. Spawns the dispatch, poll,
/// and health-check loops as background tasks, serves the HTTP API on the
/// configured listen address, and joins every loop on graceful shutdown.
pub async fn run(
    config: ManagerConfig,
    data_dir: &std::path::Path,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
) -> shared::Result<()> {
    config.validate()?;

    let nodes = build_nodes(&config);
    let scheduler = build_scheduler(config.scheduler);

    let state = Arc::new(match config.dbtype {
        DbType::Memory => ManagerState::for_memory(nodes, scheduler),
        DbType::Persistent => ManagerState::for_sqlite(data_dir, nodes, scheduler)?,
    });

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_seconds))
        .build()?;

    let dispatch_handle = tokio::spawn(dispatch::run(
        Arc::clone(&state),
        http.clone(),
        config.dispatch_interval_seconds,
        shutdown_tx.subscribe(),
    ));
    let poll_handle = tokio::spawn(poll::run(
        Arc::clone(&state),
        http.clone(),
        config.poll_interval_seconds,
        shutdown_tx.subscribe(),
    ));
    let health_handle = tokio::spawn(health::run(
        Arc::clone(&state),
        http.clone(),
        config.health_check_interval_seconds,
        config.max_restart_count,
        shutdown_tx.subscribe(),
    ));

    let listen_address: std::net::SocketAddr = config.listen_address.parse()?;
    let listener = tokio::net::TcpListener::bind(listen_address).await?;
    info!(address = %listen_address, "manager HTTP API listening");

    let router = api::create_router(Arc::clone(&state));
    let mut shutdown_rx = shutdown_tx.subscribe();
    let shutdown_signal = async move {
        let _ = shutdown_rx.recv().await;
        info!("manager HTTP server received shutdown signal");
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    let shutdown_timeout = Duration::from_secs(config.graceful_shutdown_timeout_seconds);
    for (name, handle) in [
        ("dispatch", dispatch_handle),
        ("poll", poll_handle),
        ("health-check", health_handle),
    ] {
        if tokio::time::timeout(shutdown_timeout, handle).await.is_err() {
            tracing::warn!(loop_name = name, "timed out waiting for loop to exit");
        }
    }

    Ok(())
}
