//! `orchestrator`: one binary, five subcommands: `manager`, `worker`,
//! `node`, `status`, `stop`.

#[global_allocator]
#[cfg(not(target_os = "windows"))]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::api::{endpoints, ListNodesResponse, ListTasksResponse};
use shared::config::{DbType, SchedulerKind};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "orchestrator", about = "Minimal container task orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the control plane.
    Manager(ManagerArgs),
    /// Run a worker node.
    Worker(WorkerArgs),
    /// List the nodes known to a manager.
    Node(RemoteArgs),
    /// List the tasks known to a manager.
    Status(RemoteArgs),
    /// Stop a task by id.
    Stop(StopArgs),
}

#[derive(clap::Args, Debug)]
struct ManagerArgs {
    /// Path to an optional manager.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long = "host", short = 'H')]
    host: Option<String>,
    #[arg(long, short = 'p')]
    port: Option<u16>,
    #[arg(long, short = 'w', value_delimiter = ',')]
    workers: Option<Vec<String>>,
    #[arg(long, short = 's')]
    scheduler: Option<String>,
    #[arg(long, short = 'd')]
    dbtype: Option<String>,
}

#[derive(clap::Args, Debug)]
struct WorkerArgs {
    /// Path to an optional worker.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long = "host", short = 'H')]
    host: Option<String>,
    #[arg(long, short = 'p')]
    port: Option<u16>,
    #[arg(long, short = 'n')]
    name: Option<String>,
    #[arg(long, short = 'd')]
    dbtype: Option<String>,
}

#[derive(clap::Args, Debug)]
struct RemoteArgs {
    #[arg(long, short = 'm', default_value = "0.0.0.0:8099")]
    manager: String,
}

#[derive(clap::Args, Debug)]
struct StopArgs {
    #[arg(long, short = 'm', default_value = "0.0.0.0:8099")]
    manager: String,
    task_id: String,
}

fn init_tracing(log_dir: &str, file_prefix: &str) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(non_blocking)
        .init();

    guard
}

fn parse_scheduler(value: &str) -> Result<SchedulerKind> {
    match value.to_lowercase().as_str() {
        "roundrobin" | "round-robin" => Ok(SchedulerKind::RoundRobin),
        "epvm" => Ok(SchedulerKind::Epvm),
        other => anyhow::bail!("unknown scheduler: {other}"),
    }
}

fn parse_dbtype(value: &str) -> Result<DbType> {
    match value.to_lowercase().as_str() {
        "memory" => Ok(DbType::Memory),
        "persistent" => Ok(DbType::Persistent),
        other => anyhow::bail!("unknown dbtype: {other}"),
    }
}

async fn setup_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl+C");
    }
}

async fn run_manager(args: ManagerArgs) -> Result<()> {
    let _guard = init_tracing("./logs", "manager.log");

    let mut config_manager = manager::config::ConfigManager::new(args.config.clone())?;
    let listen_address = match (args.host, args.port) {
        (Some(host), Some(port)) => Some(format!("{host}:{port}")),
        (Some(host), None) => Some(format!("{host}:8099")),
        (None, Some(port)) => Some(format!("0.0.0.0:{port}")),
        (None, None) => None,
    };
    let scheduler = args.scheduler.as_deref().map(parse_scheduler).transpose()?;
    let dbtype = args.dbtype.as_deref().map(parse_dbtype).transpose()?;

    let changed = config_manager.override_with_cli(listen_address, args.workers, scheduler, dbtype);
    if changed {
        info!("command-line overrides applied to manager configuration");
    }

    let data_dir = args
        .config
        .as_ref()
        .and_then(|p| p.parent())
        .map(|p| p.join("data"))
        .unwrap_or_else(|| PathBuf::from("./data"));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let shutdown_tx_for_server = shutdown_tx.clone();

    tokio::select! {
        result = manager::run(config_manager.config, &data_dir, shutdown_tx_for_server) => {
            if let Err(e) = result {
                error!("manager exited with error: {e}");
                std::process::exit(1);
            }
        }
        _ = setup_shutdown_signal() => {
            let _ = shutdown_tx.send(());
        }
    }

    Ok(())
}

async fn run_worker(args: WorkerArgs) -> Result<()> {
    let _guard = init_tracing("./logs", "worker.log");

    let mut config_manager = worker::config::ConfigManager::new(args.config.clone())?;
    let listen_address = match (args.host, args.port) {
        (Some(host), Some(port)) => Some(format!("{host}:{port}")),
        (Some(host), None) => Some(format!("{host}:8089")),
        (None, Some(port)) => Some(format!("0.0.0.0:{port}")),
        (None, None) => None,
    };
    let dbtype = args.dbtype.as_deref().map(parse_dbtype).transpose()?;

    let changed = config_manager.override_with_cli(listen_address, args.name, dbtype);
    if changed {
        info!("command-line overrides applied to worker configuration");
    }

    let data_dir = args
        .config
        .as_ref()
        .and_then(|p| p.parent())
        .map(|p| p.join("data"))
        .unwrap_or_else(|| PathBuf::from("./data"));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let shutdown_tx_for_server = shutdown_tx.clone();

    tokio::select! {
        result = worker::run(config_manager.config, &data_dir, shutdown_tx_for_server) => {
            if let Err(e) = result {
                error!("worker exited with error: {e}");
                std::process::exit(1);
            }
        }
        _ = setup_shutdown_signal() => {
            let _ = shutdown_tx.send(());
        }
    }

    Ok(())
}

async fn run_node(args: RemoteArgs) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let url = format!("http://{}{}", args.manager, endpoints::NODES);
    let response: ListNodesResponse = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("failed to reach manager at {url}"))?
        .error_for_status()?
        .json()
        .await?;

    println!("{:<24}{:<16}{:<12}{:<10}TASKS", "NAME", "MEMORY (MiB)", "DISK (GiB)", "ROLE");
    for node in response.nodes {
        println!(
            "{:<24}{:<16}{:<12}{:<10}{}",
            node.name,
            node.memory / 1_000_000,
            node.disk / 1_000_000_000,
            node.role,
            node.task_count,
        );
    }

    Ok(())
}

async fn run_status(args: RemoteArgs) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let url = format!("http://{}{}", args.manager, endpoints::TASKS);
    let response: ListTasksResponse = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("failed to reach manager at {url}"))?
        .error_for_status()?
        .json()
        .await?;

    println!(
        "{:<38}{:<16}{:<24}{:<12}{:<20}IMAGE",
        "ID", "NAME", "CREATED", "STATE", "CONTAINERNAME"
    );
    for task in response.tasks {
        let created = task
            .start_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38}{:<16}{:<24}{:<12}{:<20}{}",
            task.id,
            task.name,
            created,
            format!("{:?}", task.state),
            task.container_id.unwrap_or_else(|| "-".to_string()),
            task.image,
        );
    }

    Ok(())
}

async fn run_stop(args: StopArgs) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let url = format!("http://{}{}/{}", args.manager, endpoints::TASKS, args.task_id);
    let response = client
        .delete(&url)
        .send()
        .await
        .with_context(|| format!("failed to reach manager at {url}"))?;

    if response.status().as_u16() == 204 {
        println!("task {} stopped", args.task_id);
        Ok(())
    } else {
        anyhow::bail!("manager returned {}: {}", response.status(), response.text().await.unwrap_or_default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Manager(args) => run_manager(args).await,
        Command::Worker(args) => run_worker(args).await,
        Command::Node(args) => run_node(args).await,
        Command::Status(args) => run_status(args).await,
        Command::Stop(args) => run_stop(args).await,
    }
}
