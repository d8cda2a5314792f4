//! Configuration types shared by the manager and worker binaries.
//!
//! Each process loads an optional TOML file and applies CLI overrides on
//! top via a small `ConfigManager` type per binary.

use serde::{Deserialize, Serialize};

fn default_dispatch_interval() -> u64 {
    10
}
fn default_poll_interval() -> u64 {
    15
}
fn default_health_check_interval() -> u64 {
    60
}
fn default_max_restart_count() -> u32 {
    3
}
fn default_execution_interval() -> u64 {
    10
}
fn default_status_interval() -> u64 {
    15
}
fn default_stats_interval() -> u64 {
    15
}
fn default_graceful_shutdown_timeout() -> u64 {
    30
}
fn default_manager_listen_address() -> String {
    "0.0.0.0:8099".to_string()
}
fn default_worker_listen_address() -> String {
    "0.0.0.0:8089".to_string()
}
fn default_request_timeout() -> u64 {
    30
}

/// Storage backend selection. `Memory` uses `InMemoryStore`; `Persistent`
/// uses `SqliteStore` against `tasks.db`/`events.db` in the working directory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    #[default]
    Memory,
    Persistent,
}

/// Scheduler policy selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    #[default]
    RoundRobin,
    Epvm,
}

/// `manager.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagerConfig {
    #[serde(default = "default_manager_listen_address")]
    pub listen_address: String,
    /// Static set of worker `host:port` entries.
    #[serde(default)]
    pub workers: Vec<String>,
    #[serde(default)]
    pub scheduler: SchedulerKind,
    #[serde(default)]
    pub dbtype: DbType,
    #[serde(default = "default_dispatch_interval")]
    pub dispatch_interval_seconds: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_seconds: u64,
    #[serde(default = "default_max_restart_count")]
    pub max_restart_count: u32,
    #[serde(default = "default_graceful_shutdown_timeout")]
    pub graceful_shutdown_timeout_seconds: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_manager_listen_address(),
            workers: Vec::new(),
            scheduler: SchedulerKind::default(),
            dbtype: DbType::default(),
            dispatch_interval_seconds: default_dispatch_interval(),
            poll_interval_seconds: default_poll_interval(),
            health_check_interval_seconds: default_health_check_interval(),
            max_restart_count: default_max_restart_count(),
            graceful_shutdown_timeout_seconds: default_graceful_shutdown_timeout(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.listen_address.is_empty() {
            return Err(crate::OrchestratorError::Validation(
                "listen_address cannot be empty".to_string(),
            )
            .into());
        }
        if self.workers.is_empty() {
            return Err(crate::OrchestratorError::Validation(
                "at least one worker must be configured".to_string(),
            )
            .into());
        }
        if self.dispatch_interval_seconds == 0
            || self.poll_interval_seconds == 0
            || self.health_check_interval_seconds == 0
        {
            return Err(crate::OrchestratorError::Validation(
                "loop intervals must be greater than zero".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

/// `worker.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_listen_address")]
    pub listen_address: String,
    pub name: String,
    #[serde(default)]
    pub dbtype: DbType,
    #[serde(default = "default_execution_interval")]
    pub execution_interval_seconds: u64,
    #[serde(default = "default_status_interval")]
    pub status_interval_seconds: u64,
    #[serde(default = "default_stats_interval")]
    pub stats_interval_seconds: u64,
    #[serde(default = "default_graceful_shutdown_timeout")]
    pub graceful_shutdown_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_worker_listen_address(),
            name: String::new(),
            dbtype: DbType::default(),
            execution_interval_seconds: default_execution_interval(),
            status_interval_seconds: default_status_interval(),
            stats_interval_seconds: default_stats_interval(),
            graceful_shutdown_timeout_seconds: default_graceful_shutdown_timeout(),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.is_empty() {
            return Err(
                crate::OrchestratorError::Validation("name cannot be empty".to_string()).into(),
            );
        }
        if self.execution_interval_seconds == 0
            || self.status_interval_seconds == 0
            || self.stats_interval_seconds == 0
        {
            return Err(crate::OrchestratorError::Validation(
                "loop intervals must be greater than zero".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_config_defaults_are_sane() {
        let mut config = ManagerConfig::default();
        config.workers.push("127.0.0.1:8089".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn manager_config_requires_at_least_one_worker() {
        let config = ManagerConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn worker_config_requires_a_name() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn db_type_wire_form_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&DbType::Persistent).unwrap(),
            "\"persistent\""
        );
    }
}
