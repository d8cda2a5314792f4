//! Configuration loading for the manager: an optional `manager.toml`, with
//! CLI flags layered on top.

use shared::config::ManagerConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct ConfigManager {
    pub config_path: Option<PathBuf>,
    pub config: ManagerConfig,
}

impl ConfigManager {
    /// Loads `path` if given and it exists; otherwise starts from defaults.
    /// Either way the result is fully populated, never partially loaded.
    pub fn new(path: Option<PathBuf>) -> shared::Result<Self> {
        let config = match &path {
            Some(p) if p.exists() => Self::load_from(p)?,
            Some(p) => {
                info!(path = %p.display(), "manager config file not found, starting from defaults");
                ManagerConfig::default()
            }
            None => ManagerConfig::default(),
        };

        Ok(Self {
            config_path: path,
            config,
        })
    }

    fn load_from(path: &Path) -> shared::Result<ManagerConfig> {
        info!(path = %path.display(), "loading manager configuration");
        let content = std::fs::read_to_string(path)?;
        let config: ManagerConfig = toml::from_str(&content)?;
        debug!(?config, "manager configuration loaded");
        Ok(config)
    }

    /// Applies CLI overrides on top of the loaded config. Only `Some` fields
    /// are applied; CLI flags always win over the file per the configuration
    /// design. Returns whether anything actually changed.
    #[allow(clippy::too_many_arguments)]
    pub fn override_with_cli(
        &mut self,
        listen_address: Option<String>,
        workers: Option<Vec<String>>,
        scheduler: Option<shared::config::SchedulerKind>,
        dbtype: Option<shared::config::DbType>,
    ) -> bool {
        let mut changed = false;
        if let Some(listen_address) = listen_address {
            if self.config.listen_address != listen_address {
                self.config.listen_address = listen_address;
                changed = true;
            }
        }
        if let Some(workers) = workers {
            if self.config.workers != workers {
                self.config.workers = workers;
                changed = true;
            }
        }
        if let Some(scheduler) = scheduler {
            if self.config.scheduler != scheduler {
                self.config.scheduler = scheduler;
                changed = true;
            }
        }
        if let Some(dbtype) = dbtype {
            if self.config.dbtype != dbtype {
                self.config.dbtype = dbtype;
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let manager = ConfigManager::new(Some(PathBuf::from("/nonexistent/manager.toml"))).unwrap();
        assert_eq!(manager.config.listen_address, "0.0.0.0:8099");
    }

    #[test]
    fn cli_overrides_win_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen_address = \"127.0.0.1:9000\"\nworkers = [\"a:1\"]").unwrap();
        let mut manager = ConfigManager::new(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(manager.config.listen_address, "127.0.0.1:9000");

        let changed = manager.override_with_cli(Some("127.0.0.1:9999".to_string()), None, None, None);
        assert!(changed);
        assert_eq!(manager.config.listen_address, "127.0.0.1:9999");
    }
}
