//! Configuration loading for the worker: an optional `worker.toml`, with
//! CLI flags layered on top, mirroring `manager::config::ConfigManager`.

use shared::config::WorkerConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct ConfigManager {
    pub config_path: Option<PathBuf>,
    pub config: WorkerConfig,
}

impl ConfigManager {
    pub fn new(path: Option<PathBuf>) -> shared::Result<Self> {
        let config = match &path {
            Some(p) if p.exists() => Self::load_from(p)?,
            Some(p) => {
                info!(path = %p.display(), "worker config file not found, starting from defaults");
                WorkerConfig::default()
            }
            None => WorkerConfig::default(),
        };

        Ok(Self {
            config_path: path,
            config,
        })
    }

    fn load_from(path: &Path) -> shared::Result<WorkerConfig> {
        info!(path = %path.display(), "loading worker configuration");
        let content = std::fs::read_to_string(path)?;
        let config: WorkerConfig = toml::from_str(&content)?;
        debug!(?config, "worker configuration loaded");
        Ok(config)
    }

    /// Applies CLI overrides on top of the loaded config. Returns whether
    /// anything actually changed.
    pub fn override_with_cli(
        &mut self,
        listen_address: Option<String>,
        name: Option<String>,
        dbtype: Option<shared::config::DbType>,
    ) -> bool {
        let mut changed = false;
        if let Some(listen_address) = listen_address {
            if self.config.listen_address != listen_address {
                self.config.listen_address = listen_address;
                changed = true;
            }
        }
        if let Some(name) = name {
            if self.config.name != name {
                self.config.name = name;
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
        let worker = ConfigManager::new(Some(PathBuf::from("/nonexistent/worker.toml"))).unwrap();
        assert_eq!(worker.config.listen_address, "0.0.0.0:8089");
    }

    #[test]
    fn cli_overrides_win_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen_address = \"127.0.0.1:9100\"\nname = \"w1\"").unwrap();
        let mut worker = ConfigManager::new(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(worker.config.name, "w1");

        let changed = worker.override_with_cli(None, Some("w2".to_string()), None);
        assert!(changed);
        assert_eq!(worker.config.name, "w2");
    }
}
