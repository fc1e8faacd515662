use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use venuesync_common::Region;

use crate::module::osm::client::DEFAULT_OVERPASS_URL;
use crate::module::reconcile::SyncSettings;
use crate::module::reconcile::reconciler::DEFAULT_BATCH_SIZE;

/// Environment variable overriding the config file path
pub const CONFIG_PATH_ENV: &str = "VENUESYNC_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory holding candidates.json and catalog.json
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub overpass: OverpassConfig,

    /// Queried in this order on every run
    #[serde(default)]
    pub regions: Vec<Region>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u32,

    #[serde(default = "default_region_delay_secs")]
    pub region_delay_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub perform_initial_sync: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverpassConfig {
    #[serde(default = "default_overpass_url")]
    pub url: String,

    #[serde(default = "default_overpass_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_interval_hours() -> u32 {
    24
}

fn default_region_delay_secs() -> u64 {
    3
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_lock_ttl_secs() -> u64 {
    60 * 60
}

fn default_run_timeout_secs() -> u64 {
    30 * 60
}

fn default_true() -> bool {
    true
}

fn default_overpass_url() -> String {
    DEFAULT_OVERPASS_URL.to_string()
}

fn default_overpass_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("venuesync/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            sync: SyncConfig::default(),
            overpass: OverpassConfig::default(),
            regions: Vec::new(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            region_delay_secs: default_region_delay_secs(),
            batch_size: default_batch_size(),
            lock_ttl_secs: default_lock_ttl_secs(),
            run_timeout_secs: default_run_timeout_secs(),
            perform_initial_sync: default_true(),
        }
    }
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            url: default_overpass_url(),
            timeout_secs: default_overpass_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl BackendConfig {
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: BackendConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file {:?}", path))
    }

    /// Load from `$VENUESYNC_CONFIG` or `config.toml`; defaults when the file is absent
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    /// Runs before logging is initialized, so problems go to stderr
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            eprintln!("Config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (index, region) in self.regions.iter().enumerate() {
            if region.name.trim().is_empty() {
                anyhow::bail!("region #{} has an empty name", index);
            }
            region
                .bbox
                .validate()
                .map_err(|e| anyhow::anyhow!("region '{}': {}", region.name, e))?;
        }
        if self.sync.interval_hours == 0 {
            anyhow::bail!("sync.interval_hours must be at least 1");
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            region_delay: Duration::from_secs(self.sync.region_delay_secs),
            lease_ttl: chrono::Duration::seconds(self.sync.lock_ttl_secs as i64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = BackendConfig::from_toml("").unwrap();
        assert_eq!(config.server_address(), "0.0.0.0:8080");
        assert_eq!(config.sync.region_delay_secs, 3);
        assert_eq!(config.sync.batch_size, 10);
        assert_eq!(config.overpass.url, DEFAULT_OVERPASS_URL);
        assert!(config.regions.is_empty());
    }

    #[test]
    fn test_regions_keep_order() {
        let config = BackendConfig::from_toml(
            r#"
            data_dir = "/var/lib/venuesync"

            [sync]
            region_delay_secs = 5

            [[regions]]
            name = "Indre By"
            bbox = [55.670, 12.560, 55.690, 12.600]

            [[regions]]
            name = "Vesterbro"
            bbox = [55.660, 12.530, 55.675, 12.565]
            "#,
        )
        .unwrap();

        let names: Vec<&str> = config.regions.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Indre By", "Vesterbro"]);
        assert_eq!(config.regions[1].bbox.max_lon, 12.565);
        assert_eq!(config.sync_settings().region_delay, Duration::from_secs(5));
        // unspecified fields in a present table still default
        assert_eq!(config.sync.batch_size, 10);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BackendConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.regions.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = 9090\n[sync]\ninterval_hours = 6\n").unwrap();

        let config = BackendConfig::load_from(&path).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.sync.interval_hours, 6);

        std::fs::write(&path, "[sync]\ninterval_hours = 0\n").unwrap();
        assert!(BackendConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_invalid_region_rejected() {
        let err = BackendConfig::from_toml(
            r#"
            [[regions]]
            name = "Upside down"
            bbox = [55.690, 12.560, 55.670, 12.600]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Upside down"), "{err}");
    }
}
