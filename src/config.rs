use crate::accounting::ResetPolicy;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// URLs of the three dumps a gateway serves. An empty URL disables that signal.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterConfig {
    #[serde(default)]
    pub ap_stats: String,
    #[serde(default)]
    pub wan_stats: String,
    #[serde(default)]
    pub dhcp_leases: String,
}

pub type RouterTable = BTreeMap<String, RouterConfig>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    pub data_dir: String,
    pub log_dir: String,
    pub poll_interval_seconds: u64,
    pub fetch_timeout_seconds: u64,
    pub reset_policy: ResetPolicy,
    /// Legacy `routers.json`, re-read at the start of every cycle.
    pub routers_file: Option<String>,
    pub routers: RouterTable,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialCollectorConfig {
    data_dir: Option<String>,
    log_dir: Option<String>,
    poll_interval_seconds: Option<u64>,
    fetch_timeout_seconds: Option<u64>,
    reset_policy: Option<ResetPolicy>,
    routers_file: Option<String>,
    #[serde(default)]
    routers: Option<RouterTable>,
}

const ENV_PREFIX: &str = "NETSTAT_";

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 30 * 60;
const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 10;

impl CollectorConfig {
    /// Loads the optional TOML file, then lets `NETSTAT_*` environment
    /// variables override it.
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        let file_config: PartialCollectorConfig = match config_path {
            Some(path_str) => {
                let path = Path::new(path_str);
                if path.exists() {
                    let contents = fs::read_to_string(path)
                        .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
                    toml::from_str(&contents).map_err(|e| {
                        format!("Failed to parse TOML from config file at {path:?}: {e}")
                    })?
                } else {
                    PartialCollectorConfig::default()
                }
            }
            None => PartialCollectorConfig::default(),
        };

        let env_config: PartialCollectorConfig = envy::prefixed(ENV_PREFIX)
            .from_env::<PartialCollectorConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        Self::merge(file_config, env_config)
    }

    fn merge(
        file_config: PartialCollectorConfig,
        env_config: PartialCollectorConfig,
    ) -> Result<Self, String> {
        let poll_interval_seconds = env_config
            .poll_interval_seconds
            .or(file_config.poll_interval_seconds)
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS);
        if poll_interval_seconds == 0 {
            return Err("poll_interval_seconds must be greater than zero".to_string());
        }

        let fetch_timeout_seconds = env_config
            .fetch_timeout_seconds
            .or(file_config.fetch_timeout_seconds)
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECONDS);
        if fetch_timeout_seconds == 0 {
            return Err("fetch_timeout_seconds must be greater than zero".to_string());
        }

        Ok(CollectorConfig {
            data_dir: env_config
                .data_dir
                .or(file_config.data_dir)
                .unwrap_or_else(default_data_dir),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            poll_interval_seconds,
            fetch_timeout_seconds,
            reset_policy: env_config
                .reset_policy
                .or(file_config.reset_policy)
                .unwrap_or_default(),
            routers_file: env_config.routers_file.or(file_config.routers_file),
            routers: file_config.routers.unwrap_or_default(),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn stats_db_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("network_stats.duckdb")
    }

    pub fn leases_db_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("dhcp_leases.duckdb")
    }

    /// Current router table: the routers file (if any) overlaid with the
    /// inline `[routers.*]` entries. A configured but unreadable routers file
    /// is an error.
    pub fn load_routers(&self) -> Result<RouterTable, String> {
        let mut routers = match &self.routers_file {
            Some(path) => load_routers_file(Path::new(path))?,
            None => RouterTable::new(),
        };
        routers.extend(self.routers.iter().map(|(name, r)| (name.clone(), r.clone())));
        Ok(routers)
    }
}

fn load_routers_file(path: &Path) -> Result<RouterTable, String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read routers file at {path:?}: {e}"))?;
    serde_json::from_str(&contents)
        .map_err(|e| format!("Invalid JSON format in routers file at {path:?}: {e}"))
}
