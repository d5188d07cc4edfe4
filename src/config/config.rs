// SPDX-License-Identifier: GPL-3.0-only
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database path for the local document store
    pub store_db_path: PathBuf,

    /// Base URL of the remote backup endpoint
    pub backup_api_url: String,

    /// Optional bearer token for the backup endpoint
    pub backup_api_key: Option<String>,

    /// Timeout for a single backup request in seconds
    pub backup_timeout_secs: u64,

    /// Local API bind address (e.g., "127.0.0.1:8080")
    pub local_api_bind: SocketAddr,

    /// Automatic sync interval in seconds
    pub sync_interval_secs: u64,

    /// Arm automatic sync on startup
    pub auto_sync_enabled: bool,

    /// Directory for exported snapshot files
    pub export_dir: PathBuf,

    /// File name prefix for exported snapshots
    pub export_file_prefix: String,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text
    pub log_json: bool,
}

impl Config {
    /// Load configuration from TOML file with environment variable overrides
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load configuration reading variables through `env` instead of the process environment
    pub fn load_with<F>(env: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_path = env("GARAGE_CONFIG").unwrap_or_else(|| "config.toml".to_string());

        let mut config: Config = if std::path::Path::new(&config_path).exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            toml::from_str(&contents)?
        } else {
            // Use default configuration
            Config::default()
        };

        // Apply environment variable overrides
        if let Some(val) = env("GARAGE_STORE_DB_PATH") {
            config.store_db_path = PathBuf::from(val);
        }
        if let Some(val) = env("GARAGE_BACKUP_API_URL") {
            config.backup_api_url = val;
        }
        if let Some(val) = env("GARAGE_BACKUP_API_KEY") {
            config.backup_api_key = Some(val);
        }
        if let Some(val) = env("GARAGE_BACKUP_TIMEOUT_SECS") {
            config.backup_timeout_secs = val.parse()?;
        }
        if let Some(val) = env("GARAGE_LOCAL_API_BIND") {
            config.local_api_bind = SocketAddr::from_str(&val)?;
        }
        if let Some(val) = env("GARAGE_SYNC_INTERVAL_SECS") {
            config.sync_interval_secs = val.parse()?;
        }
        if let Some(val) = env("GARAGE_AUTO_SYNC_ENABLED") {
            config.auto_sync_enabled = val.parse()?;
        }
        if let Some(val) = env("GARAGE_EXPORT_DIR") {
            config.export_dir = PathBuf::from(val);
        }
        if let Some(val) = env("GARAGE_EXPORT_FILE_PREFIX") {
            config.export_file_prefix = val;
        }
        if let Some(val) = env("GARAGE_LOG_LEVEL") {
            config.log_level = val;
        }
        if let Some(val) = env("GARAGE_LOG_JSON") {
            config.log_json = val.parse()?;
        }

        if config.sync_interval_secs == 0 {
            return Err(anyhow::anyhow!("sync_interval_secs must be greater than zero"));
        }

        Ok(config)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn backup_timeout(&self) -> Duration {
        Duration::from_secs(self.backup_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_db_path: PathBuf::from("garage.db"),
            backup_api_url: String::from("http://localhost:3000/api"),
            backup_api_key: None,
            backup_timeout_secs: 30,
            local_api_bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            sync_interval_secs: 300, // 5 minutes
            auto_sync_enabled: false,
            export_dir: PathBuf::from("exports"),
            export_file_prefix: String::from("garage-backup"),
            log_level: String::from("info"),
            log_json: false,
        }
    }
}
