//! Application configuration
//!
//! Layered with figment: built-in defaults, then the config file (JSON or
//! YAML by extension), then `GATEWAY_` environment variables
//! (`GATEWAY_SERVER__ADDRESS=0.0.0.0:9000`).

use figment::{
    providers::{Env, Format, Json, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{GatewayError, Result};

pub const ENV_PREFIX: &str = "GATEWAY_";
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:8888";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub debug: bool,
    pub server: ServerConfig,
    pub log: LogSettings,
    pub data_point_config: DataPointConfigPath,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub path: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            path: PathBuf::from("logs"),
        }
    }
}

/// Directory holding `PORTConfig.json`, `DEVConfig.json` and `VARConfig*.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPointConfigPath {
    pub path: PathBuf,
}

impl Default for DataPointConfigPath {
    fn default() -> Self {
        Self {
            path: PathBuf::from("config"),
        }
    }
}

/// Accept `":8888"` as shorthand for all interfaces
pub fn normalize_address(address: &str) -> String {
    match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => address.to_string(),
    }
}

impl AppConfig {
    /// Load defaults, the file at `path` if present, then the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        if path.exists() {
            let is_json = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            figment = if is_json {
                figment.merge(Json::file(path))
            } else {
                figment.merge(Yaml::file(path))
            };
        } else {
            warn!(path = %path.display(), "Config file not found, using defaults");
        }

        let mut config: AppConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| GatewayError::config(format!("{}: {e}", path.display())))?;
        config.server.address = normalize_address(&config.server.address);
        Ok(config)
    }

    /// Effective log level; `debug: true` forces debug
    pub fn log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log.level
        }
    }
}
