//! Configuration types for taxodb

use crate::TaxoError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Address the connection server listens on
    #[serde(default = "default_address")]
    pub address: String,
    /// Accept write requests from non-loopback peers
    #[serde(default)]
    pub allow_remote_writes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorageConfig {
    /// Directory holding the table files (defaults to $TAXODB_HOME/data)
    #[serde(default)]
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit one JSON object per event instead of the human format
    #[serde(default)]
    pub json: bool,
}

// Default value functions
fn default_address() -> String { "127.0.0.1:16500".to_string() }
fn default_level() -> String { "info".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            allow_remote_writes: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

impl StorageConfig {
    /// Resolved data directory
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => PathBuf::from(dir),
            None => crate::system::taxodb_data_dir(),
        }
    }
}

impl Config {
    /// Load the configuration from $TAXODB_CONFIG or $TAXODB_HOME/config.toml,
    /// falling back to defaults when neither file exists
    pub fn load_or_default() -> Result<Self, TaxoError> {
        let path = crate::system::taxodb_config_path();
        if path.exists() {
            load_config(&path)
        } else {
            Ok(Config::default())
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, TaxoError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| TaxoError::Configuration(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<(), TaxoError> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| TaxoError::Configuration(format!("Failed to serialize config: {}", e)))?;
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}
