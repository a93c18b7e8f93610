use std::path::PathBuf;
use std::sync::OnceLock;

// Cache the paths to avoid repeated environment lookups
static TAXODB_HOME: OnceLock<PathBuf> = OnceLock::new();
static TAXODB_DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Get the taxodb home directory
/// Checks TAXODB_HOME environment variable, falls back to ${HOME}/.taxodb
pub fn taxodb_home() -> PathBuf {
    TAXODB_HOME
        .get_or_init(|| {
            if let Ok(path) = std::env::var("TAXODB_HOME") {
                PathBuf::from(path)
            } else {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".taxodb")
            }
        })
        .clone()
}

/// Get the directory holding the table files
/// Checks TAXODB_DATA_DIR environment variable, falls back to TAXODB_HOME/data
pub fn taxodb_data_dir() -> PathBuf {
    TAXODB_DATA_DIR
        .get_or_init(|| {
            if let Ok(path) = std::env::var("TAXODB_DATA_DIR") {
                PathBuf::from(path)
            } else {
                taxodb_home().join("data")
            }
        })
        .clone()
}

/// Configuration file location
/// Not cached: TAXODB_CONFIG may point somewhere different per invocation
pub fn taxodb_config_path() -> PathBuf {
    match std::env::var("TAXODB_CONFIG") {
        Ok(path) => PathBuf::from(path),
        Err(_) => taxodb_home().join("config.toml"),
    }
}

/// Get a human-readable description of the current path configuration
pub fn describe_paths() -> String {
    format!(
        "taxodb paths:\n  \
        Home: {}\n  \
        Data: {}\n  \
        Config: {}",
        taxodb_home().display(),
        taxodb_data_dir().display(),
        taxodb_config_path().display(),
    )
}
