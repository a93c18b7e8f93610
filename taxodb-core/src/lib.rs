//! Core utilities and types shared across all taxodb crates

pub mod config;
pub mod error;
pub mod logging;
pub mod system;
pub mod types;

// Re-export commonly used types
pub use config::{load_config, save_config, Config};
pub use error::{TaxoError, TaxoResult};

pub use types::{ExternId, KeyValue, Rank, Table};

pub use system::{taxodb_config_path, taxodb_data_dir, taxodb_home};

/// Version information for the taxodb project
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
