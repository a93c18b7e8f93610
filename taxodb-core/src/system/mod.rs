pub mod paths;

// Re-export commonly used functions
pub use paths::{describe_paths, taxodb_config_path, taxodb_data_dir, taxodb_home};
