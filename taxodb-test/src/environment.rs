//! Test environment management
//!
//! Provides isolated data directories with automatic cleanup using RAII.
//! Paths are handed to the code under test explicitly; the process
//! environment is never touched, so tests stay safe to run in parallel.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use taxodb_core::{Config, Table};
use taxodb_storage::Database;
use tempfile::TempDir;

/// Configuration for test environment
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Keep the directory after the test (for debugging)
    pub preserve: bool,
    /// Install the test tracing subscriber
    pub verbose: bool,
    /// Custom prefix for test directories
    pub prefix: Option<String>,
}

/// Isolated test environment with automatic cleanup
pub struct TestEnvironment {
    temp_dir: Option<TempDir>,
    root_path: PathBuf,
    config: TestConfig,
}

impl TestEnvironment {
    /// Create a new test environment with default config
    pub fn new() -> Result<Self> {
        Self::with_config(TestConfig::default())
    }

    /// Create a new test environment with custom config
    pub fn with_config(config: TestConfig) -> Result<Self> {
        let prefix = config.prefix.as_deref().unwrap_or("taxodb-test");
        let temp_dir =
            TempDir::with_prefix(prefix).context("Failed to create temporary directory")?;
        let root_path = temp_dir.path().to_path_buf();

        std::fs::create_dir_all(root_path.join("data"))?;

        if config.verbose {
            crate::init_test_logging();
        }

        Ok(Self {
            temp_dir: Some(temp_dir),
            root_path,
            config,
        })
    }

    /// Get the root path of the test environment
    pub fn root(&self) -> &Path {
        &self.root_path
    }

    /// Directory the table files live in
    pub fn data_dir(&self) -> PathBuf {
        self.root_path.join("data")
    }

    /// Path of a table file inside the data directory
    pub fn table_path(&self, table: Table) -> PathBuf {
        self.data_dir().join(table.file_name())
    }

    /// Configuration pointing at this environment, listening on an
    /// ephemeral loopback port
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.server.address = "127.0.0.1:0".to_string();
        config.storage.data_dir = Some(self.data_dir().to_string_lossy().into_owned());
        config
    }

    /// Open (or reopen) the database of this environment
    pub fn open_database(&self) -> Result<Database> {
        Database::open(self.data_dir()).context("Failed to open test database")
    }

    /// Write a file relative to the root
    pub fn write_file(&self, relative: impl AsRef<Path>, contents: &str) -> Result<PathBuf> {
        let path = self.root_path.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Read a file relative to the root
    pub fn read_file(&self, relative: impl AsRef<Path>) -> Result<String> {
        let path = self.root_path.join(relative);
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Non-empty lines of a table file; an absent file has none
    pub fn table_lines(&self, table: Table) -> Result<Vec<String>> {
        let path = self.table_path(table);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Keep the directory on disk after drop
    pub fn preserve(&mut self) {
        self.config.preserve = true;
    }
}

impl Drop for TestEnvironment {
    fn drop(&mut self) {
        if self.config.preserve {
            if let Some(temp_dir) = self.temp_dir.take() {
                let path = temp_dir.keep();
                eprintln!("Test environment preserved at: {}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_creation() {
        let env = TestEnvironment::new().unwrap();
        assert!(env.root().exists());
        assert!(env.data_dir().is_dir());
        assert!(env.root().to_string_lossy().contains("taxodb-test"));
    }

    #[test]
    fn test_environment_cleanup() {
        let root = {
            let env = TestEnvironment::new().unwrap();
            env.root().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[test]
    fn test_config_points_at_data_dir() {
        let env = TestEnvironment::new().unwrap();
        let config = env.config();
        assert_eq!(config.storage.data_dir(), env.data_dir());
        assert_eq!(config.server.address, "127.0.0.1:0");
    }

    #[test]
    fn test_file_operations() {
        let env = TestEnvironment::new().unwrap();
        env.write_file("data/taxonomy.jsonl", "{\"id\":\"1\"}\n\n").unwrap();
        assert_eq!(env.read_file("data/taxonomy.jsonl").unwrap(), "{\"id\":\"1\"}\n\n");
        assert_eq!(env.table_lines(Table::Taxonomy).unwrap().len(), 1);
        assert!(env.table_lines(Table::Nodes).unwrap().is_empty());
    }
}
