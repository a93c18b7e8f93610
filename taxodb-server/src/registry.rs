//! Named provider constructors
//!
//! Drivers are registered explicitly when the registry is built; nothing
//! registers itself behind the caller's back.

use crate::client::Client;
use crate::provider::TaxonomyProvider;
use std::collections::BTreeMap;
use taxodb_core::{TaxoError, TaxoResult};
use taxodb_storage::Database;

/// Builds a provider from a driver-specific parameter (an address, a
/// directory, ...)
pub type DriverFn = fn(&str) -> TaxoResult<Box<dyn TaxonomyProvider>>;

#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, DriverFn>,
}

fn open_remote(address: &str) -> TaxoResult<Box<dyn TaxonomyProvider>> {
    if address.trim().is_empty() {
        return Err(TaxoError::Configuration("taxodb driver needs an address".to_string()));
    }
    Ok(Box::new(Client::new(address.trim())))
}

fn open_local(dir: &str) -> TaxoResult<Box<dyn TaxonomyProvider>> {
    if dir.trim().is_empty() {
        return Err(TaxoError::Configuration("local driver needs a data directory".to_string()));
    }
    Ok(Box::new(Database::open(dir.trim())?))
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in drivers: `taxodb` (a remote server) and
    /// `local` (a data directory opened in process)
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("taxodb", open_remote);
        registry.register("local", open_local);
        registry
    }

    /// Register a driver, replacing any previous one of the same name
    pub fn register(&mut self, name: impl Into<String>, driver: DriverFn) {
        self.drivers.insert(name.into(), driver);
    }

    pub fn names(&self) -> Vec<&str> {
        self.drivers.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    pub fn open(&self, name: &str, param: &str) -> TaxoResult<Box<dyn TaxonomyProvider>> {
        let driver = self
            .drivers
            .get(name)
            .ok_or_else(|| TaxoError::NotFound(format!("driver {}", name)))?;
        driver(param)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_drivers() {
        let registry = DriverRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["local", "taxodb"]);
        assert!(registry.contains("taxodb"));
        assert!(!DriverRegistry::new().contains("taxodb"));
    }

    #[test]
    fn test_unknown_driver() {
        let registry = DriverRegistry::with_defaults();
        let err = registry.open("gbif", "").err().unwrap();
        assert!(matches!(err, TaxoError::NotFound(ref m) if m == "driver gbif"));
    }

    #[test]
    fn test_open_drivers() {
        let registry = DriverRegistry::with_defaults();
        assert!(registry.open("taxodb", "127.0.0.1:16500").is_ok());
        assert!(registry.open("taxodb", " ").is_err());

        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        assert!(registry.open("local", &data.to_string_lossy()).is_ok());
        assert!(data.is_dir());
    }

    #[test]
    fn test_register_custom_driver() {
        fn refuse(_: &str) -> TaxoResult<Box<dyn TaxonomyProvider>> {
            Err(TaxoError::Forbidden)
        }
        let mut registry = DriverRegistry::new();
        registry.register("ncbi", refuse);
        assert!(matches!(registry.open("ncbi", ""), Err(TaxoError::Forbidden)));
    }
}
