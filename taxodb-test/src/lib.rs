//! Test utilities for the taxodb workspace
//!
//! Common helpers shared by the integration tests of every crate:
//!
//! - **Test Environment**: isolated data directories with automatic cleanup
//! - **Fixtures**: a small sample taxonomy with dependent records
//! - **Assertions**: structural checks over a loaded taxonomy

pub mod assertions;
pub mod environment;
pub mod fixtures;

// Re-export commonly used items
pub use assertions::assert_taxonomy_consistent;
pub use environment::{TestConfig, TestEnvironment};
pub use fixtures::{kv, SampleTaxa};

// Re-export test dependencies for convenience
pub use anyhow::{Context, Result};
pub use tempfile;

/// Initialize test logging (repeat calls are no-ops)
pub fn init_test_logging() {
    taxodb_core::logging::init_for_tests();
}

/// Run a test with a clean environment
///
/// # Example
/// ```rust
/// use taxodb_test::with_test_env;
///
/// with_test_env(|env| {
///     let db = env.open_database()?;
///     assert_eq!(db.with_stores(|s| s.taxonomy.len()), 0);
///     Ok(())
/// })
/// .unwrap();
/// ```
pub fn with_test_env<F, R>(f: F) -> Result<R>
where
    F: FnOnce(&TestEnvironment) -> Result<R>,
{
    let env = TestEnvironment::new()?;
    f(&env)
}
