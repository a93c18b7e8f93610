/// Tracing subscriber bootstrap shared by the binary and the test helpers
use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Environment variable consulted before RUST_LOG
pub const LOG_ENV: &str = "TAXODB_LOG";

/// Build the filter: TAXODB_LOG wins, then RUST_LOG, then the configured level
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(directives) = std::env::var(LOG_ENV) {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the global subscriber. Returns false when one was already set.
pub fn init(config: &LoggingConfig) -> bool {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(config));
    if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

/// Subscriber for tests: captured by the harness, repeat calls are no-ops
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
