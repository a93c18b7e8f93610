//! Core error types for taxodb

use thiserror::Error;

/// Main error type for taxodb operations
#[derive(Error, Debug)]
pub enum TaxoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("forbidden")]
    Forbidden,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for taxodb operations
pub type TaxoResult<T> = Result<T, TaxoError>;

impl From<serde_json::Error> for TaxoError {
    fn from(err: serde_json::Error) -> Self {
        TaxoError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for TaxoError {
    fn from(err: toml::de::Error) -> Self {
        TaxoError::Configuration(err.to_string())
    }
}

impl From<toml::ser::Error> for TaxoError {
    fn from(err: toml::ser::Error) -> Self {
        TaxoError::Configuration(err.to_string())
    }
}

impl From<anyhow::Error> for TaxoError {
    fn from(err: anyhow::Error) -> Self {
        TaxoError::Other(err.to_string())
    }
}
