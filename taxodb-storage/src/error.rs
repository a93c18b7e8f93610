/// Validation and lookup failures raised by the stores
use taxodb_core::{Rank, TaxoError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{0} without name")]
    MissingName(&'static str),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("parent {0} not in database")]
    UnknownParent(String),

    #[error("taxon {0} not in database")]
    UnknownTaxon(String),

    #[error("dataset {0} not in database")]
    UnknownDataset(String),

    #[error("synonym {0} without a senior taxon")]
    SynonymWithoutParent(String),

    #[error("taxon {0} is a synonym and can not have children")]
    ParentIsSynonym(String),

    #[error("rank {rank} of {taxon} conflicts with {ancestor_rank} {ancestor}")]
    RankConflict {
        taxon: String,
        rank: Rank,
        ancestor: String,
        ancestor_rank: Rank,
    },

    #[error("{target} is part of the subtree of {id}")]
    Cycle { id: String, target: String },

    #[error("duplicated id: {0}")]
    DuplicateId(String),

    #[error("extern id {alias} already assigned to {owner}")]
    DuplicateExtern { alias: String, owner: String },

    #[error("age of node {node} ({age}) conflicts with node {other} ({other_age})")]
    AgeConflict {
        node: String,
        age: u64,
        other: String,
        other_age: u64,
    },

    #[error("{0}")]
    InvalidOperation(String),

    #[error("io: {0}")]
    Io(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        StoreError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<StoreError> for TaxoError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => TaxoError::NotFound(format!("{} {}", kind, id)),
            StoreError::DuplicateId(id) => TaxoError::AlreadyExists(id),
            StoreError::Io(msg) => TaxoError::Io(std::io::Error::other(msg)),
            other => TaxoError::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_conflict_message() {
        let err = StoreError::RankConflict {
            taxon: "Canidae".to_string(),
            rank: Rank::Family,
            ancestor: "Canis".to_string(),
            ancestor_rank: Rank::Genus,
        };
        assert_eq!(err.to_string(), "rank family of Canidae conflicts with genus Canis");
    }

    #[test]
    fn test_conversion_to_core_error() {
        let err: TaxoError = StoreError::not_found("taxon", "12").into();
        assert!(matches!(err, TaxoError::NotFound(ref m) if m == "taxon 12"));

        let err: TaxoError = StoreError::MissingName("taxon").into();
        assert_eq!(err.to_string(), "taxon without name");
    }
}
