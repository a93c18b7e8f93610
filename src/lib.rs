//! taxodb: an authoritative store for taxonomic and biogeographic records
//!
//! The workspace crates do the work; this crate bundles them behind the
//! `taxodb` binary.

pub mod cli;

pub use taxodb_core::{Config, KeyValue, Rank, Table, TaxoError, TaxoResult};
pub use taxodb_server::{Client, DriverRegistry, Server, TaxonomyProvider};
pub use taxodb_storage::Database;
