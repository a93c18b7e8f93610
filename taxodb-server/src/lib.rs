//! Network surface of taxodb
//!
//! A [`Server`] exposes one [`Database`](taxodb_storage::Database) over a
//! line-delimited JSON protocol. Every connection carries exactly one
//! [`Request`]; the server answers with an [`Answer`] and, for reads, the
//! matching records before closing the connection. [`Client`] is the
//! matching async client and [`DriverRegistry`] maps driver names to
//! [`TaxonomyProvider`] constructors.

pub mod client;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod server;

pub use client::{Client, Scanner};
pub use protocol::{Answer, Query, Request};
pub use provider::TaxonomyProvider;
pub use registry::{DriverFn, DriverRegistry};
pub use server::{write_allowed, Server};
