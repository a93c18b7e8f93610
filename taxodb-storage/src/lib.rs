//! Native data engine for taxodb
//!
//! Holds the taxonomy, the collections indexed against it (specimens,
//! raster distributions, datasets, phylogenies) and the line-file
//! persistence behind them. [`Database`] is the single entry point: it owns
//! every store behind one exclusive lock.

pub mod database;
pub mod datasets;
pub mod dependent;
pub mod error;
pub mod index;
pub mod persist;
pub mod phylogeny;
pub mod rasters;
pub mod specimens;
pub mod taxonomy;

pub use database::{Database, Record, StoreKind, Stores};
pub use datasets::{Dataset, DatasetStore};
pub use dependent::{DependentRecord, DependentStore, Refs};
pub use error::StoreError;
pub use index::{ExternIndex, IdCounter, NameTrie, TaxonBuckets};
pub use phylogeny::{Node, NodeQuery, PhylogenyStore, Tree};
pub use rasters::{Pixel, RasDistro, RasterQuery, RasterSource, RasterStore};
pub use specimens::{Basis, Georef, Specimen, SpecimenQuery, SpecimenStore};
pub use taxonomy::{Taxon, TaxonQuery, TaxonomyStore};
