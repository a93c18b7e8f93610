//! The database facade
//!
//! [`Database`] owns every store behind a single exclusive lock. Each call
//! holds the lock for its whole in-memory operation; reads copy their
//! results out before the lock is released so callers may stream them
//! without blocking writers. A commit only holds it while serializing;
//! files are written after it is released. Cross-table cascades (a taxon delete removing
//! specimens, rasters and node bindings) run under the same lock, so other
//! writers never observe them half done.

use crate::datasets::{Dataset, DatasetStore};
use crate::dependent::{DependentRecord, Refs};
use crate::error::StoreError;
use crate::persist::FileWrite;
use crate::phylogeny::{Node, NodeQuery, PhylogenyStore, Tree};
use crate::rasters::{RasDistro, RasterQuery, RasterStore};
use crate::specimens::{Specimen, SpecimenQuery, SpecimenStore};
use crate::taxonomy::{Taxon, TaxonQuery, TaxonomyStore};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use taxodb_core::types::lookup;
use taxodb_core::{KeyValue, Table, TaxoError, TaxoResult};
use tracing::{debug, error, info, instrument};

/// A record of any table, serialized with the shape of its table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Taxon(Taxon),
    Specimen(Specimen),
    Dataset(Dataset),
    RasDistro(RasDistro),
    Tree(Tree),
    Node(Node),
}

impl Record {
    pub fn id(&self) -> &str {
        match self {
            Record::Taxon(r) => &r.id,
            Record::Specimen(r) => &r.id,
            Record::Dataset(r) => &r.id,
            Record::RasDistro(r) => &r.id,
            Record::Tree(r) => &r.id,
            Record::Node(r) => &r.id,
        }
    }
}

/// Unit of persistence; trees and nodes are committed together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Taxonomy,
    Specimens,
    Rasters,
    Datasets,
    Phylogeny,
}

impl StoreKind {
    pub const ALL: [StoreKind; 5] = [
        StoreKind::Taxonomy,
        StoreKind::Specimens,
        StoreKind::Rasters,
        StoreKind::Datasets,
        StoreKind::Phylogeny,
    ];

    pub fn tables(&self) -> &'static [Table] {
        match self {
            StoreKind::Taxonomy => &[Table::Taxonomy],
            StoreKind::Specimens => &[Table::Specimens],
            StoreKind::Rasters => &[Table::RasDistros],
            StoreKind::Datasets => &[Table::Datasets],
            StoreKind::Phylogeny => &[Table::Trees, Table::Nodes],
        }
    }
}

/// Every store of a database
#[derive(Debug, Default)]
pub struct Stores {
    pub taxonomy: TaxonomyStore,
    pub specimens: SpecimenStore,
    pub rasters: RasterStore,
    pub datasets: DatasetStore,
    pub phylogeny: PhylogenyStore,
}

fn required<'a>(pairs: &'a [KeyValue], key: &'static str) -> Result<&'a str, StoreError> {
    lookup(pairs, key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(StoreError::MissingField(key))
}

impl Stores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every table file found in `dir`. Referenced tables load first.
    pub fn load(dir: &Path) -> Result<Self, StoreError> {
        let mut stores = Stores::new();
        let path = |table: Table| dir.join(table.file_name());

        let datasets = stores.datasets.load_from(&path(Table::Datasets))?;
        let taxa = stores.taxonomy.load_from(&path(Table::Taxonomy))?;
        let refs = Refs {
            taxonomy: &stores.taxonomy,
            datasets: &stores.datasets,
        };
        let specimens = stores.specimens.load_from(&path(Table::Specimens), refs)?;
        let rasters = stores.rasters.load_from(&path(Table::RasDistros), refs)?;
        let trees = stores.phylogeny.load_trees(&path(Table::Trees))?;
        let nodes = stores
            .phylogeny
            .load_nodes(&path(Table::Nodes), &stores.taxonomy)?;

        info!(
            taxa,
            specimens, rasters, datasets, trees, nodes, "loaded {}", dir.display()
        );
        Ok(stores)
    }

    pub fn is_dirty(&self, kind: StoreKind) -> bool {
        match kind {
            StoreKind::Taxonomy => self.taxonomy.is_dirty(),
            StoreKind::Specimens => self.specimens.is_dirty(),
            StoreKind::Rasters => self.rasters.is_dirty(),
            StoreKind::Datasets => self.datasets.is_dirty(),
            StoreKind::Phylogeny => self.phylogeny.is_dirty(),
        }
    }

    pub fn mark_clean(&mut self, kind: StoreKind) {
        match kind {
            StoreKind::Taxonomy => self.taxonomy.mark_clean(),
            StoreKind::Specimens => self.specimens.mark_clean(),
            StoreKind::Rasters => self.rasters.mark_clean(),
            StoreKind::Datasets => self.datasets.mark_clean(),
            StoreKind::Phylogeny => self.phylogeny.mark_clean(),
        }
    }

    pub fn mark_dirty(&mut self, kind: StoreKind) {
        match kind {
            StoreKind::Taxonomy => self.taxonomy.mark_dirty(),
            StoreKind::Specimens => self.specimens.mark_dirty(),
            StoreKind::Rasters => self.rasters.mark_dirty(),
            StoreKind::Datasets => self.datasets.mark_dirty(),
            StoreKind::Phylogeny => self.phylogeny.mark_dirty(),
        }
    }

    /// File writes for the stores changed since the last commit
    pub fn pending_writes(&self, dir: &Path) -> Result<Vec<(StoreKind, Vec<FileWrite>)>, TaxoError> {
        let mut jobs = Vec::new();
        for kind in StoreKind::ALL {
            if !self.is_dirty(kind) {
                continue;
            }
            let mut writes = Vec::new();
            for &table in kind.tables() {
                let lines = match table {
                    Table::Taxonomy => self.taxonomy.to_lines()?,
                    Table::Specimens => self.specimens.to_lines()?,
                    Table::RasDistros => self.rasters.to_lines()?,
                    Table::Datasets => self.datasets.to_lines()?,
                    Table::Trees => self.phylogeny.tree_lines()?,
                    Table::Nodes => self.phylogeny.node_lines()?,
                };
                writes.push(FileWrite::new(dir.join(table.file_name()), lines));
            }
            jobs.push((kind, writes));
        }
        Ok(jobs)
    }

    pub fn add(&mut self, table: Table, pairs: &[KeyValue]) -> Result<String, StoreError> {
        let Stores {
            taxonomy,
            specimens,
            rasters,
            datasets,
            phylogeny,
        } = self;
        match table {
            Table::Taxonomy => taxonomy.add(Taxon::from_pairs(pairs)?),
            Table::Specimens => specimens.add(
                Specimen::from_pairs(pairs)?,
                Refs {
                    taxonomy,
                    datasets,
                },
            ),
            Table::RasDistros => rasters.add(
                RasDistro::from_pairs(pairs)?,
                Refs {
                    taxonomy,
                    datasets,
                },
            ),
            Table::Datasets => datasets.add(Dataset::from_pairs(pairs)?),
            Table::Trees => phylogeny.add_tree(Tree::from_pairs(pairs)?),
            Table::Nodes => phylogeny.add_node(Node::from_pairs(pairs)?, taxonomy),
        }
    }

    pub fn get(&self, table: Table, id: &str) -> Option<Record> {
        match table {
            Table::Taxonomy => self.taxonomy.get(id).cloned().map(Record::Taxon),
            Table::Specimens => self.specimens.get(id).cloned().map(Record::Specimen),
            Table::RasDistros => self.rasters.get(id).cloned().map(Record::RasDistro),
            Table::Datasets => self.datasets.get(id).cloned().map(Record::Dataset),
            Table::Trees => self.phylogeny.tree(id).cloned().map(Record::Tree),
            Table::Nodes => self.phylogeny.node(id).cloned().map(Record::Node),
        }
    }

    pub fn list(&self, table: Table, pairs: &[KeyValue]) -> Result<Vec<Record>, StoreError> {
        let records = match table {
            Table::Taxonomy => self
                .taxonomy
                .list(&TaxonQuery::from_pairs(pairs)?)?
                .into_iter()
                .map(Record::Taxon)
                .collect(),
            Table::Specimens => {
                let mut query = SpecimenQuery::from_pairs(pairs)?;
                query.dataset = self.canonical_dataset(query.dataset);
                self.specimens
                    .list(&query, &self.taxonomy)?
                    .into_iter()
                    .map(Record::Specimen)
                    .collect()
            }
            Table::RasDistros => {
                let mut query = RasterQuery::from_pairs(pairs)?;
                query.dataset = self.canonical_dataset(query.dataset);
                self.rasters
                    .list(&query, &self.taxonomy)?
                    .into_iter()
                    .map(Record::RasDistro)
                    .collect()
            }
            Table::Datasets => self
                .datasets
                .all()
                .into_iter()
                .cloned()
                .map(Record::Dataset)
                .collect(),
            Table::Trees => self
                .phylogeny
                .trees()
                .into_iter()
                .cloned()
                .map(Record::Tree)
                .collect(),
            Table::Nodes => {
                let mut query = NodeQuery::from_pairs(pairs)?;
                if let NodeQuery::Taxon { taxon, .. } = &mut query {
                    if let Some(id) = self.taxonomy.resolve(taxon) {
                        *taxon = id.to_string();
                    }
                }
                self.phylogeny
                    .list(&query)?
                    .into_iter()
                    .map(Record::Node)
                    .collect()
            }
        };
        Ok(records)
    }

    fn canonical_dataset(&self, dataset: Option<String>) -> Option<String> {
        dataset.map(|d| match self.datasets.resolve(&d) {
            Some(id) => id.to_string(),
            None => d,
        })
    }

    /// Apply the pairs of a set request to the record named by `id`
    pub fn set(&mut self, table: Table, pairs: &[KeyValue]) -> Result<(), StoreError> {
        let id = required(pairs, "id")?;
        let Stores {
            taxonomy,
            specimens,
            rasters,
            datasets,
            phylogeny,
        } = self;
        match table {
            Table::Taxonomy => taxonomy.set(id, pairs),
            Table::Specimens => specimens.set(
                id,
                pairs,
                Refs {
                    taxonomy,
                    datasets,
                },
            ),
            Table::RasDistros => rasters.set(
                id,
                pairs,
                Refs {
                    taxonomy,
                    datasets,
                },
            ),
            Table::Datasets => datasets.set(id, pairs),
            Table::Trees => phylogeny.set_tree(id, pairs),
            Table::Nodes => phylogeny.set_node(id, pairs, taxonomy),
        }
    }

    /// Delete by `id` (or by `taxon` for specimens and rasters). Returns a
    /// short description of what was removed.
    pub fn delete(&mut self, table: Table, pairs: &[KeyValue]) -> Result<String, StoreError> {
        if matches!(table, Table::Specimens | Table::RasDistros) && lookup(pairs, "id").is_none() {
            let taxon = required(pairs, "taxon")?;
            let taxon = self
                .taxonomy
                .resolve(taxon)
                .ok_or_else(|| StoreError::UnknownTaxon(taxon.to_string()))?
                .to_string();
            let removed = if table == Table::Specimens {
                self.specimens.delete_taxon(&taxon)
            } else {
                self.rasters.delete_taxon(&taxon)
            };
            return Ok(format!("{} records removed", removed));
        }

        let id = required(pairs, "id")?;
        match table {
            Table::Taxonomy => {
                let removed = self.taxonomy.delete(id)?;
                let (mut specimens, mut rasters, mut bindings) = (0, 0, 0);
                for taxon in &removed {
                    specimens += self.specimens.delete_taxon(taxon);
                    rasters += self.rasters.delete_taxon(taxon);
                    bindings += self.phylogeny.unbind_taxon(taxon);
                }
                debug!(
                    taxa = removed.len(),
                    specimens, rasters, bindings, "taxon delete cascaded"
                );
                Ok(removed.last().cloned().unwrap_or_default())
            }
            Table::Specimens => Ok(self.specimens.delete(id)?.id().to_string()),
            Table::RasDistros => Ok(self.rasters.delete(id)?.id().to_string()),
            Table::Datasets => {
                let dataset = self.datasets.delete(id)?;
                self.specimens.clear_dataset(&dataset.id);
                self.rasters.clear_dataset(&dataset.id);
                Ok(dataset.id)
            }
            Table::Trees => Ok(self.phylogeny.delete_tree(id)?.id),
            Table::Nodes => Ok(self.phylogeny.delete_node(id)?.remove(0)),
        }
    }
}

/// Thread-safe entry point over all stores of one data directory
#[derive(Debug)]
pub struct Database {
    dir: PathBuf,
    stores: Mutex<Stores>,
    /// Held for a whole commit so table files are replaced in snapshot order
    committing: Mutex<()>,
}

impl Database {
    /// Open (creating if needed) the data directory and load every table
    pub fn open(dir: impl Into<PathBuf>) -> TaxoResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let stores = Stores::load(&dir)?;
        Ok(Self {
            dir,
            stores: Mutex::new(stores),
            committing: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run `f` with shared access to the stores
    pub fn with_stores<R>(&self, f: impl FnOnce(&Stores) -> R) -> R {
        f(&self.stores.lock())
    }

    pub fn add(&self, table: Table, pairs: &[KeyValue]) -> TaxoResult<String> {
        let id = self.stores.lock().add(table, pairs)?;
        debug!(%table, %id, "added");
        Ok(id)
    }

    pub fn get(&self, table: Table, id: &str) -> TaxoResult<Option<Record>> {
        Ok(self.stores.lock().get(table, id))
    }

    pub fn list(&self, table: Table, pairs: &[KeyValue]) -> TaxoResult<Vec<Record>> {
        Ok(self.stores.lock().list(table, pairs)?)
    }

    pub fn set(&self, table: Table, pairs: &[KeyValue]) -> TaxoResult<()> {
        Ok(self.stores.lock().set(table, pairs)?)
    }

    pub fn delete(&self, table: Table, pairs: &[KeyValue]) -> TaxoResult<String> {
        Ok(self.stores.lock().delete(table, pairs)?)
    }

    /// Persist every store with pending changes. The changed stores are
    /// serialized and marked clean under the lock; the files are then
    /// written in parallel without it. A store whose write fails is marked
    /// dirty again and the first failure is returned. Returns the number
    /// of files written.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub fn commit(&self) -> TaxoResult<usize> {
        let _committing = self.committing.lock();
        let jobs = {
            let mut stores = self.stores.lock();
            let jobs = stores.pending_writes(&self.dir)?;
            for (kind, _) in &jobs {
                stores.mark_clean(*kind);
            }
            jobs
        };
        if jobs.is_empty() {
            debug!("nothing to commit");
            return Ok(0);
        }

        let results: Vec<(StoreKind, io::Result<usize>)> = jobs
            .into_par_iter()
            .map(|(kind, writes)| {
                let result = writes.iter().try_for_each(FileWrite::write);
                (kind, result.map(|_| writes.len()))
            })
            .collect();

        let mut written = 0;
        let mut first_error = None;
        for (kind, result) in results {
            match result {
                Ok(files) => written += files,
                Err(e) => {
                    error!(?kind, "commit failed: {}", e);
                    self.stores.lock().mark_dirty(kind);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(TaxoError::Io(e)),
            None => {
                info!(files = written, "committed");
                Ok(written)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn kv(pairs: &[(&str, &str)]) -> Vec<KeyValue> {
        pairs.iter().map(|(k, v)| KeyValue::new(*k, *v)).collect()
    }

    #[test]
    fn test_commit_writes_only_dirty_stores() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path()).unwrap();
        assert_eq!(db.commit().unwrap(), 0);

        db.add(Table::Taxonomy, &kv(&[("name", "Animalia"), ("rank", "kingdom")]))
            .unwrap();
        assert_eq!(db.commit().unwrap(), 1);
        assert!(dir.path().join("taxonomy.jsonl").exists());
        assert!(!dir.path().join("specimens.jsonl").exists());
        assert_eq!(db.commit().unwrap(), 0);

        db.add(Table::Trees, &kv(&[("name", "Metazoa")])).unwrap();
        assert_eq!(db.commit().unwrap(), 2);
        assert!(dir.path().join("nodes.jsonl").exists());
    }

    #[test]
    fn test_failed_commit_keeps_store_dirty() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        let db = Database::open(&data).unwrap();
        db.add(Table::Datasets, &kv(&[("title", "Oaks")])).unwrap();

        fs::remove_dir_all(&data).unwrap();
        assert!(matches!(db.commit(), Err(TaxoError::Io(_))));
        assert!(db.with_stores(|s| s.is_dirty(StoreKind::Datasets)));

        fs::create_dir_all(&data).unwrap();
        assert_eq!(db.commit().unwrap(), 1);
        assert!(!db.with_stores(|s| s.is_dirty(StoreKind::Datasets)));
        assert_eq!(db.commit().unwrap(), 0);
    }

    #[test]
    fn test_set_requires_id() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let err = db
            .set(Table::Taxonomy, &kv(&[("name", "Canis")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "missing field: id");
    }

    #[test]
    fn test_dataset_delete_clears_references() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path()).unwrap();
        db.add(Table::Taxonomy, &kv(&[("name", "Quercus"), ("rank", "genus")]))
            .unwrap();
        let dataset = db.add(Table::Datasets, &kv(&[("title", "Oaks")])).unwrap();
        let specimen = db
            .add(Table::Specimens, &kv(&[("taxon", "1"), ("dataset", dataset.as_str())]))
            .unwrap();

        db.delete(Table::Datasets, &kv(&[("id", dataset.as_str())])).unwrap();
        match db.get(Table::Specimens, &specimen).unwrap() {
            Some(Record::Specimen(s)) => assert!(s.dataset.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_record_serializes_as_table_shape() {
        let record = Record::Dataset(Dataset {
            id: "4".to_string(),
            ..Dataset::new("Atlas")
        });
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"id":"4","title":"Atlas"}"#
        );
        assert_eq!(record.id(), "4");
    }
}
