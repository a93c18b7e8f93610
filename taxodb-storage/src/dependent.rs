//! Collections indexed against the taxonomy
//!
//! Specimens and raster distributions share the same shape: a flat id map,
//! a taxon-id bucket index, extern aliases and an optional dataset link.
//! [`DependentStore`] implements the bookkeeping once; the record types
//! only describe their own fields through [`DependentRecord`].

use crate::datasets::DatasetStore;
use crate::error::StoreError;
use crate::index::extern_index::retain_free;
use crate::index::{id_order, ExternIndex, IdCounter, TaxonBuckets};
use crate::persist;
use crate::taxonomy::TaxonomyStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use taxodb_core::{ExternId, KeyValue};
use tracing::{debug, warn};

/// A record owned by a taxon
pub trait DependentRecord: Clone + Serialize + DeserializeOwned + Send + Sync {
    /// Name used in messages ("specimen", "raster")
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn taxon(&self) -> &str;
    fn set_taxon(&mut self, taxon: String);
    fn dataset(&self) -> &str;
    fn set_dataset(&mut self, dataset: String);
    fn externs(&self) -> &[ExternId];
    fn externs_mut(&mut self) -> &mut Vec<ExternId>;

    /// Apply one record-specific field edit
    fn set_field(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Build a record from the pairs of an add request
    fn from_pairs(pairs: &[KeyValue]) -> Result<Self, StoreError>;

    /// Whole-record checks run before insertion
    fn validate(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// The stores a dependent record may point into
#[derive(Clone, Copy)]
pub struct Refs<'a> {
    pub taxonomy: &'a TaxonomyStore,
    pub datasets: &'a DatasetStore,
}

impl<'a> Refs<'a> {
    fn taxon(&self, id: &str) -> Result<String, StoreError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(StoreError::MissingField("taxon"));
        }
        self.taxonomy
            .resolve(id)
            .map(str::to_string)
            .ok_or_else(|| StoreError::UnknownTaxon(id.to_string()))
    }

    /// Resolve a dataset reference; empty stays empty
    fn dataset(&self, id: &str) -> Result<String, StoreError> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(String::new());
        }
        self.datasets
            .resolve(id)
            .map(str::to_string)
            .ok_or_else(|| StoreError::UnknownDataset(id.to_string()))
    }
}

#[derive(Debug)]
pub struct DependentStore<R> {
    records: HashMap<String, R>,
    by_taxon: TaxonBuckets,
    externs: ExternIndex,
    ids: IdCounter,
    dirty: bool,
}

impl<R> Default for DependentStore<R> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            by_taxon: TaxonBuckets::new(),
            externs: ExternIndex::new(),
            ids: IdCounter::new(),
            dirty: false,
        }
    }
}

impl<R: DependentRecord> DependentStore<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn resolve(&self, id: &str) -> Option<&str> {
        let id = id.trim();
        if let Some((key, _)) = self.records.get_key_value(id) {
            return Some(key.as_str());
        }
        if ExternId::is_alias(id) {
            return self.externs.resolve(id);
        }
        None
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.get(self.resolve(id)?)
    }

    /// Ids of the records filed under exactly `taxon`
    pub fn bucket(&self, taxon: &str) -> &[String] {
        self.by_taxon.get(taxon)
    }

    /// Records of `taxon`, or of `taxon` and every descendant, taxon by
    /// taxon in hierarchy order
    pub fn records_for(
        &self,
        taxon: &str,
        descendants: bool,
        taxonomy: &TaxonomyStore,
    ) -> Result<Vec<&R>, StoreError> {
        let taxon = taxonomy
            .resolve(taxon)
            .ok_or_else(|| StoreError::UnknownTaxon(taxon.to_string()))?;
        let taxa = if descendants {
            taxonomy.subtree_pre_order(taxon)
        } else {
            vec![taxon.to_string()]
        };
        Ok(taxa
            .iter()
            .flat_map(|t| self.by_taxon.get(t))
            .filter_map(|id| self.records.get(id))
            .collect())
    }

    /// Every record in id order
    pub fn all(&self) -> Vec<&R> {
        let mut all: Vec<&R> = self.records.values().collect();
        all.sort_by(|a, b| id_order(a.id(), b.id()));
        all
    }

    /// Shared listing path: an optional taxon scope, then a record filter
    pub fn select(
        &self,
        scope: Option<(&str, bool)>,
        taxonomy: &TaxonomyStore,
        filter: impl Fn(&R) -> bool,
    ) -> Result<Vec<R>, StoreError> {
        let candidates = match scope {
            Some((taxon, descendants)) => self.records_for(taxon, descendants, taxonomy)?,
            None => self.all(),
        };
        Ok(candidates.into_iter().filter(|r| filter(r)).cloned().collect())
    }

    pub fn add(&mut self, mut record: R, refs: Refs<'_>) -> Result<String, StoreError> {
        let taxon = refs.taxon(record.taxon())?;
        let dataset = refs.dataset(record.dataset())?;
        record.validate()?;
        self.externs.check_new(record.externs())?;

        record.set_taxon(taxon);
        record.set_dataset(dataset);
        let id = self.ids.next_id();
        record.set_id(id.clone());
        debug!("{} {} added to taxon {}", R::KIND, id, record.taxon());
        self.insert_unchecked(record);
        self.dirty = true;
        Ok(id)
    }

    fn insert_unchecked(&mut self, record: R) {
        let id = record.id().to_string();
        self.by_taxon.insert(record.taxon(), &id);
        self.externs.bind(&id, record.externs());
        self.records.insert(id, record);
    }

    /// Apply pairs in order, each one atomically; stops at the first error
    pub fn set(&mut self, id: &str, pairs: &[KeyValue], refs: Refs<'_>) -> Result<(), StoreError> {
        let id = self
            .resolve(id)
            .ok_or_else(|| StoreError::not_found(R::KIND, id))?
            .to_string();
        for kv in pairs.iter().filter(|kv| kv.key != "id") {
            self.set_field(&id, &kv.key, &kv.value, refs)?;
            self.dirty = true;
        }
        Ok(())
    }

    fn set_field(
        &mut self,
        id: &str,
        key: &str,
        value: &str,
        refs: Refs<'_>,
    ) -> Result<(), StoreError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(R::KIND, id))?;
        match key {
            "taxon" => {
                let taxon = refs.taxon(value)?;
                self.by_taxon.remove(record.taxon(), id);
                self.by_taxon.insert(&taxon, id);
                record.set_taxon(taxon);
            }
            "dataset" => record.set_dataset(refs.dataset(value)?),
            "extern" => self.externs.edit(id, record.externs_mut(), value)?,
            _ => {
                // edit a copy so a failed check leaves the record untouched
                let mut edited = record.clone();
                edited.set_field(key, value)?;
                edited.validate()?;
                *record = edited;
            }
        }
        Ok(())
    }

    pub fn delete(&mut self, id: &str) -> Result<R, StoreError> {
        let id = self
            .resolve(id)
            .ok_or_else(|| StoreError::not_found(R::KIND, id))?
            .to_string();
        let record = self
            .records
            .remove(&id)
            .ok_or_else(|| StoreError::not_found(R::KIND, &id))?;
        self.by_taxon.remove(record.taxon(), &id);
        self.externs.unbind(record.externs());
        self.dirty = true;
        Ok(record)
    }

    /// Remove every record filed under `taxon`; returns how many went
    pub fn delete_taxon(&mut self, taxon: &str) -> usize {
        let ids = self.by_taxon.take(taxon);
        for id in &ids {
            if let Some(record) = self.records.remove(id) {
                self.externs.unbind(record.externs());
            }
        }
        if !ids.is_empty() {
            debug!("{} {} records of taxon {} removed", ids.len(), R::KIND, taxon);
            self.dirty = true;
        }
        ids.len()
    }

    /// Drop the link to a deleted dataset
    pub fn clear_dataset(&mut self, dataset: &str) -> usize {
        let mut cleared = 0;
        for record in self.records.values_mut() {
            if record.dataset() == dataset {
                record.set_dataset(String::new());
                cleared += 1;
            }
        }
        if cleared > 0 {
            self.dirty = true;
        }
        cleared
    }

    pub fn to_lines(&self) -> Result<Vec<String>, serde_json::Error> {
        persist::to_lines(self.all())
    }

    /// Load a table file. Dangling taxon or dataset references are
    /// dropped from the record rather than rejecting it.
    pub fn load_from(&mut self, path: &Path, refs: Refs<'_>) -> Result<usize, StoreError> {
        let records: Vec<R> = persist::read_records(path)?;
        let mut loaded = 0;
        for mut record in records {
            let id = record.id().to_string();
            if id.is_empty() || self.records.contains_key(&id) {
                warn!(
                    "{}: skipping {} with missing or duplicated id {:?}",
                    path.display(),
                    R::KIND,
                    id
                );
                continue;
            }
            if !record.taxon().is_empty() && !refs.taxonomy.contains(record.taxon()) {
                warn!("{} {}: unknown taxon {}", R::KIND, id, record.taxon());
                record.set_taxon(String::new());
            }
            if !record.dataset().is_empty() && refs.datasets.resolve(record.dataset()).is_none() {
                warn!("{} {}: unknown dataset {}", R::KIND, id, record.dataset());
                record.set_dataset(String::new());
            }
            for ext in retain_free(&self.externs, record.externs_mut()) {
                warn!("{} {}: dropping duplicated extern id {}", R::KIND, id, ext);
            }
            self.ids.observe(&id);
            self.insert_unchecked(record);
            loaded += 1;
        }
        Ok(loaded)
    }
}
