/// Bibliographic datasets referenced by specimens and rasters
use crate::error::StoreError;
use crate::index::extern_index::{parse_externs, retain_free};
use crate::index::{id_order, ExternIndex, IdCounter};
use crate::persist;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use taxodb_core::{ExternId, KeyValue};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub citation: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub license: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, rename = "extern", skip_serializing_if = "Vec::is_empty")]
    pub externs: Vec<ExternId>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

impl Dataset {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    fn set_field(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        match key {
            "title" => {
                let title = value.trim();
                if title.is_empty() {
                    return Err(StoreError::MissingName("dataset"));
                }
                self.title = title.to_string();
            }
            "citation" => self.citation = value.trim().to_string(),
            "license" => self.license = value.trim().to_string(),
            "url" => self.url = value.trim().to_string(),
            "comment" => self.comment = value.to_string(),
            other => return Err(StoreError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    pub fn from_pairs(pairs: &[KeyValue]) -> Result<Self, StoreError> {
        let mut dataset = Dataset::default();
        for kv in pairs {
            match kv.key.as_str() {
                "id" | "extern" => {}
                "title" => dataset.title = kv.value.trim().to_string(),
                key => dataset.set_field(key, &kv.value)?,
            }
        }
        dataset.externs = parse_externs(
            pairs
                .iter()
                .filter(|kv| kv.key == "extern")
                .map(|kv| kv.value.as_str()),
        )?;
        Ok(dataset)
    }
}

#[derive(Debug, Default)]
pub struct DatasetStore {
    records: HashMap<String, Dataset>,
    externs: ExternIndex,
    ids: IdCounter,
    dirty: bool,
}

impl DatasetStore {
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

    pub fn get(&self, id: &str) -> Option<&Dataset> {
        self.records.get(self.resolve(id)?)
    }

    /// Every dataset in id order
    pub fn all(&self) -> Vec<&Dataset> {
        let mut all: Vec<&Dataset> = self.records.values().collect();
        all.sort_by(|a, b| id_order(&a.id, &b.id));
        all
    }

    pub fn add(&mut self, mut dataset: Dataset) -> Result<String, StoreError> {
        dataset.title = dataset.title.trim().to_string();
        if dataset.title.is_empty() {
            return Err(StoreError::MissingName("dataset"));
        }
        self.externs.check_new(&dataset.externs)?;

        dataset.id = self.ids.next_id();
        let id = dataset.id.clone();
        self.externs.bind(&id, &dataset.externs);
        self.records.insert(id.clone(), dataset);
        self.dirty = true;
        debug!("dataset {} added", id);
        Ok(id)
    }

    pub fn set(&mut self, id: &str, pairs: &[KeyValue]) -> Result<(), StoreError> {
        let id = self
            .resolve(id)
            .ok_or_else(|| StoreError::not_found("dataset", id))?
            .to_string();
        for kv in pairs.iter().filter(|kv| kv.key != "id") {
            let Some(dataset) = self.records.get_mut(&id) else {
                break;
            };
            if kv.key == "extern" {
                self.externs.edit(&id, &mut dataset.externs, &kv.value)?;
            } else {
                dataset.set_field(&kv.key, &kv.value)?;
            }
            self.dirty = true;
        }
        Ok(())
    }

    /// Remove a dataset. Records referencing it are cleared by the caller.
    pub fn delete(&mut self, id: &str) -> Result<Dataset, StoreError> {
        let id = self
            .resolve(id)
            .ok_or_else(|| StoreError::not_found("dataset", id))?
            .to_string();
        let dataset = self
            .records
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("dataset", &id))?;
        self.externs.unbind(&dataset.externs);
        self.dirty = true;
        Ok(dataset)
    }

    pub fn to_lines(&self) -> Result<Vec<String>, serde_json::Error> {
        persist::to_lines(self.all())
    }

    pub fn load_from(&mut self, path: &Path) -> Result<usize, StoreError> {
        let records: Vec<Dataset> = persist::read_records(path)?;
        let mut loaded = 0;
        for mut dataset in records {
            if dataset.id.is_empty() || self.records.contains_key(&dataset.id) {
                warn!("{}: skipping dataset with missing or duplicated id {:?}", path.display(), dataset.id);
                continue;
            }
            for ext in retain_free(&self.externs, &mut dataset.externs) {
                warn!("dataset {}: dropping duplicated extern id {}", dataset.id, ext);
            }
            self.ids.observe(&dataset.id);
            self.externs.bind(&dataset.id, &dataset.externs);
            self.records.insert(dataset.id.clone(), dataset);
            loaded += 1;
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_requires_title() {
        let mut store = DatasetStore::new();
        assert_eq!(
            store.add(Dataset::new("   ")).unwrap_err(),
            StoreError::MissingName("dataset")
        );
        let id = store.add(Dataset::new("MVZ mammals")).unwrap();
        assert_eq!(id, "1");
        assert_eq!(store.get("1").unwrap().title, "MVZ mammals");
    }

    #[test]
    fn test_set_fields_and_alias() {
        let mut store = DatasetStore::new();
        let id = store.add(Dataset::new("Herbarium")).unwrap();
        store
            .set(
                &id,
                &[
                    KeyValue::new("license", "CC-BY"),
                    KeyValue::new("extern", "gbif:abc"),
                ],
            )
            .unwrap();
        let dataset = store.get("gbif:abc").unwrap();
        assert_eq!(dataset.license, "CC-BY");
        assert!(store.set(&id, &[KeyValue::new("title", "")]).is_err());
        assert!(store.set(&id, &[KeyValue::new("doi", "x")]).is_err());
    }

    #[test]
    fn test_delete_unbinds_aliases() {
        let mut store = DatasetStore::new();
        let mut dataset = Dataset::new("Field notes");
        dataset.externs = vec!["gbif:7".parse().unwrap()];
        let id = store.add(dataset).unwrap();
        store.delete(&id).unwrap();
        assert!(store.get("gbif:7").is_none());
        assert!(store.is_empty());
        assert!(store.delete(&id).is_err());
    }

    #[test]
    fn test_from_pairs() {
        let dataset = Dataset::from_pairs(&[
            KeyValue::new("title", "Atlas"),
            KeyValue::new("url", "https://example.org/atlas"),
        ])
        .unwrap();
        assert_eq!(dataset.url, "https://example.org/atlas");
        assert!(Dataset::from_pairs(&[KeyValue::new("taxon", "1")]).is_err());
    }
}
