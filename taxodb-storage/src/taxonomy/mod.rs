//! The taxon hierarchy
//!
//! Taxa live in an id-indexed arena: every entry keeps its parent id and an
//! ordered list of child ids, and direct children of the implicit root are
//! listed in `roots`. Synonyms hang under their senior taxon as children
//! with `valid == false` and never have children of their own.
//!
//! Every mutation validates completely before touching the arena, so a
//! failed call leaves the store unchanged.

mod edit;
mod query;

pub use query::TaxonQuery;

use crate::error::StoreError;
use crate::index::extern_index::{parse_externs, retain_free};
use crate::index::{ExternIndex, IdCounter, NameTrie};
use crate::persist;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use taxodb_core::{ExternId, KeyValue, Rank};
use tracing::{debug, warn};

fn default_valid() -> bool {
    true
}

fn is_true(v: &bool) -> bool {
    *v
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxon {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub authority: String,
    #[serde(default)]
    pub rank: Rank,
    #[serde(default = "default_valid", skip_serializing_if = "is_true")]
    pub valid: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent: String,
    #[serde(default, rename = "extern", skip_serializing_if = "Vec::is_empty")]
    pub externs: Vec<ExternId>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

impl Taxon {
    pub fn new(name: impl Into<String>, rank: Rank) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            authority: String::new(),
            rank,
            valid: true,
            parent: String::new(),
            externs: Vec::new(),
            comment: String::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = parent.into();
        self
    }

    /// Mark as a junior synonym of `senior`
    pub fn synonym_of(mut self, senior: impl Into<String>) -> Self {
        self.parent = senior.into();
        self.valid = false;
        self
    }

    /// Build a taxon from the pairs of an add request
    pub fn from_pairs(pairs: &[KeyValue]) -> Result<Self, StoreError> {
        let mut taxon = Taxon::new("", Rank::Unranked);
        for kv in pairs {
            let value = kv.value.trim();
            match kv.key.as_str() {
                "name" => taxon.name = value.to_string(),
                "authority" => taxon.authority = value.to_string(),
                "rank" => {
                    taxon.rank = value
                        .parse()
                        .map_err(|e: String| StoreError::invalid("rank", value, e))?
                }
                "parent" => taxon.parent = value.to_string(),
                "synonym" => {
                    taxon.parent = value.to_string();
                    taxon.valid = false;
                }
                "valid" => {
                    taxon.valid = value
                        .parse()
                        .map_err(|_| StoreError::invalid("valid", value, "expecting true or false"))?
                }
                "comment" => taxon.comment = kv.value.clone(),
                "extern" => {}
                other => return Err(StoreError::UnknownKey(other.to_string())),
            }
        }
        taxon.externs = parse_externs(
            pairs
                .iter()
                .filter(|kv| kv.key == "extern")
                .map(|kv| kv.value.as_str()),
        )?;
        Ok(taxon)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    taxon: Taxon,
    children: Vec<String>,
}

/// Ancestor walk starting at (and including) a given taxon
pub struct Lineage<'a> {
    store: &'a TaxonomyStore,
    next: Option<&'a str>,
}

impl<'a> Iterator for Lineage<'a> {
    type Item = &'a Taxon;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;
        let entry = self.store.taxa.get(id)?;
        if !entry.taxon.parent.is_empty() {
            self.next = Some(entry.taxon.parent.as_str());
        }
        Some(&entry.taxon)
    }
}

#[derive(Debug, Default)]
pub struct TaxonomyStore {
    taxa: HashMap<String, Entry>,
    roots: Vec<String>,
    names: NameTrie,
    externs: ExternIndex,
    ids: IdCounter,
    dirty: bool,
}

impl TaxonomyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
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

    /// Canonical id for a numeric id or an extern alias
    pub fn resolve(&self, id: &str) -> Option<&str> {
        let id = id.trim();
        if let Some((key, _)) = self.taxa.get_key_value(id) {
            return Some(key.as_str());
        }
        if ExternId::is_alias(id) {
            return self.externs.resolve(id);
        }
        None
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resolve(id).is_some()
    }

    /// O(1) lookup by id or extern alias
    pub fn get(&self, id: &str) -> Option<&Taxon> {
        let id = self.resolve(id)?;
        self.taxa.get(id).map(|e| &e.taxon)
    }

    /// Child ids of a taxon (valid and synonyms); `""` is the root
    pub fn children_ids(&self, id: &str) -> &[String] {
        if id.is_empty() {
            return &self.roots;
        }
        self.taxa
            .get(id)
            .map(|e| e.children.as_slice())
            .unwrap_or(&[])
    }

    /// Walk from `id` up to the root, `id` included
    pub fn lineage<'a>(&'a self, id: &'a str) -> Lineage<'a> {
        Lineage {
            store: self,
            next: (!id.is_empty()).then_some(id),
        }
    }

    /// True when `ancestor` is a proper ancestor of `id`
    pub fn is_descendant(&self, id: &str, ancestor: &str) -> bool {
        self.lineage(id).skip(1).any(|t| t.id == ancestor)
    }

    /// `id` followed by all of its descendants, parents before children
    pub fn subtree_pre_order(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        if !self.taxa.contains_key(id) {
            return out;
        }
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            stack.extend(self.children_ids(&current).iter().rev().cloned());
            out.push(current);
        }
        out
    }

    /// Every taxon of the store, parents before children
    pub fn pre_order(&self) -> Vec<&Taxon> {
        let mut out = Vec::with_capacity(self.taxa.len());
        for root in &self.roots {
            for id in self.subtree_pre_order(root) {
                if let Some(entry) = self.taxa.get(&id) {
                    out.push(&entry.taxon);
                }
            }
        }
        out
    }

    pub fn names(&self) -> &NameTrie {
        &self.names
    }

    /// Most restrictive ranked ancestor at or above `parent`
    fn ceiling<'a>(&'a self, parent: &'a str) -> Option<(Rank, &'a Taxon)> {
        self.lineage(parent)
            .filter(|t| t.rank.is_ranked())
            .map(|t| (t.rank, t))
            .max_by_key(|(rank, _)| *rank)
    }

    /// Check a rank placed below `parent`. Valid taxa must be strictly less
    /// inclusive than every ranked ancestor; synonyms may share the rank.
    fn check_rank(
        &self,
        name: &str,
        rank: Rank,
        valid: bool,
        parent: &str,
    ) -> Result<(), StoreError> {
        if !rank.is_ranked() {
            return Ok(());
        }
        if let Some((ceiling, ancestor)) = self.ceiling(parent) {
            let fits = if valid { ceiling < rank } else { ceiling <= rank };
            if !fits {
                return Err(StoreError::RankConflict {
                    taxon: name.to_string(),
                    rank,
                    ancestor: ancestor.name.clone(),
                    ancestor_rank: ceiling,
                });
            }
        }
        Ok(())
    }

    /// Check the descendants in `children` against a new ancestor chain.
    /// Unranked children are transparent, so the walk descends through
    /// them until it meets a ranked taxon.
    fn check_subtree(
        &self,
        children: &[String],
        ceiling: Option<(Rank, &Taxon)>,
    ) -> Result<(), StoreError> {
        let Some((ceiling_rank, ancestor)) = ceiling else {
            return Ok(());
        };
        let mut stack: Vec<&String> = children.iter().collect();
        while let Some(id) = stack.pop() {
            let Some(entry) = self.taxa.get(id) else {
                continue;
            };
            let t = &entry.taxon;
            if !t.rank.is_ranked() {
                stack.extend(entry.children.iter());
                continue;
            }
            let fits = if t.valid {
                ceiling_rank < t.rank
            } else {
                ceiling_rank <= t.rank
            };
            if !fits {
                return Err(StoreError::RankConflict {
                    taxon: t.name.clone(),
                    rank: t.rank,
                    ancestor: ancestor.name.clone(),
                    ancestor_rank: ceiling_rank,
                });
            }
        }
        Ok(())
    }

    /// Validate placement under `parent` (already resolved)
    fn check_placement(
        &self,
        name: &str,
        rank: Rank,
        valid: bool,
        parent: &str,
    ) -> Result<(), StoreError> {
        if parent.is_empty() {
            if !valid {
                return Err(StoreError::SynonymWithoutParent(name.to_string()));
            }
            return Ok(());
        }
        let entry = self
            .taxa
            .get(parent)
            .ok_or_else(|| StoreError::UnknownParent(parent.to_string()))?;
        if !entry.taxon.valid {
            return Err(StoreError::ParentIsSynonym(entry.taxon.name.clone()));
        }
        self.check_rank(name, rank, valid, parent)
    }

    /// Add a new taxon, returning its id
    pub fn add(&mut self, mut taxon: Taxon) -> Result<String, StoreError> {
        taxon.name = taxon.name.trim().to_string();
        if taxon.name.is_empty() {
            return Err(StoreError::MissingName("taxon"));
        }
        let parent = taxon.parent.trim();
        taxon.parent = if parent.is_empty() {
            String::new()
        } else {
            self.resolve(parent)
                .ok_or_else(|| StoreError::UnknownParent(parent.to_string()))?
                .to_string()
        };
        self.check_placement(&taxon.name, taxon.rank, taxon.valid, &taxon.parent)?;
        self.externs.check_new(&taxon.externs)?;

        taxon.id = self.ids.next_id();
        let id = taxon.id.clone();
        debug!("taxon {} ({}) added as {}", taxon.name, taxon.rank, id);
        self.insert_unchecked(taxon);
        self.dirty = true;
        Ok(id)
    }

    fn insert_unchecked(&mut self, taxon: Taxon) {
        let id = taxon.id.clone();
        self.names.insert(&taxon.name, &id);
        self.externs.bind(&id, &taxon.externs);
        if taxon.parent.is_empty() {
            self.roots.push(id.clone());
        } else if let Some(parent) = self.taxa.get_mut(&taxon.parent) {
            parent.children.push(id.clone());
        }
        self.taxa.insert(
            id,
            Entry {
                taxon,
                children: Vec::new(),
            },
        );
    }

    fn detach(&mut self, id: &str, parent: &str) {
        let siblings = if parent.is_empty() {
            &mut self.roots
        } else {
            match self.taxa.get_mut(parent) {
                Some(entry) => &mut entry.children,
                None => return,
            }
        };
        siblings.retain(|c| c != id);
    }

    fn attach(&mut self, id: &str, parent: &str) {
        if parent.is_empty() {
            self.roots.push(id.to_string());
        } else if let Some(entry) = self.taxa.get_mut(parent) {
            entry.children.push(id.to_string());
        }
        if let Some(entry) = self.taxa.get_mut(id) {
            entry.taxon.parent = parent.to_string();
        }
    }

    /// Delete a taxon and its whole subtree. Returns the removed ids,
    /// children before parents, so callers can cascade per id.
    pub fn delete(&mut self, id: &str) -> Result<Vec<String>, StoreError> {
        let id = self
            .resolve(id)
            .ok_or_else(|| StoreError::not_found("taxon", id))?
            .to_string();
        let mut removed = self.subtree_pre_order(&id);
        removed.reverse();

        let parent = self.taxa[&id].taxon.parent.clone();
        self.detach(&id, &parent);
        for gone in &removed {
            if let Some(entry) = self.taxa.remove(gone) {
                self.names.remove(&entry.taxon.name, gone);
                self.externs.unbind(&entry.taxon.externs);
            }
        }
        debug!("taxon {} deleted with {} descendants", id, removed.len() - 1);
        self.dirty = true;
        Ok(removed)
    }

    /// Serialized records, parents before children
    pub fn to_lines(&self) -> Result<Vec<String>, serde_json::Error> {
        persist::to_lines(self.pre_order())
    }

    /// Insert a record read from disk. Stored ids are kept; the record must
    /// fit the hierarchy built so far.
    pub fn load_taxon(&mut self, mut taxon: Taxon) -> Result<(), StoreError> {
        if taxon.id.is_empty() {
            return Err(StoreError::MissingField("id"));
        }
        if self.taxa.contains_key(&taxon.id) {
            return Err(StoreError::DuplicateId(taxon.id));
        }
        if taxon.name.trim().is_empty() {
            return Err(StoreError::MissingName("taxon"));
        }
        self.check_placement(&taxon.name, taxon.rank, taxon.valid, &taxon.parent)?;
        for ext in retain_free(&self.externs, &mut taxon.externs) {
            warn!("taxon {}: dropping duplicated extern id {}", taxon.id, ext);
        }
        self.ids.observe(&taxon.id);
        self.insert_unchecked(taxon);
        Ok(())
    }

    /// Load a taxonomy file; bad records are logged and skipped
    pub fn load_from(&mut self, path: &Path) -> Result<usize, StoreError> {
        let records: Vec<Taxon> = persist::read_records(path)?;
        let mut loaded = 0;
        for taxon in records {
            let id = taxon.id.clone();
            match self.load_taxon(taxon) {
                Ok(()) => loaded += 1,
                Err(e) => warn!("{}: skipping taxon {}: {}", path.display(), id, e),
            }
        }
        Ok(loaded)
    }
}
