/// Structural and field edits of existing taxa
use super::TaxonomyStore;
use crate::error::StoreError;
use taxodb_core::{KeyValue, Rank};
use tracing::debug;

impl TaxonomyStore {
    fn resolve_owned(&self, id: &str) -> Result<String, StoreError> {
        self.resolve(id)
            .map(str::to_string)
            .ok_or_else(|| StoreError::not_found("taxon", id))
    }

    fn resolve_parent(&self, parent: &str) -> Result<String, StoreError> {
        let parent = parent.trim();
        if parent.is_empty() {
            return Ok(String::new());
        }
        self.resolve(parent)
            .map(str::to_string)
            .ok_or_else(|| StoreError::UnknownParent(parent.to_string()))
    }

    /// Apply every pair in order. Each pair is an independent edit; the
    /// first failure stops processing and is returned.
    pub fn set(&mut self, id: &str, pairs: &[KeyValue]) -> Result<(), StoreError> {
        let id = self.resolve_owned(id)?;
        for kv in pairs.iter().filter(|kv| kv.key != "id") {
            self.set_field(&id, &kv.key, &kv.value)?;
        }
        Ok(())
    }

    pub fn set_field(&mut self, id: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let id = self.resolve_owned(id)?;
        match key {
            "name" => self.rename(&id, value)?,
            "authority" => self.entry_mut(&id)?.authority = value.trim().to_string(),
            "comment" => self.entry_mut(&id)?.comment = value.to_string(),
            "extern" => {
                let entry = self
                    .taxa
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::not_found("taxon", &id))?;
                self.externs.edit(&id, &mut entry.taxon.externs, value)?;
            }
            "parent" => self.move_to(&id, value)?,
            "rank" => {
                let rank: Rank = value
                    .parse()
                    .map_err(|e: String| StoreError::invalid("rank", value, e))?;
                self.set_rank(&id, rank)?;
            }
            "synonym" => self.synonymize(&id, value)?,
            "validate" => self.revalidate(&id)?,
            other => return Err(StoreError::UnknownKey(other.to_string())),
        }
        self.dirty = true;
        Ok(())
    }

    fn entry_mut(&mut self, id: &str) -> Result<&mut super::Taxon, StoreError> {
        self.taxa
            .get_mut(id)
            .map(|e| &mut e.taxon)
            .ok_or_else(|| StoreError::not_found("taxon", id))
    }

    fn rename(&mut self, id: &str, name: &str) -> Result<(), StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::MissingName("taxon"));
        }
        let taxon = self.entry_mut(id)?;
        let old = std::mem::replace(&mut taxon.name, name.to_string());
        self.names.remove(&old, id);
        self.names.insert(name, id);
        debug!("taxon {} renamed {} -> {}", id, old, name);
        Ok(())
    }

    /// Re-parent a taxon, keeping its validity
    fn move_to(&mut self, id: &str, parent: &str) -> Result<(), StoreError> {
        let parent = self.resolve_parent(parent)?;
        let taxon = self.taxa[id].taxon.clone();
        if parent == taxon.parent {
            return Ok(());
        }
        if parent == id || self.is_descendant(&parent, id) {
            return Err(StoreError::Cycle {
                id: id.to_string(),
                target: parent,
            });
        }
        self.check_placement(&taxon.name, taxon.rank, taxon.valid, &parent)?;
        if !taxon.rank.is_ranked() {
            self.check_subtree(&self.taxa[id].children, self.ceiling(&parent))?;
        }

        self.detach(id, &taxon.parent);
        self.attach(id, &parent);
        debug!("taxon {} moved from {:?} to {:?}", id, taxon.parent, parent);
        Ok(())
    }

    /// Change the rank, checked against both the ancestors and the
    /// descendants of the taxon
    fn set_rank(&mut self, id: &str, rank: Rank) -> Result<(), StoreError> {
        let taxon = &self.taxa[id].taxon;
        if !taxon.parent.is_empty() {
            self.check_rank(&taxon.name, rank, taxon.valid, &taxon.parent)?;
        }
        let ceiling = if rank.is_ranked() {
            Some((rank, taxon))
        } else {
            self.ceiling(&taxon.parent)
        };
        self.check_subtree(&self.taxa[id].children, ceiling)?;
        self.entry_mut(id)?.rank = rank;
        Ok(())
    }

    /// Turn `id` into a junior synonym of `senior`. The children of `id`
    /// are handed over to the senior first, since synonyms stay childless.
    fn synonymize(&mut self, id: &str, senior: &str) -> Result<(), StoreError> {
        let senior = self.resolve_parent(senior)?;
        if senior.is_empty() {
            return Err(StoreError::SynonymWithoutParent(
                self.taxa[id].taxon.name.clone(),
            ));
        }
        if senior == id || self.is_descendant(&senior, id) {
            return Err(StoreError::Cycle {
                id: id.to_string(),
                target: senior,
            });
        }
        let senior_taxon = &self.taxa[&senior].taxon;
        if !senior_taxon.valid {
            return Err(StoreError::ParentIsSynonym(senior_taxon.name.clone()));
        }
        let taxon = self.taxa[id].taxon.clone();
        self.check_rank(&taxon.name, taxon.rank, false, &senior)?;
        let children = self.taxa[id].children.clone();
        self.check_subtree(&children, self.ceiling(&senior))?;

        for child in &children {
            self.attach(child, &senior);
        }
        if let Some(entry) = self.taxa.get_mut(id) {
            entry.children.clear();
        }
        self.detach(id, &taxon.parent);
        self.attach(id, &senior);
        self.entry_mut(id)?.valid = false;
        debug!(
            "taxon {} is now a synonym of {} ({} children moved)",
            id,
            senior,
            children.len()
        );
        Ok(())
    }

    /// Restore a synonym as a valid taxon, placed as a sibling of its
    /// former senior
    fn revalidate(&mut self, id: &str) -> Result<(), StoreError> {
        let taxon = self.taxa[id].taxon.clone();
        if taxon.valid {
            return Err(StoreError::InvalidOperation(format!(
                "taxon {} is already valid",
                taxon.name
            )));
        }
        let parent = self
            .taxa
            .get(&taxon.parent)
            .map(|e| e.taxon.parent.clone())
            .unwrap_or_default();
        if !parent.is_empty() {
            self.check_rank(&taxon.name, taxon.rank, true, &parent)?;
        }

        self.detach(id, &taxon.parent);
        self.attach(id, &parent);
        self.entry_mut(id)?.valid = true;
        debug!("taxon {} revalidated under {:?}", id, parent);
        Ok(())
    }
}
