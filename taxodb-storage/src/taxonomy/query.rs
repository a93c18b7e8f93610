/// Read paths over the hierarchy and the name index
use super::{Taxon, TaxonomyStore};
use crate::error::StoreError;
use taxodb_core::types::lookup;
use taxodb_core::{KeyValue, Rank};

#[derive(Debug, Clone, PartialEq)]
pub enum TaxonQuery {
    /// Valid children; an empty id lists the top level
    Children(String),
    Synonyms(String),
    /// Ancestors, nearest first
    Parents(String),
    /// Exact name, or a prefix when the pattern ends in `*`, optionally
    /// narrowed to an ancestor (by id or by name) and a rank
    Name {
        pattern: String,
        parent: Option<String>,
        parent_name: Option<String>,
        rank: Option<Rank>,
    },
}

impl TaxonQuery {
    pub fn name(pattern: impl Into<String>) -> Self {
        TaxonQuery::Name {
            pattern: pattern.into(),
            parent: None,
            parent_name: None,
            rank: None,
        }
    }

    pub fn from_pairs(pairs: &[KeyValue]) -> Result<Self, StoreError> {
        if let Some(id) = lookup(pairs, "children") {
            return Ok(TaxonQuery::Children(id.trim().to_string()));
        }
        if let Some(id) = lookup(pairs, "synonyms") {
            return Ok(TaxonQuery::Synonyms(id.trim().to_string()));
        }
        if let Some(id) = lookup(pairs, "parents") {
            return Ok(TaxonQuery::Parents(id.trim().to_string()));
        }
        let parent = lookup(pairs, "parent").map(|p| p.trim().to_string());
        let Some(pattern) = lookup(pairs, "name") else {
            // a bare parent lists its children
            return Ok(TaxonQuery::Children(parent.unwrap_or_default()));
        };
        let rank = lookup(pairs, "rank")
            .map(|r| {
                r.parse::<Rank>()
                    .map_err(|e| StoreError::invalid("rank", r, e))
            })
            .transpose()?;
        Ok(TaxonQuery::Name {
            pattern: pattern.trim().to_string(),
            parent: parent.filter(|p| !p.is_empty()),
            parent_name: lookup(pairs, "parentName")
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            rank,
        })
    }
}

impl TaxonomyStore {
    /// Run a query, returning copies of the matching taxa
    pub fn list(&self, query: &TaxonQuery) -> Result<Vec<Taxon>, StoreError> {
        match query {
            TaxonQuery::Children(id) => Ok(self
                .child_taxa(id)?
                .filter(|t| t.valid)
                .cloned()
                .collect()),
            TaxonQuery::Synonyms(id) => Ok(self
                .child_taxa(id)?
                .filter(|t| !t.valid)
                .cloned()
                .collect()),
            TaxonQuery::Parents(id) => {
                let id = self
                    .resolve(id)
                    .ok_or_else(|| StoreError::not_found("taxon", id.as_str()))?;
                Ok(self.lineage(id).skip(1).cloned().collect())
            }
            TaxonQuery::Name {
                pattern,
                parent,
                parent_name,
                rank,
            } => self.search(pattern, parent.as_deref(), parent_name.as_deref(), *rank),
        }
    }

    fn child_taxa<'a>(
        &'a self,
        id: &str,
    ) -> Result<impl Iterator<Item = &'a Taxon> + 'a, StoreError> {
        let id = if id.is_empty() {
            ""
        } else {
            self.resolve(id)
                .ok_or_else(|| StoreError::not_found("taxon", id))?
        };
        Ok(self
            .children_ids(id)
            .iter()
            .filter_map(|c| self.taxa.get(c))
            .map(|e| &e.taxon))
    }

    fn search(
        &self,
        pattern: &str,
        parent: Option<&str>,
        parent_name: Option<&str>,
        rank: Option<Rank>,
    ) -> Result<Vec<Taxon>, StoreError> {
        let ids = match pattern.strip_suffix('*') {
            Some(prefix) => self.names.prefix(prefix),
            None => self.names.exact(pattern),
        };
        let parent = parent
            .map(|p| {
                self.resolve(p)
                    .ok_or_else(|| StoreError::not_found("taxon", p))
            })
            .transpose()?;
        let parent_name = parent_name.map(str::to_lowercase);

        let matches = ids
            .iter()
            .filter_map(|id| self.taxa.get(id).map(|e| &e.taxon))
            .filter(|t| rank.map_or(true, |r| t.rank == r))
            .filter(|t| parent.map_or(true, |p| self.is_descendant(&t.id, p)))
            .filter(|t| {
                parent_name.as_deref().map_or(true, |name| {
                    self.lineage(&t.id)
                        .skip(1)
                        .any(|a| a.name.to_lowercase() == name)
                })
            })
            .cloned()
            .collect();
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(taxa: &[Taxon]) -> Vec<&str> {
        taxa.iter().map(|t| t.id.as_str()).collect()
    }

    fn store() -> TaxonomyStore {
        let mut store = TaxonomyStore::new();
        store.add(Taxon::new("Animalia", Rank::Kingdom)).unwrap(); // 1
        store
            .add(Taxon::new("Canidae", Rank::Family).with_parent("1"))
            .unwrap(); // 2
        store
            .add(Taxon::new("Canis", Rank::Genus).with_parent("2"))
            .unwrap(); // 3
        store
            .add(Taxon::new("Canis lupus", Rank::Species).with_parent("3"))
            .unwrap(); // 4
        store
            .add(Taxon::new("Thos", Rank::Genus).synonym_of("3"))
            .unwrap(); // 5
        store
            .add(Taxon::new("Plantae", Rank::Kingdom))
            .unwrap(); // 6
        store
            .add(Taxon::new("Canis", Rank::Genus).with_parent("6"))
            .unwrap(); // 7, a homonym in another kingdom
        store
    }

    #[test]
    fn test_children_and_synonyms() {
        let store = store();
        assert_eq!(ids(&store.list(&TaxonQuery::Children("3".into())).unwrap()), ["4"]);
        assert_eq!(ids(&store.list(&TaxonQuery::Synonyms("3".into())).unwrap()), ["5"]);
        assert_eq!(ids(&store.list(&TaxonQuery::Children(String::new())).unwrap()), ["1", "6"]);
        assert!(store.list(&TaxonQuery::Children("99".into())).is_err());
    }

    #[test]
    fn test_parents_nearest_first() {
        let store = store();
        let parents = store.list(&TaxonQuery::Parents("4".into())).unwrap();
        assert_eq!(ids(&parents), ["3", "2", "1"]);
    }

    #[test]
    fn test_name_search_returns_every_homonym() {
        let store = store();
        let exact = store.list(&TaxonQuery::name("canis")).unwrap();
        assert_eq!(ids(&exact), ["3", "7"]);

        let prefix = store.list(&TaxonQuery::name("Canis*")).unwrap();
        assert_eq!(ids(&prefix), ["3", "7", "4"]);
        // reads are repeatable
        assert_eq!(store.list(&TaxonQuery::name("Canis*")).unwrap(), prefix);
    }

    #[test]
    fn test_name_search_narrowers() {
        let store = store();
        let pairs = vec![
            KeyValue::new("name", "Canis*"),
            KeyValue::new("parentName", "animalia"),
            KeyValue::new("rank", "genus"),
        ];
        let query = TaxonQuery::from_pairs(&pairs).unwrap();
        assert_eq!(ids(&store.list(&query).unwrap()), ["3"]);

        let pairs = vec![KeyValue::new("name", "canis"), KeyValue::new("parent", "6")];
        let query = TaxonQuery::from_pairs(&pairs).unwrap();
        assert_eq!(ids(&store.list(&query).unwrap()), ["7"]);
    }

    #[test]
    fn test_query_from_pairs() {
        assert_eq!(
            TaxonQuery::from_pairs(&[KeyValue::new("synonyms", "3")]).unwrap(),
            TaxonQuery::Synonyms("3".into())
        );
        assert_eq!(
            TaxonQuery::from_pairs(&[]).unwrap(),
            TaxonQuery::Children(String::new())
        );
        assert!(TaxonQuery::from_pairs(&[
            KeyValue::new("name", "x"),
            KeyValue::new("rank", "tribe")
        ])
        .is_err());
    }
}
