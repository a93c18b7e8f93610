//! Read-only taxonomy sources
//!
//! [`TaxonomyProvider`] is the shape shared by every source a taxonomy can
//! be read from: a remote taxodb server, a local data directory, or an
//! adapter over an external service.

use crate::client::Client;
use async_trait::async_trait;
use taxodb_core::{KeyValue, Table, TaxoResult};
use taxodb_storage::{Database, Record, Taxon};

#[async_trait]
pub trait TaxonomyProvider: Send + Sync {
    /// Taxon by id (or by an id the source understands), `None` if unknown
    async fn taxon(&self, id: &str) -> TaxoResult<Option<Taxon>>;

    /// Taxa matching a list query, with the same keys as a taxonomy `list`
    async fn taxa(&self, query: &[KeyValue]) -> TaxoResult<Vec<Taxon>>;
}

#[async_trait]
impl TaxonomyProvider for Client {
    async fn taxon(&self, id: &str) -> TaxoResult<Option<Taxon>> {
        self.get(Table::Taxonomy, id).await
    }

    async fn taxa(&self, query: &[KeyValue]) -> TaxoResult<Vec<Taxon>> {
        self.list(Table::Taxonomy, query.to_vec()).await?.collect().await
    }
}

fn into_taxon(record: Record) -> Option<Taxon> {
    match record {
        Record::Taxon(taxon) => Some(taxon),
        _ => None,
    }
}

#[async_trait]
impl TaxonomyProvider for Database {
    async fn taxon(&self, id: &str) -> TaxoResult<Option<Taxon>> {
        Ok(self.get(Table::Taxonomy, id)?.and_then(into_taxon))
    }

    async fn taxa(&self, query: &[KeyValue]) -> TaxoResult<Vec<Taxon>> {
        Ok(self
            .list(Table::Taxonomy, query)?
            .into_iter()
            .filter_map(into_taxon)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_database_provider() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let id = db
            .add(
                Table::Taxonomy,
                &[KeyValue::new("name", "Canis"), KeyValue::new("rank", "genus")],
            )
            .unwrap();

        let provider: &dyn TaxonomyProvider = &db;
        let taxon = provider.taxon(&id).await.unwrap().unwrap();
        assert_eq!(taxon.name, "Canis");
        assert!(provider.taxon("99").await.unwrap().is_none());

        let taxa = provider
            .taxa(&[KeyValue::new("name", "can*")])
            .await
            .unwrap();
        assert_eq!(taxa.len(), 1);
    }
}
