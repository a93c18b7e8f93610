/// Taxon id -> record ids, in insertion order
use indexmap::IndexMap;

#[derive(Debug, Default, Clone)]
pub struct TaxonBuckets {
    buckets: IndexMap<String, Vec<String>>,
}

impl TaxonBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, taxon: &str, id: &str) {
        if taxon.is_empty() {
            return;
        }
        let bucket = self.buckets.entry(taxon.to_string()).or_default();
        if !bucket.iter().any(|x| x == id) {
            bucket.push(id.to_string());
        }
    }

    /// Remove one record; an emptied bucket is pruned
    pub fn remove(&mut self, taxon: &str, id: &str) {
        let emptied = match self.buckets.get_mut(taxon) {
            Some(bucket) => {
                bucket.retain(|x| x != id);
                bucket.is_empty()
            }
            None => false,
        };
        if emptied {
            self.buckets.shift_remove(taxon);
        }
    }

    /// Remove and return the whole bucket
    pub fn take(&mut self, taxon: &str) -> Vec<String> {
        self.buckets.shift_remove(taxon).unwrap_or_default()
    }

    pub fn get(&self, taxon: &str) -> &[String] {
        self.buckets.get(taxon).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of taxa with at least one record
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
