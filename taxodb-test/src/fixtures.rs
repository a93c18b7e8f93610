//! Sample data shared by the integration tests

use anyhow::Result;
use taxodb_core::{KeyValue, Table};
use taxodb_storage::Database;

/// Build request pairs from string tuples
pub fn kv(pairs: &[(&str, &str)]) -> Vec<KeyValue> {
    pairs.iter().map(|(k, v)| KeyValue::new(*k, *v)).collect()
}

/// Ids of the sample taxonomy
///
/// ```text
/// Animalia (kingdom)
/// └── Chordata (phylum)
///     └── Mammalia (class)
///         └── Carnivora (order)
///             ├── Canidae (family)
///             │   └── Canis (genus)
///             │       ├── Canis lupus (species)
///             │       └── Canis latrans (species)
///             └── Felidae (family)
///                 └── Lynx (genus)
///                     └── Lynx rufus (species)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTaxa {
    pub animalia: String,
    pub chordata: String,
    pub mammalia: String,
    pub carnivora: String,
    pub canidae: String,
    pub canis: String,
    pub lupus: String,
    pub latrans: String,
    pub felidae: String,
    pub lynx: String,
    pub rufus: String,
}

impl SampleTaxa {
    /// Add the sample taxonomy to `db`
    pub fn build(db: &Database) -> Result<Self> {
        let add = |name: &str, rank: &str, parent: &str| -> Result<String> {
            let mut pairs = kv(&[("name", name), ("rank", rank)]);
            if !parent.is_empty() {
                pairs.push(KeyValue::new("parent", parent));
            }
            Ok(db.add(Table::Taxonomy, &pairs)?)
        };

        let animalia = add("Animalia", "kingdom", "")?;
        let chordata = add("Chordata", "phylum", &animalia)?;
        let mammalia = add("Mammalia", "class", &chordata)?;
        let carnivora = add("Carnivora", "order", &mammalia)?;
        let canidae = add("Canidae", "family", &carnivora)?;
        let canis = add("Canis", "genus", &canidae)?;
        let lupus = add("Canis lupus", "species", &canis)?;
        let latrans = add("Canis latrans", "species", &canis)?;
        let felidae = add("Felidae", "family", &carnivora)?;
        let lynx = add("Lynx", "genus", &felidae)?;
        let rufus = add("Lynx rufus", "species", &lynx)?;

        Ok(Self {
            animalia,
            chordata,
            mammalia,
            carnivora,
            canidae,
            canis,
            lupus,
            latrans,
            felidae,
            lynx,
            rufus,
        })
    }

    /// Every id, in insertion order
    pub fn ids(&self) -> Vec<&str> {
        vec![
            &self.animalia,
            &self.chordata,
            &self.mammalia,
            &self.carnivora,
            &self.canidae,
            &self.canis,
            &self.lupus,
            &self.latrans,
            &self.felidae,
            &self.lynx,
            &self.rufus,
        ]
    }
}

/// Add a specimen of `taxon` and return its id
pub fn add_specimen(db: &Database, taxon: &str, extra: &[(&str, &str)]) -> Result<String> {
    let mut pairs = kv(&[("taxon", taxon)]);
    pairs.extend(kv(extra));
    Ok(db.add(Table::Specimens, &pairs)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestEnvironment;

    #[test]
    fn test_sample_taxonomy() {
        let env = TestEnvironment::new().unwrap();
        let db = env.open_database().unwrap();
        let taxa = SampleTaxa::build(&db).unwrap();

        assert_eq!(taxa.ids().len(), 11);
        db.with_stores(|stores| {
            assert_eq!(stores.taxonomy.len(), 11);
            assert!(stores.taxonomy.is_descendant(&taxa.rufus, &taxa.carnivora));
            assert!(!stores.taxonomy.is_descendant(&taxa.rufus, &taxa.canidae));
        });
    }

    #[test]
    fn test_add_specimen() {
        let env = TestEnvironment::new().unwrap();
        let db = env.open_database().unwrap();
        let taxa = SampleTaxa::build(&db).unwrap();

        let id = add_specimen(&db, &taxa.lupus, &[("country", "mx")]).unwrap();
        let country = db.with_stores(|s| s.specimens.get(&id).map(|r| r.country.clone()));
        assert_eq!(country.as_deref(), Some("MX"));
    }
}
