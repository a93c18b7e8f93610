/// Secondary indices shared by the stores
pub mod buckets;
pub mod counter;
pub mod extern_index;
pub mod trie;

pub use buckets::TaxonBuckets;
pub use counter::{id_order, IdCounter};
pub use extern_index::ExternIndex;
pub use trie::NameTrie;
