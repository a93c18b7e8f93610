//! Structural assertions over a taxonomy

use taxodb_core::Rank;
use taxodb_storage::TaxonomyStore;

/// Check the invariants every taxonomy must hold after any sequence of
/// operations. Panics with a description of the first violation.
///
/// - every taxon is found in the name index under its own name, and the
///   index holds nothing else
/// - ranked taxa are less inclusive than every ranked ancestor (synonyms
///   may share the rank of their senior)
/// - synonyms have a valid parent and no children
/// - no taxon is its own ancestor
pub fn assert_taxonomy_consistent(taxonomy: &TaxonomyStore) {
    let taxa = taxonomy.pre_order();
    assert_eq!(
        taxa.len(),
        taxonomy.len(),
        "pre-order walk does not reach every taxon"
    );
    assert_eq!(
        taxonomy.names().len(),
        taxonomy.len(),
        "name index size differs from taxonomy size"
    );

    for taxon in taxa {
        assert!(
            taxonomy.names().exact(&taxon.name).contains(&taxon.id),
            "taxon {} ({}) missing from the name index",
            taxon.id,
            taxon.name
        );

        let ancestors: Vec<_> = taxonomy.lineage(&taxon.id).skip(1).collect();
        assert!(
            ancestors.iter().all(|a| a.id != taxon.id),
            "taxon {} is its own ancestor",
            taxon.id
        );

        if !taxon.valid {
            let parent = taxonomy
                .get(&taxon.parent)
                .unwrap_or_else(|| panic!("synonym {} without parent", taxon.id));
            assert!(parent.valid, "synonym {} of synonym {}", taxon.id, parent.id);
            assert!(
                taxonomy.children_ids(&taxon.id).is_empty(),
                "synonym {} has children",
                taxon.id
            );
        }

        if taxon.rank == Rank::Unranked {
            continue;
        }
        for ancestor in ancestors.iter().filter(|a| a.rank.is_ranked()) {
            let fits = if taxon.valid {
                ancestor.rank < taxon.rank
            } else {
                ancestor.rank <= taxon.rank
            };
            assert!(
                fits,
                "{} {} is placed below {} {}",
                taxon.rank,
                taxon.name,
                ancestor.rank,
                ancestor.name
            );
        }
    }
}
