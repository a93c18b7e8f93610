/// Topology edits: delete, collapse and sister re-grafting
///
/// After a subtree is removed or moved away, its former parent is pruned:
/// an internal node must keep at least two children unless it carries a
/// taxon. A childless node is removed (and pruning continues upward), a
/// node left with one child is collapsed into its parent.
use super::{Node, NodeEntry, PhylogenyStore, Tree};
use crate::error::StoreError;
use tracing::debug;

impl PhylogenyStore {
    /// Remove a node's record and taxon binding; links are left to the caller
    fn remove_entry(&mut self, id: &str) -> Option<NodeEntry> {
        let entry = self.nodes.remove(id)?;
        self.unbind(&entry.node.tree, &entry.node.taxon);
        Some(entry)
    }

    fn detach(&mut self, id: &str) {
        let Some(entry) = self.nodes.get(id) else {
            return;
        };
        let parent = entry.node.parent.clone();
        let tree = entry.node.tree.clone();
        if parent.is_empty() {
            if let Some(tree) = self.trees.get_mut(&tree) {
                if tree.root == id {
                    tree.root.clear();
                }
            }
        } else if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.retain(|c| c != id);
        }
    }

    /// Delete a node with its whole subtree, then prune its former parent.
    /// Returns the removed ids.
    pub fn delete_node(&mut self, id: &str) -> Result<Vec<String>, StoreError> {
        let id = id.trim();
        let parent = self.node_entry(id)?.node.parent.clone();
        let removed = self.subtree_pre_order(id);
        self.detach(id);
        for gone in &removed {
            self.remove_entry(gone);
        }
        self.dirty = true;
        if !parent.is_empty() {
            self.prune(&parent)?;
        }
        debug!("node {} deleted with {} descendants", id, removed.len() - 1);
        Ok(removed)
    }

    /// Delete a tree with all of its nodes
    pub fn delete_tree(&mut self, id: &str) -> Result<Tree, StoreError> {
        let id = self.tree_id(id)?;
        let root = self.trees[&id].root.clone();
        for node in self.subtree_pre_order(&root) {
            self.remove_entry(&node);
        }
        let tree = self
            .trees
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("tree", &id))?;
        self.externs.unbind(&tree.externs);
        self.dirty = true;
        Ok(tree)
    }

    fn prune(&mut self, id: &str) -> Result<(), StoreError> {
        let mut current = id.to_string();
        loop {
            let Some(entry) = self.nodes.get(&current) else {
                return Ok(());
            };
            if !entry.node.taxon.is_empty() || entry.children.len() >= 2 {
                return Ok(());
            }
            if entry.children.len() == 1 {
                return self.collapse_unchecked(&current);
            }
            let parent = entry.node.parent.clone();
            debug!("pruning empty node {}", current);
            self.detach(&current);
            self.remove_entry(&current);
            if parent.is_empty() {
                return Ok(());
            }
            current = parent;
        }
    }

    /// Remove a node and hand its children to its parent, at the node's
    /// position. A root may only be collapsed onto a single child.
    pub fn collapse(&mut self, id: &str) -> Result<(), StoreError> {
        let entry = self.node_entry(id)?;
        if entry.children.is_empty() {
            self.delete_node(id)?;
            return Ok(());
        }
        self.collapse_unchecked(id)?;
        self.dirty = true;
        Ok(())
    }

    fn collapse_unchecked(&mut self, id: &str) -> Result<(), StoreError> {
        let entry = self.node_entry(id)?;
        let node = entry.node.clone();
        let children = entry.children.clone();

        if node.parent.is_empty() {
            let [child] = children.as_slice() else {
                return Err(StoreError::InvalidOperation(format!(
                    "root node {} has {} children and can not be collapsed",
                    id,
                    children.len()
                )));
            };
            if let Some(tree) = self.trees.get_mut(&node.tree) {
                tree.root = child.clone();
            }
            if let Ok(child) = self.node_mut(child) {
                child.parent.clear();
            }
        } else {
            let below = self.dated_below(id);
            self.check_fits_under(&node.parent, &below)?;
            for child in &children {
                if let Ok(child) = self.node_mut(child) {
                    child.parent = node.parent.clone();
                    child.len += node.len;
                }
            }
            if let Some(parent) = self.nodes.get_mut(&node.parent) {
                match parent.children.iter().position(|c| c == id) {
                    Some(at) => {
                        parent.children.splice(at..=at, children);
                    }
                    None => parent.children.extend(children),
                }
            }
        }
        self.remove_entry(id);
        debug!("node {} collapsed", id);
        Ok(())
    }

    /// Re-graft `id` (with its subtree) as sister of `target`: a new node
    /// takes the place of `target` and holds both. Returns the new node id.
    pub fn set_sister(&mut self, id: &str, target: &str) -> Result<String, StoreError> {
        let node = self.node_entry(id)?.node.clone();
        let other = self.node_entry(target)?.node.clone();
        if node.tree != other.tree {
            return Err(StoreError::InvalidOperation(format!(
                "nodes {} and {} belong to different trees",
                id, target
            )));
        }
        if id == target {
            return Err(StoreError::InvalidOperation(format!(
                "node {} can not be its own sister",
                id
            )));
        }
        if node.parent.is_empty() {
            return Err(StoreError::InvalidOperation(format!(
                "root node {} can not be moved",
                id
            )));
        }
        if self.is_ancestor(target, id) || self.is_ancestor(id, target) {
            return Err(StoreError::Cycle {
                id: id.to_string(),
                target: target.to_string(),
            });
        }
        if node.parent == other.parent {
            return Err(StoreError::InvalidOperation(format!(
                "nodes {} and {} are already sisters",
                id, target
            )));
        }

        let moved = self.dated_frontier(id);
        self.check_fits_under(&other.parent, &moved)?;

        let old_parent = node.parent.clone();
        self.detach(id);

        let joint = Node {
            id: self.node_ids.next_id(),
            tree: other.tree.clone(),
            parent: other.parent.clone(),
            ..Default::default()
        };
        let joint_id = joint.id.clone();
        if other.parent.is_empty() {
            if let Some(tree) = self.trees.get_mut(&other.tree) {
                tree.root = joint_id.clone();
            }
        } else if let Some(parent) = self.nodes.get_mut(&other.parent) {
            for c in parent.children.iter_mut().filter(|c| c.as_str() == target) {
                *c = joint_id.clone();
            }
        }
        self.nodes.insert(
            joint_id.clone(),
            NodeEntry {
                node: joint,
                children: vec![target.to_string(), id.to_string()],
            },
        );
        self.node_mut(target)?.parent = joint_id.clone();
        self.node_mut(id)?.parent = joint_id.clone();

        self.dirty = true;
        self.prune(&old_parent)?;
        debug!("node {} is now sister of {} under {}", id, target, joint_id);
        Ok(joint_id)
    }

    /// Drop every binding to `taxon`, keeping the nodes
    pub fn unbind_taxon(&mut self, taxon: &str) -> usize {
        let Some(trees) = self.taxa.remove(taxon) else {
            return 0;
        };
        for node in trees.values() {
            if let Ok(node) = self.node_mut(node) {
                node.taxon.clear();
            }
        }
        self.dirty = true;
        trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::taxonomy;
    use super::super::{Node, NodeQuery, PhylogenyStore, Tree};
    use crate::error::StoreError;
    use crate::taxonomy::TaxonomyStore;
    use pretty_assertions::assert_eq;
    use taxodb_core::KeyValue;

    /// root(1) -> a(2) -> Lynx(3), Felis(4)
    ///         -> b(5) -> Panthera(6), Puma(7)
    fn cats(taxonomy: &TaxonomyStore) -> (PhylogenyStore, String) {
        let mut store = PhylogenyStore::new();
        let tree = store.add_tree(Tree::new("Felidae")).unwrap();
        let root = store.add_node(Node::root(&tree), taxonomy).unwrap();
        let a = store.add_node(Node::child(&root), taxonomy).unwrap();
        store.add_node(Node::child(&a).with_taxon("2"), taxonomy).unwrap();
        store.add_node(Node::child(&a).with_taxon("3"), taxonomy).unwrap();
        let b = store.add_node(Node::child(&root), taxonomy).unwrap();
        store.add_node(Node::child(&b).with_taxon("4"), taxonomy).unwrap();
        store.add_node(Node::child(&b).with_taxon("5"), taxonomy).unwrap();
        (store, tree)
    }

    fn shape(store: &PhylogenyStore, tree: &str) -> Vec<(String, String)> {
        store
            .list(&NodeQuery::Tree(tree.to_string()))
            .unwrap()
            .into_iter()
            .map(|n| (n.id, n.parent))
            .collect()
    }

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    /// root(1, age 20) -> mid(2) -> a(3), b(4, age 5)
    ///                  -> c(5, age 1)
    fn dated(taxonomy: &TaxonomyStore) -> (PhylogenyStore, String) {
        let mut store = PhylogenyStore::new();
        let tree = store.add_tree(Tree::new("Dated")).unwrap();
        let root = store
            .add_node(Node::root(&tree).with_age(20), taxonomy)
            .unwrap();
        let mid = store.add_node(Node::child(&root), taxonomy).unwrap();
        store.add_node(Node::child(&mid), taxonomy).unwrap();
        store
            .add_node(Node::child(&mid).with_age(5), taxonomy)
            .unwrap();
        store
            .add_node(Node::child(&root).with_age(1), taxonomy)
            .unwrap();
        (store, tree)
    }

    fn assert_ages_ordered(store: &PhylogenyStore, tree: &str) {
        for node in store.list(&NodeQuery::Tree(tree.to_string())).unwrap() {
            if node.age == 0 {
                continue;
            }
            if let Some(bound) = store.dated_ancestor(&node.parent) {
                assert!(
                    node.age <= bound.age,
                    "node {} aged {} sits under {} aged {}",
                    node.id,
                    node.age,
                    bound.id,
                    bound.age
                );
            }
        }
    }

    #[test]
    fn test_add_node_bounded_by_nearest_dated_ancestor() {
        let taxonomy = taxonomy();
        let (mut store, tree) = dated(&taxonomy);
        assert!(matches!(
            store.add_node(Node::child("2").with_age(30), &taxonomy),
            Err(StoreError::AgeConflict { other, other_age: 20, .. }) if other == "1"
        ));
        store
            .add_node(Node::child("2").with_age(15), &taxonomy)
            .unwrap();
        assert_ages_ordered(&store, &tree);
    }

    #[test]
    fn test_set_age_looks_through_undated_nodes() {
        let taxonomy = taxonomy();
        let (mut store, tree) = dated(&taxonomy);
        let age = |v: &str| [KeyValue::new("age", v)];
        assert!(store.set_node("3", &age("30"), &taxonomy).is_err());
        // node 4 (age 5) sits below the undated node 2
        assert!(store.set_node("1", &age("4"), &taxonomy).is_err());
        assert!(store.set_node("2", &age("3"), &taxonomy).is_err());
        store.set_node("2", &age("10"), &taxonomy).unwrap();
        store.set_node("3", &age("10"), &taxonomy).unwrap();
        assert_ages_ordered(&store, &tree);
    }

    #[test]
    fn test_collapse_keeps_ages_ordered() {
        let taxonomy = taxonomy();
        let (mut store, tree) = dated(&taxonomy);
        store
            .set_node("2", &[KeyValue::new("collapse", "")], &taxonomy)
            .unwrap();
        assert_eq!(
            shape(&store, &tree),
            pairs(&[("1", ""), ("3", "1"), ("4", "1"), ("5", "1")])
        );
        assert_ages_ordered(&store, &tree);
    }

    #[test]
    fn test_collapse_rejects_child_older_than_grandparent() {
        let taxonomy = taxonomy();
        let (mut store, tree) = dated(&taxonomy);
        store.node_mut("3").unwrap().age = 30;
        let before = shape(&store, &tree);
        assert!(matches!(
            store.set_node("2", &[KeyValue::new("collapse", "")], &taxonomy),
            Err(StoreError::AgeConflict { node, other, .. }) if node == "3" && other == "1"
        ));
        assert_eq!(shape(&store, &tree), before);
    }

    #[test]
    fn test_auto_collapse_after_delete() {
        let taxonomy = taxonomy();
        let (mut store, tree) = dated(&taxonomy);
        store.delete_node("4").unwrap();
        assert_eq!(
            shape(&store, &tree),
            pairs(&[("1", ""), ("3", "1"), ("5", "1")])
        );
        assert_ages_ordered(&store, &tree);

        let (mut store, _) = dated(&taxonomy);
        store.node_mut("3").unwrap().age = 30;
        assert!(matches!(
            store.delete_node("4"),
            Err(StoreError::AgeConflict { .. })
        ));
    }

    #[test]
    fn test_set_sister_checks_ages() {
        // root(50) -> x(20) -> p(10), q
        //          -> y(40) -> s(30), t
        let taxonomy = taxonomy();
        let mut store = PhylogenyStore::new();
        let tree = store.add_tree(Tree::new("Moves")).unwrap();
        let root = store
            .add_node(Node::root(&tree).with_age(50), &taxonomy)
            .unwrap();
        for (parent, age) in [(&root, 20), (&root, 40)] {
            let inner = store
                .add_node(Node::child(parent.as_str()).with_age(age), &taxonomy)
                .unwrap();
            store
                .add_node(Node::child(&inner).with_age(age - 10), &taxonomy)
                .unwrap();
            store.add_node(Node::child(&inner), &taxonomy).unwrap();
        }
        assert_eq!(store.node("6").unwrap().age, 30);

        assert!(matches!(
            store.set_sister("6", "4"),
            Err(StoreError::AgeConflict { node, other, .. }) if node == "6" && other == "2"
        ));
        assert_eq!(store.node_count(), 7);
        assert_eq!(store.node("6").unwrap().parent, "5");

        // an undated subtree may move anywhere
        store.set_sister("7", "4").unwrap();
        assert_ages_ordered(&store, &tree);
    }

    #[test]
    fn test_delete_collapses_single_child_parent() {
        let taxonomy = taxonomy();
        let (mut store, tree) = cats(&taxonomy);
        let removed = store.delete_node("3").unwrap();
        assert_eq!(removed, vec!["3"]);
        // node 2 was left with one child and collapsed into the root
        assert_eq!(
            shape(&store, &tree),
            pairs(&[("1", ""), ("4", "1"), ("5", "1"), ("6", "5"), ("7", "5")])
        );
        assert_eq!(store.node_of_taxon(&tree, "2"), None);
    }

    #[test]
    fn test_delete_subtree_prunes_upward() {
        let taxonomy = taxonomy();
        let (mut store, tree) = cats(&taxonomy);
        let removed = store.delete_node("5").unwrap();
        assert_eq!(removed, vec!["5", "6", "7"]);
        // root kept one child and was collapsed onto it
        assert_eq!(store.tree(&tree).unwrap().root, "2");
        assert_eq!(shape(&store, &tree), pairs(&[("2", ""), ("3", "2"), ("4", "2")]));
        assert_eq!(store.node_of_taxon(&tree, "4"), None);
    }

    #[test]
    fn test_collapse_adds_branch_lengths() {
        let taxonomy = taxonomy();
        let (mut store, tree) = cats(&taxonomy);
        store.node_mut("2").unwrap().len = 5;
        store.node_mut("3").unwrap().len = 1;
        store.collapse("2").unwrap();
        assert_eq!(
            shape(&store, &tree),
            pairs(&[("1", ""), ("3", "1"), ("4", "1"), ("5", "1"), ("6", "5"), ("7", "5")])
        );
        assert_eq!(store.node("3").unwrap().len, 6);
    }

    #[test]
    fn test_root_collapse_needs_single_child() {
        let taxonomy = taxonomy();
        let (mut store, _) = cats(&taxonomy);
        assert!(matches!(
            store.collapse("1"),
            Err(StoreError::InvalidOperation(_))
        ));
        assert_eq!(store.node_count(), 7);
    }

    #[test]
    fn test_set_sister_regrafts_subtree() {
        let taxonomy = taxonomy();
        let (mut store, tree) = cats(&taxonomy);
        // move Felis next to Puma
        let joint = store.set_sister("4", "7").unwrap();
        assert_eq!(joint, "8");
        assert_eq!(
            shape(&store, &tree),
            pairs(&[
                ("1", ""),
                ("3", "1"),
                ("5", "1"),
                ("6", "5"),
                ("8", "5"),
                ("7", "8"),
                ("4", "8"),
            ])
        );
    }

    #[test]
    fn test_set_sister_guards() {
        let taxonomy = taxonomy();
        let (mut store, _) = cats(&taxonomy);
        assert!(matches!(store.set_sister("3", "4"), Err(StoreError::InvalidOperation(_))));
        assert!(matches!(store.set_sister("3", "2"), Err(StoreError::Cycle { .. })));
        assert!(matches!(store.set_sister("2", "3"), Err(StoreError::Cycle { .. })));
        assert!(matches!(store.set_sister("1", "6"), Err(StoreError::InvalidOperation(_))));
        assert!(store.set_sister("3", "3").is_err());
        assert_eq!(store.node_count(), 7);
    }

    #[test]
    fn test_set_sister_of_root() {
        let taxonomy = taxonomy();
        let (mut store, tree) = cats(&taxonomy);
        let joint = store.set_sister("6", "2").unwrap();
        // node 5 lost a child and collapsed into the root
        assert_eq!(
            shape(&store, &tree),
            pairs(&[
                ("1", ""),
                ("8", "1"),
                ("2", "8"),
                ("3", "2"),
                ("4", "2"),
                ("6", "8"),
                ("7", "1"),
            ])
        );
        assert_eq!(joint, "8");
    }

    #[test]
    fn test_unbind_and_delete_tree() {
        let taxonomy = taxonomy();
        let (mut store, tree) = cats(&taxonomy);
        assert_eq!(store.unbind_taxon("4"), 1);
        assert_eq!(store.node("6").unwrap().taxon, "");
        assert_eq!(store.node_count(), 7);

        store.delete_tree(&tree).unwrap();
        assert_eq!(store.node_count(), 0);
        assert_eq!(store.tree_count(), 0);
        assert_eq!(store.node_of_taxon(&tree, "5"), None);
    }
}
