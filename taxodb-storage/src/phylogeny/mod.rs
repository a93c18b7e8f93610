//! Phylogenetic trees
//!
//! A separate forest from the taxonomy: every tree has at most one root
//! node, and nodes keep their parent id and an ordered child list in an
//! id-indexed arena, like the taxonomy does. A node may be bound to a
//! taxon; a taxon is bound to at most one node per tree, which the
//! `taxa` index (taxon -> tree -> node) enforces.

mod ops;

use crate::error::StoreError;
use crate::index::extern_index::{parse_externs, retain_free};
use crate::index::{id_order, ExternIndex, IdCounter};
use crate::persist;
use crate::taxonomy::TaxonomyStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use taxodb_core::types::lookup;
use taxodb_core::{ExternId, KeyValue};
use tracing::{debug, warn};

fn is_zero(v: &u64) -> bool {
    *v == 0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub root: String,
    #[serde(default, rename = "extern", skip_serializing_if = "Vec::is_empty")]
    pub externs: Vec<ExternId>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

impl Tree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_pairs(pairs: &[KeyValue]) -> Result<Self, StoreError> {
        let mut tree = Tree::default();
        for kv in pairs {
            match kv.key.as_str() {
                "id" | "extern" => {}
                "name" => tree.name = kv.value.trim().to_string(),
                "comment" => tree.comment = kv.value.clone(),
                other => return Err(StoreError::UnknownKey(other.to_string())),
            }
        }
        tree.externs = parse_externs(
            pairs
                .iter()
                .filter(|kv| kv.key == "extern")
                .map(|kv| kv.value.as_str()),
        )?;
        Ok(tree)
    }
}

/// A tree node. `len` (branch length) and `age` are 0 when unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub id: String,
    pub tree: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub taxon: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub len: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub age: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

fn parse_u64(key: &str, value: &str) -> Result<u64, StoreError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse()
        .map_err(|_| StoreError::invalid(key, value, "expecting an unsigned integer"))
}

impl Node {
    pub fn root(tree: impl Into<String>) -> Self {
        Self {
            tree: tree.into(),
            ..Default::default()
        }
    }

    pub fn child(parent: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            ..Default::default()
        }
    }

    pub fn with_taxon(mut self, taxon: impl Into<String>) -> Self {
        self.taxon = taxon.into();
        self
    }

    pub fn with_age(mut self, age: u64) -> Self {
        self.age = age;
        self
    }

    pub fn from_pairs(pairs: &[KeyValue]) -> Result<Self, StoreError> {
        let mut node = Node::default();
        for kv in pairs {
            let value = kv.value.trim();
            match kv.key.as_str() {
                "id" => {}
                "tree" => node.tree = value.to_string(),
                "parent" => node.parent = value.to_string(),
                "taxon" => node.taxon = value.to_string(),
                "len" => node.len = parse_u64("len", value)?,
                "age" => node.age = parse_u64("age", value)?,
                "comment" => node.comment = kv.value.clone(),
                other => return Err(StoreError::UnknownKey(other.to_string())),
            }
        }
        Ok(node)
    }
}

#[derive(Debug, Clone)]
struct NodeEntry {
    node: Node,
    children: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeQuery {
    /// Every node of a tree, parents before children
    Tree(String),
    Children(String),
    /// Ancestors, nearest first
    Parents(String),
    /// Nodes bound to a taxon, optionally in one tree only
    Taxon { taxon: String, tree: Option<String> },
}

impl NodeQuery {
    pub fn from_pairs(pairs: &[KeyValue]) -> Result<Self, StoreError> {
        let tree = lookup(pairs, "tree").map(|t| t.trim().to_string());
        if let Some(id) = lookup(pairs, "children") {
            return Ok(NodeQuery::Children(id.trim().to_string()));
        }
        if let Some(id) = lookup(pairs, "parent") {
            return Ok(NodeQuery::Parents(id.trim().to_string()));
        }
        if let Some(taxon) = lookup(pairs, "taxon") {
            return Ok(NodeQuery::Taxon {
                taxon: taxon.trim().to_string(),
                tree: tree.filter(|t| !t.is_empty()),
            });
        }
        match tree {
            Some(tree) => Ok(NodeQuery::Tree(tree)),
            None => Err(StoreError::InvalidOperation(
                "node list needs one of tree, children, parent or taxon".to_string(),
            )),
        }
    }
}

#[derive(Debug, Default)]
pub struct PhylogenyStore {
    trees: HashMap<String, Tree>,
    nodes: HashMap<String, NodeEntry>,
    taxa: HashMap<String, BTreeMap<String, String>>,
    externs: ExternIndex,
    tree_ids: IdCounter,
    node_ids: IdCounter,
    dirty: bool,
}

impl PhylogenyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
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

    pub fn resolve_tree(&self, id: &str) -> Option<&str> {
        let id = id.trim();
        if let Some((key, _)) = self.trees.get_key_value(id) {
            return Some(key.as_str());
        }
        if ExternId::is_alias(id) {
            return self.externs.resolve(id);
        }
        None
    }

    pub fn tree(&self, id: &str) -> Option<&Tree> {
        self.trees.get(self.resolve_tree(id)?)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id.trim()).map(|e| &e.node)
    }

    /// Every tree in id order
    pub fn trees(&self) -> Vec<&Tree> {
        let mut all: Vec<&Tree> = self.trees.values().collect();
        all.sort_by(|a, b| id_order(&a.id, &b.id));
        all
    }

    pub fn children_ids(&self, id: &str) -> &[String] {
        self.nodes
            .get(id)
            .map(|e| e.children.as_slice())
            .unwrap_or(&[])
    }

    /// Node bound to `taxon` in `tree`
    pub fn node_of_taxon(&self, tree: &str, taxon: &str) -> Option<&str> {
        self.taxa.get(taxon)?.get(tree).map(String::as_str)
    }

    /// `id` and its ancestors, nearest first
    fn lineage(&self, id: &str) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut next = self.nodes.get(id);
        while let Some(entry) = next {
            out.push(&entry.node);
            next = if entry.node.parent.is_empty() {
                None
            } else {
                self.nodes.get(&entry.node.parent)
            };
        }
        out
    }

    /// Nearest dated node among `id` and its ancestors
    fn dated_ancestor(&self, id: &str) -> Option<&Node> {
        self.lineage(id).into_iter().find(|n| n.age > 0)
    }

    /// Nearest dated nodes below `id`, one per path; undated nodes are
    /// looked through
    fn dated_below(&self, id: &str) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut stack: Vec<&str> = self.children_ids(id).iter().map(String::as_str).collect();
        while let Some(current) = stack.pop() {
            let Some(entry) = self.nodes.get(current) else {
                continue;
            };
            if entry.node.age > 0 {
                out.push(&entry.node);
            } else {
                stack.extend(entry.children.iter().map(String::as_str));
            }
        }
        out
    }

    /// The dated nodes a move of `id` carries along: the node itself when
    /// dated, otherwise the nearest dated nodes below it
    fn dated_frontier(&self, id: &str) -> Vec<&Node> {
        match self.nodes.get(id) {
            Some(entry) if entry.node.age > 0 => vec![&entry.node],
            _ => self.dated_below(id),
        }
    }

    /// Fail when any of `nodes` is older than the nearest dated node at or
    /// above `parent`
    fn check_fits_under(&self, parent: &str, nodes: &[&Node]) -> Result<(), StoreError> {
        let Some(bound) = self.dated_ancestor(parent) else {
            return Ok(());
        };
        match nodes.iter().find(|n| n.age > bound.age) {
            Some(n) => Err(StoreError::AgeConflict {
                node: n.id.clone(),
                age: n.age,
                other: bound.id.clone(),
                other_age: bound.age,
            }),
            None => Ok(()),
        }
    }

    /// True when `ancestor` is a proper ancestor of `id`
    pub fn is_ancestor(&self, ancestor: &str, id: &str) -> bool {
        self.lineage(id).iter().skip(1).any(|n| n.id == ancestor)
    }

    /// `id` and its descendants, parents before children
    pub fn subtree_pre_order(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        if !self.nodes.contains_key(id) {
            return out;
        }
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            stack.extend(self.children_ids(&current).iter().rev().cloned());
            out.push(current);
        }
        out
    }

    fn tree_id(&self, id: &str) -> Result<String, StoreError> {
        self.resolve_tree(id)
            .map(str::to_string)
            .ok_or_else(|| StoreError::not_found("tree", id))
    }

    fn node_entry(&self, id: &str) -> Result<&NodeEntry, StoreError> {
        self.nodes
            .get(id)
            .ok_or_else(|| StoreError::not_found("node", id))
    }

    pub fn add_tree(&mut self, mut tree: Tree) -> Result<String, StoreError> {
        tree.name = tree.name.trim().to_string();
        if tree.name.is_empty() {
            return Err(StoreError::MissingName("tree"));
        }
        self.externs.check_new(&tree.externs)?;
        tree.root.clear();
        tree.id = self.tree_ids.next_id();
        let id = tree.id.clone();
        self.externs.bind(&id, &tree.externs);
        self.trees.insert(id.clone(), tree);
        self.dirty = true;
        debug!("tree {} added", id);
        Ok(id)
    }

    /// Check that `taxon` may be bound to `node` in `tree`; returns the
    /// canonical taxon id
    fn check_binding(
        &self,
        tree: &str,
        node: &str,
        taxon: &str,
        taxonomy: &TaxonomyStore,
    ) -> Result<String, StoreError> {
        let id = taxonomy
            .resolve(taxon)
            .ok_or_else(|| StoreError::UnknownTaxon(taxon.to_string()))?;
        match self.node_of_taxon(tree, id) {
            Some(bound) if bound != node => Err(StoreError::InvalidOperation(format!(
                "taxon {} already assigned to node {} of tree {}",
                id, bound, tree
            ))),
            _ => Ok(id.to_string()),
        }
    }

    fn bind(&mut self, tree: &str, node: &str, taxon: &str) {
        if taxon.is_empty() {
            return;
        }
        self.taxa
            .entry(taxon.to_string())
            .or_default()
            .insert(tree.to_string(), node.to_string());
    }

    fn unbind(&mut self, tree: &str, taxon: &str) {
        if let Some(trees) = self.taxa.get_mut(taxon) {
            trees.remove(tree);
            if trees.is_empty() {
                self.taxa.remove(taxon);
            }
        }
    }

    /// Add a node. Without a parent it becomes the root of its (still
    /// empty) tree; with one it is appended to the parent's children.
    pub fn add_node(&mut self, mut node: Node, taxonomy: &TaxonomyStore) -> Result<String, StoreError> {
        node.parent = node.parent.trim().to_string();
        if node.parent.is_empty() {
            if node.tree.trim().is_empty() {
                return Err(StoreError::MissingField("tree"));
            }
            node.tree = self.tree_id(&node.tree)?;
            if !self.trees[&node.tree].root.is_empty() {
                return Err(StoreError::InvalidOperation(format!(
                    "tree {} already has a root",
                    node.tree
                )));
            }
        } else {
            let parent = &self.node_entry(&node.parent)?.node;
            if !node.tree.trim().is_empty() && self.tree_id(&node.tree)? != parent.tree {
                return Err(StoreError::InvalidOperation(format!(
                    "parent {} belongs to tree {}",
                    parent.id, parent.tree
                )));
            }
            if let Some(bound) = self.dated_ancestor(&parent.id) {
                if node.age > bound.age {
                    return Err(StoreError::AgeConflict {
                        node: "new node".to_string(),
                        age: node.age,
                        other: bound.id.clone(),
                        other_age: bound.age,
                    });
                }
            }
            node.tree = parent.tree.clone();
        }
        node.taxon = node.taxon.trim().to_string();
        if !node.taxon.is_empty() {
            node.taxon = self.check_binding(&node.tree, "", &node.taxon, taxonomy)?;
        }

        node.id = self.node_ids.next_id();
        let id = node.id.clone();
        self.insert_unchecked(node);
        self.dirty = true;
        debug!("node {} added", id);
        Ok(id)
    }

    fn insert_unchecked(&mut self, node: Node) {
        let id = node.id.clone();
        if node.parent.is_empty() {
            if let Some(tree) = self.trees.get_mut(&node.tree) {
                tree.root = id.clone();
            }
        } else if let Some(parent) = self.nodes.get_mut(&node.parent) {
            parent.children.push(id.clone());
        }
        self.bind(&node.tree, &id, &node.taxon);
        self.nodes.insert(
            id,
            NodeEntry {
                node,
                children: Vec::new(),
            },
        );
    }

    pub fn set_tree(&mut self, id: &str, pairs: &[KeyValue]) -> Result<(), StoreError> {
        let id = self.tree_id(id)?;
        for kv in pairs.iter().filter(|kv| kv.key != "id") {
            let Some(tree) = self.trees.get_mut(&id) else {
                break;
            };
            match kv.key.as_str() {
                "name" => {
                    let name = kv.value.trim();
                    if name.is_empty() {
                        return Err(StoreError::MissingName("tree"));
                    }
                    tree.name = name.to_string();
                }
                "comment" => tree.comment = kv.value.clone(),
                "extern" => self.externs.edit(&id, &mut tree.externs, &kv.value)?,
                other => return Err(StoreError::UnknownKey(other.to_string())),
            }
            self.dirty = true;
        }
        Ok(())
    }

    /// Apply node edits in order; stops at the first error
    pub fn set_node(
        &mut self,
        id: &str,
        pairs: &[KeyValue],
        taxonomy: &TaxonomyStore,
    ) -> Result<(), StoreError> {
        let id = id.trim();
        self.node_entry(id)?;
        for kv in pairs.iter().filter(|kv| kv.key != "id") {
            self.set_node_field(id, &kv.key, &kv.value, taxonomy)?;
            self.dirty = true;
        }
        Ok(())
    }

    fn set_node_field(
        &mut self,
        id: &str,
        key: &str,
        value: &str,
        taxonomy: &TaxonomyStore,
    ) -> Result<(), StoreError> {
        let entry = self.node_entry(id)?;
        let tree = entry.node.tree.clone();
        match key {
            "taxon" => {
                let value = value.trim();
                let taxon = if value.is_empty() {
                    String::new()
                } else {
                    self.check_binding(&tree, id, value, taxonomy)?
                };
                let old = std::mem::replace(&mut self.node_mut(id)?.taxon, taxon.clone());
                self.unbind(&tree, &old);
                self.bind(&tree, id, &taxon);
            }
            "len" => self.node_mut(id)?.len = parse_u64(key, value)?,
            "age" => {
                let age = parse_u64(key, value)?;
                self.check_age(id, age)?;
                self.node_mut(id)?.age = age;
            }
            "comment" => self.node_mut(id)?.comment = value.to_string(),
            "collapse" => {
                self.collapse(id)?;
            }
            "sister" => {
                self.set_sister(id, value.trim())?;
            }
            other => return Err(StoreError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut Node, StoreError> {
        self.nodes
            .get_mut(id)
            .map(|e| &mut e.node)
            .ok_or_else(|| StoreError::not_found("node", id))
    }

    /// A set age must fit between the nearest dated ancestor and the
    /// nearest dated descendants
    fn check_age(&self, id: &str, age: u64) -> Result<(), StoreError> {
        if age == 0 {
            return Ok(());
        }
        let entry = self.node_entry(id)?;
        if let Some(bound) = self.dated_ancestor(&entry.node.parent) {
            if age > bound.age {
                return Err(StoreError::AgeConflict {
                    node: id.to_string(),
                    age,
                    other: bound.id.clone(),
                    other_age: bound.age,
                });
            }
        }
        if let Some(older) = self.dated_below(id).into_iter().find(|n| n.age > age) {
            return Err(StoreError::AgeConflict {
                node: id.to_string(),
                age,
                other: older.id.clone(),
                other_age: older.age,
            });
        }
        Ok(())
    }

    pub fn list(&self, query: &NodeQuery) -> Result<Vec<Node>, StoreError> {
        let ids: Vec<String> = match query {
            NodeQuery::Tree(tree) => {
                let tree = self
                    .tree(tree)
                    .ok_or_else(|| StoreError::not_found("tree", tree.as_str()))?;
                self.subtree_pre_order(&tree.root)
            }
            NodeQuery::Children(id) => self.node_entry(id)?.children.clone(),
            NodeQuery::Parents(id) => {
                self.node_entry(id)?;
                self.lineage(id).iter().skip(1).map(|n| n.id.clone()).collect()
            }
            NodeQuery::Taxon { taxon, tree } => {
                let taxon = taxon.trim();
                let mut ids: Vec<String> = match self.taxa.get(taxon) {
                    Some(trees) => match tree {
                        Some(tree) => {
                            let tree = self.tree_id(tree)?;
                            trees.get(&tree).cloned().into_iter().collect()
                        }
                        None => trees.values().cloned().collect(),
                    },
                    None => Vec::new(),
                };
                ids.sort_by(|a, b| id_order(a, b));
                ids
            }
        };
        Ok(ids
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|e| e.node.clone())
            .collect())
    }

    pub fn tree_lines(&self) -> Result<Vec<String>, serde_json::Error> {
        persist::to_lines(self.trees())
    }

    /// Nodes tree by tree, each tree in pre-order
    pub fn node_lines(&self) -> Result<Vec<String>, serde_json::Error> {
        let nodes: Vec<&Node> = self
            .trees()
            .iter()
            .flat_map(|tree| self.subtree_pre_order(&tree.root))
            .filter_map(|id| self.nodes.get(&id).map(|e| &e.node))
            .collect();
        persist::to_lines(nodes)
    }

    pub fn load_trees(&mut self, path: &Path) -> Result<usize, StoreError> {
        let records: Vec<Tree> = persist::read_records(path)?;
        let mut loaded = 0;
        for mut tree in records {
            if tree.id.is_empty() || self.trees.contains_key(&tree.id) {
                warn!("{}: skipping tree with missing or duplicated id {:?}", path.display(), tree.id);
                continue;
            }
            for ext in retain_free(&self.externs, &mut tree.externs) {
                warn!("tree {}: dropping duplicated extern id {}", tree.id, ext);
            }
            // reassigned when the root node is read
            tree.root.clear();
            self.tree_ids.observe(&tree.id);
            self.externs.bind(&tree.id, &tree.externs);
            self.trees.insert(tree.id.clone(), tree);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Load nodes written parents first. Nodes whose tree or parent is
    /// missing are skipped; dangling or repeated taxon bindings are cleared.
    pub fn load_nodes(&mut self, path: &Path, taxonomy: &TaxonomyStore) -> Result<usize, StoreError> {
        let records: Vec<Node> = persist::read_records(path)?;
        let mut loaded = 0;
        for mut node in records {
            if let Err(e) = self.check_loaded(&node) {
                warn!("{}: skipping node {}: {}", path.display(), node.id, e);
                continue;
            }
            if !node.taxon.is_empty() {
                match self.check_binding(&node.tree, &node.id, &node.taxon, taxonomy) {
                    Ok(taxon) => node.taxon = taxon,
                    Err(e) => {
                        warn!("node {}: clearing taxon: {}", node.id, e);
                        node.taxon.clear();
                    }
                }
            }
            let fits = self.check_fits_under(&node.parent, &[&node]);
            if let Err(e) = fits {
                warn!("node {}: clearing age: {}", node.id, e);
                node.age = 0;
            }
            self.node_ids.observe(&node.id);
            self.insert_unchecked(node);
            loaded += 1;
        }
        Ok(loaded)
    }

    fn check_loaded(&self, node: &Node) -> Result<(), StoreError> {
        if node.id.is_empty() {
            return Err(StoreError::MissingField("id"));
        }
        if self.nodes.contains_key(&node.id) {
            return Err(StoreError::DuplicateId(node.id.clone()));
        }
        let tree = self
            .trees
            .get(&node.tree)
            .ok_or_else(|| StoreError::not_found("tree", node.tree.as_str()))?;
        if node.parent.is_empty() {
            if !tree.root.is_empty() {
                return Err(StoreError::InvalidOperation(format!(
                    "tree {} already has a root",
                    tree.id
                )));
            }
        } else {
            let parent = self.node_entry(&node.parent)?;
            if parent.node.tree != node.tree {
                return Err(StoreError::InvalidOperation(format!(
                    "parent {} belongs to tree {}",
                    parent.node.id, parent.node.tree
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::Taxon;
    use pretty_assertions::assert_eq;
    use taxodb_core::Rank;

    pub(super) fn taxonomy() -> TaxonomyStore {
        let mut taxonomy = TaxonomyStore::new();
        taxonomy.add(Taxon::new("Felidae", Rank::Family)).unwrap();
        for name in ["Lynx", "Felis", "Panthera", "Puma"] {
            taxonomy
                .add(Taxon::new(name, Rank::Genus).with_parent("1"))
                .unwrap();
        }
        taxonomy
    }

    #[test]
    fn test_first_parentless_node_is_root() {
        let taxonomy = taxonomy();
        let mut store = PhylogenyStore::new();
        let tree = store.add_tree(Tree::new("Felids")).unwrap();
        let root = store.add_node(Node::root(&tree), &taxonomy).unwrap();
        assert_eq!(store.tree(&tree).unwrap().root, root);
        assert!(matches!(
            store.add_node(Node::root(&tree), &taxonomy),
            Err(StoreError::InvalidOperation(_))
        ));
        let leaf = store
            .add_node(Node::child(&root).with_taxon("2"), &taxonomy)
            .unwrap();
        assert_eq!(store.node(&leaf).unwrap().tree, tree);
        assert_eq!(store.node_of_taxon(&tree, "2"), Some(leaf.as_str()));
    }

    #[test]
    fn test_taxon_bound_once_per_tree() {
        let taxonomy = taxonomy();
        let mut store = PhylogenyStore::new();
        let first = store.add_tree(Tree::new("A")).unwrap();
        let second = store.add_tree(Tree::new("B")).unwrap();
        let a = store.add_node(Node::root(&first), &taxonomy).unwrap();
        let b = store.add_node(Node::root(&second), &taxonomy).unwrap();

        store.add_node(Node::child(&a).with_taxon("3"), &taxonomy).unwrap();
        assert!(store.add_node(Node::child(&a).with_taxon("3"), &taxonomy).is_err());
        store.add_node(Node::child(&b).with_taxon("3"), &taxonomy).unwrap();
        assert!(matches!(
            store.add_node(Node::child(&b).with_taxon("99"), &taxonomy),
            Err(StoreError::UnknownTaxon(_))
        ));

        let query = NodeQuery::Taxon {
            taxon: "3".to_string(),
            tree: None,
        };
        assert_eq!(store.list(&query).unwrap().len(), 2);
    }

    #[test]
    fn test_age_must_not_exceed_parent() {
        let taxonomy = taxonomy();
        let mut store = PhylogenyStore::new();
        let tree = store.add_tree(Tree::new("Dated")).unwrap();
        let root = store
            .add_node(Node::root(&tree).with_age(20), &taxonomy)
            .unwrap();
        assert!(matches!(
            store.add_node(Node::child(&root).with_age(30), &taxonomy),
            Err(StoreError::AgeConflict { .. })
        ));
        let child = store
            .add_node(Node::child(&root).with_age(12), &taxonomy)
            .unwrap();
        // a parent can not become younger than its child
        assert!(store
            .set_node(&root, &[KeyValue::new("age", "10")], &taxonomy)
            .is_err());
        store
            .set_node(&child, &[KeyValue::new("age", "")], &taxonomy)
            .unwrap();
        store
            .set_node(&root, &[KeyValue::new("age", "10")], &taxonomy)
            .unwrap();
    }

    #[test]
    fn test_rebinding_taxon() {
        let taxonomy = taxonomy();
        let mut store = PhylogenyStore::new();
        let tree = store.add_tree(Tree::new("Cats")).unwrap();
        let root = store.add_node(Node::root(&tree), &taxonomy).unwrap();
        let leaf = store
            .add_node(Node::child(&root).with_taxon("2"), &taxonomy)
            .unwrap();
        store
            .set_node(&leaf, &[KeyValue::new("taxon", "4")], &taxonomy)
            .unwrap();
        assert_eq!(store.node_of_taxon(&tree, "2"), None);
        assert_eq!(store.node_of_taxon(&tree, "4"), Some(leaf.as_str()));
    }

    #[test]
    fn test_node_query_from_pairs() {
        assert_eq!(
            NodeQuery::from_pairs(&[KeyValue::new("tree", "1")]).unwrap(),
            NodeQuery::Tree("1".to_string())
        );
        assert_eq!(
            NodeQuery::from_pairs(&[KeyValue::new("taxon", "4"), KeyValue::new("tree", "2")]).unwrap(),
            NodeQuery::Taxon {
                taxon: "4".to_string(),
                tree: Some("2".to_string())
            }
        );
        assert!(NodeQuery::from_pairs(&[]).is_err());
    }
}
