/// Prefix index over lower-cased taxon names
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
struct TrieNode {
    ids: Vec<String>,
    children: BTreeMap<char, TrieNode>,
}

impl TrieNode {
    fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.children.is_empty()
    }

    fn collect(&self, out: &mut Vec<String>) {
        out.extend(self.ids.iter().cloned());
        for child in self.children.values() {
            child.collect(out);
        }
    }

    fn collect_entries(&self, key: &mut String, out: &mut Vec<(String, String)>) {
        for id in &self.ids {
            out.push((key.clone(), id.clone()));
        }
        for (c, child) in &self.children {
            key.push(*c);
            child.collect_entries(key, out);
            key.pop();
        }
    }
}

/// Maps a lower-cased name to the ids sharing it. Lookups return ids in
/// index order: alphabetical by name, then insertion order within a name.
#[derive(Debug, Default, Clone)]
pub struct NameTrie {
    root: TrieNode,
    len: usize,
}

fn normalize(name: &str) -> Vec<char> {
    name.trim().to_lowercase().chars().collect()
}

fn remove_at(node: &mut TrieNode, key: &[char], id: &str) -> bool {
    match key.split_first() {
        None => {
            let before = node.ids.len();
            node.ids.retain(|x| x != id);
            node.ids.len() != before
        }
        Some((c, rest)) => {
            let Some(child) = node.children.get_mut(c) else {
                return false;
            };
            let removed = remove_at(child, rest, id);
            if child.is_empty() {
                node.children.remove(c);
            }
            removed
        }
    }
}

impl NameTrie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, id: &str) {
        let mut node = &mut self.root;
        for c in normalize(name) {
            node = node.children.entry(c).or_default();
        }
        if !node.ids.iter().any(|x| x == id) {
            node.ids.push(id.to_string());
            self.len += 1;
        }
    }

    /// Remove the entry for `id` under `name`; returns false when absent
    pub fn remove(&mut self, name: &str, id: &str) -> bool {
        let removed = remove_at(&mut self.root, &normalize(name), id);
        if removed {
            self.len -= 1;
        }
        removed
    }

    fn find(&self, key: &[char]) -> Option<&TrieNode> {
        let mut node = &self.root;
        for c in key {
            node = node.children.get(c)?;
        }
        Some(node)
    }

    /// Ids whose name equals `name` (case-insensitive)
    pub fn exact(&self, name: &str) -> Vec<String> {
        self.find(&normalize(name))
            .map(|node| node.ids.clone())
            .unwrap_or_default()
    }

    /// Ids whose name starts with `prefix` (case-insensitive)
    pub fn prefix(&self, prefix: &str) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(node) = self.find(&normalize(prefix)) {
            node.collect(&mut out);
        }
        out
    }

    /// Every (lower-cased name, id) pair in index order
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(self.len);
        self.root.collect_entries(&mut String::new(), &mut out);
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_exact_and_prefix() {
        let mut trie = NameTrie::new();
        trie.insert("Canis", "1");
        trie.insert("Canis lupus", "2");
        trie.insert("canis", "3");
        trie.insert("Felis", "4");

        assert_eq!(trie.exact("CANIS"), vec!["1", "3"]);
        assert_eq!(trie.prefix("can"), vec!["1", "3", "2"]);
        assert_eq!(trie.prefix(""), vec!["1", "3", "2", "4"]);
        assert!(trie.exact("Can").is_empty());
        assert!(trie.prefix("Vulpes").is_empty());
    }

    #[test]
    fn test_remove_prunes_branches() {
        let mut trie = NameTrie::new();
        trie.insert("Vulpes", "1");
        assert!(trie.remove("vulpes", "1"));
        assert!(!trie.remove("vulpes", "1"));
        assert!(trie.is_empty());
        assert!(trie.root.children.is_empty());
    }

    proptest! {
        #[test]
        fn prop_entries_mirror_live_set(ops in prop::collection::vec((0u8..3, "[a-c]{1,4}", 0u8..6), 0..60)) {
            let mut trie = NameTrie::new();
            let mut live: BTreeSet<(String, String)> = BTreeSet::new();
            for (op, name, id) in ops {
                let id = id.to_string();
                if op == 0 {
                    trie.remove(&name, &id);
                    live.remove(&(name.to_lowercase(), id));
                } else {
                    trie.insert(&name, &id);
                    live.insert((name.to_lowercase(), id));
                }
            }
            let entries: BTreeSet<(String, String)> = trie.entries().into_iter().collect();
            prop_assert_eq!(trie.len(), live.len());
            prop_assert_eq!(entries, live);
        }
    }
}
