//! Prefix trie over path components for deepest-prefix-wins collection
//! routing: O(path depth), not O(number of collections), and matches at
//! component boundaries so `content/blog` never matches
//! `content/blogposts/...`.

use std::collections::HashMap;

#[derive(Default)]
struct Node {
    children: HashMap<String, Node>,
    /// Index into the collection list registered at this exact prefix.
    collection: Option<usize>,
}

/// Routes a content path to the most specific (deepest) registered
/// collection prefix that contains it.
#[derive(Default)]
pub struct CollectionPathTrie {
    root: Node,
}

impl CollectionPathTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `prefix` (POSIX-style path, e.g. `content/blog`) as
    /// routing to `collection_index`.
    pub fn insert(&mut self, prefix: &str, collection_index: usize) {
        let mut node = &mut self.root;
        for component in prefix.split('/').filter(|c| !c.is_empty()) {
            node = node.children.entry(component.to_string()).or_default();
        }
        node.collection = Some(collection_index);
    }

    /// Find the deepest registered prefix that is an ancestor of (or
    /// equal to) `path`. Returns the collection index registered there.
    pub fn lookup(&self, path: &str) -> Option<usize> {
        let mut node = &self.root;
        let mut best = node.collection;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            match node.children.get(component) {
                Some(next) => {
                    node = next;
                    if node.collection.is_some() {
                        best = node.collection;
                    }
                }
                None => break,
            }
        }
        best
    }
}
