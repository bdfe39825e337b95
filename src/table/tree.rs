//! Tree reconstruction
//!
//! Rebuilds the nested table/entry hierarchy from a flat list of entry
//! paths. Children are kept in a `BTreeMap`, so the same set of paths
//! gives the same tree no matter the input order.

use std::collections::BTreeMap;

use super::path;

/// A node in a reconstructed tree
///
/// A node can be an entry and a table at once when both `a` and `a/b`
/// are entry paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeNode {
    /// Last path segment (`""` for the root)
    pub name: String,

    /// Normalized full path (`""` for the root)
    pub path: String,

    /// True if `path` itself is an entry
    pub is_entry: bool,

    pub children: BTreeMap<String, TreeNode>,
}

impl TreeNode {
    fn child(name: &str, parent: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path::join(parent, name),
            is_entry: false,
            children: BTreeMap::new(),
        }
    }

    /// True if this node has children (i.e. it is a sub-table)
    pub fn is_table(&self) -> bool {
        !self.children.is_empty()
    }

    /// Find a node by path relative to this one
    pub fn find(&self, relative: &str) -> Option<&TreeNode> {
        let mut node = self;
        for segment in path::segments(relative) {
            node = node.children.get(segment)?;
        }
        Some(node)
    }

    /// Entry paths under this node, depth-first in child order
    pub fn entry_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_entries(&mut out);
        out
    }

    fn collect_entries(&self, out: &mut Vec<String>) {
        if self.is_entry {
            out.push(self.path.clone());
        }
        for child in self.children.values() {
            child.collect_entries(out);
        }
    }

    /// Number of entry nodes in this subtree
    pub fn entry_count(&self) -> usize {
        let own = usize::from(self.is_entry);
        own + self.children.values().map(TreeNode::entry_count).sum::<usize>()
    }

    fn insert(&mut self, entry_path: &str) {
        let mut node = self;
        for segment in path::segments(entry_path) {
            let parent = node.path.clone();
            node = node
                .children
                .entry(segment.to_string())
                .or_insert_with(|| TreeNode::child(segment, &parent));
        }
        // The empty path names the root, which is never an entry
        if !node.path.is_empty() {
            node.is_entry = true;
        }
    }
}

/// Build the tree for a list of full entry paths
///
/// Empty segments (leading, trailing or doubled `/`) are skipped.
pub fn build_tree<I, S>(paths: I) -> TreeNode
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut root = TreeNode::default();
    for p in paths {
        root.insert(p.as_ref());
    }
    root
}
