//! Tests for tree reconstruction
//!
//! These tests verify:
//! - Nested structure from flat paths
//! - Nodes that are both an entry and a table
//! - Determinism regardless of input order
//! - Malformed paths (empty segments)

use tablesync::table::build_tree;

// =============================================================================
// Helper Functions
// =============================================================================

/// All orderings of `items` (Heap's algorithm)
fn permutations(items: &[&str]) -> Vec<Vec<String>> {
    let mut items: Vec<String> = items.iter().map(|s| s.to_string()).collect();
    let n = items.len();
    let mut out = vec![items.clone()];
    let mut c = vec![0usize; n];
    let mut i = 0;
    while i < n {
        if c[i] < i {
            if i % 2 == 0 {
                items.swap(0, i);
            } else {
                items.swap(c[i], i);
            }
            out.push(items.clone());
            c[i] += 1;
            i = 0;
        } else {
            c[i] = 0;
            i += 1;
        }
    }
    out
}

// =============================================================================
// Structure Tests
// =============================================================================

#[test]
fn test_nested_structure() {
    let tree = build_tree(["a/b", "a/c", "d"]);

    assert_eq!(tree.children.len(), 2);
    let a = tree.find("a").unwrap();
    assert!(a.is_table());
    assert!(!a.is_entry);
    assert_eq!(a.children.keys().collect::<Vec<_>>(), vec!["b", "c"]);

    let b = tree.find("a/b").unwrap();
    assert!(b.is_entry);
    assert_eq!(b.path, "a/b");
    assert_eq!(b.name, "b");

    assert!(tree.find("d").unwrap().is_entry);
    assert!(tree.find("missing").is_none());
}

#[test]
fn test_node_is_entry_and_table() {
    let tree = build_tree(["a", "a/b"]);
    let a = tree.find("a").unwrap();

    assert!(a.is_entry);
    assert!(a.is_table());
    assert_eq!(tree.entry_count(), 2);
}

#[test]
fn test_root_is_never_an_entry() {
    let tree = build_tree(["", "/", "x"]);

    assert!(!tree.is_entry);
    assert_eq!(tree.entry_paths(), vec!["x".to_string()]);
}

#[test]
fn test_empty_input() {
    let tree = build_tree(Vec::<String>::new());

    assert!(tree.children.is_empty());
    assert_eq!(tree.entry_count(), 0);
}

#[test]
fn test_empty_segments_are_skipped() {
    let tree = build_tree(["/a//b/", "a/c"]);

    assert_eq!(tree.entry_paths(), vec!["a/b".to_string(), "a/c".to_string()]);
    assert_eq!(tree, build_tree(["a/b", "a/c"]));
}

#[test]
fn test_duplicate_paths_collapse() {
    let tree = build_tree(["a/b", "a/b", "/a/b"]);
    assert_eq!(tree.entry_count(), 1);
}

// =============================================================================
// Determinism Tests
// =============================================================================

#[test]
fn test_same_tree_for_every_permutation() {
    let paths = ["a/b/c", "a/b", "a/d", "e", "e/f/g"];
    let reference = build_tree(paths);

    for order in permutations(&paths) {
        assert_eq!(build_tree(&order), reference, "order {:?}", order);
    }
}

#[test]
fn test_entry_paths_are_depth_first_sorted() {
    let tree = build_tree(["z", "b/y", "b", "a/x"]);

    assert_eq!(
        tree.entry_paths(),
        vec![
            "a/x".to_string(),
            "b".to_string(),
            "b/y".to_string(),
            "z".to_string(),
        ]
    );
}
