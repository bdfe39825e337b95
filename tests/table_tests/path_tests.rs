//! Tests for path handling
//!
//! These tests verify:
//! - Normalization of leading, trailing and doubled separators
//! - Joining prefixes and keys
//! - Name, parent and containment queries

use tablesync::table::path;

// =============================================================================
// Normalization Tests
// =============================================================================

#[test]
fn test_normalize_strips_extra_separators() {
    assert_eq!(path::normalize("/a//b/"), "a/b");
    assert_eq!(path::normalize("a/b"), "a/b");
    assert_eq!(path::normalize("///a"), "a");
}

#[test]
fn test_normalize_root_is_empty() {
    assert_eq!(path::normalize(""), "");
    assert_eq!(path::normalize("/"), "");
    assert_eq!(path::normalize("////"), "");
}

#[test]
fn test_normalize_is_idempotent() {
    for raw in ["/SmartDashboard/x", "a//b//c/", "robot", ""] {
        let once = path::normalize(raw);
        assert_eq!(path::normalize(&once), once);
    }
}

#[test]
fn test_segments_skip_empty() {
    let segments: Vec<&str> = path::segments("/a//b/c/").collect();
    assert_eq!(segments, vec!["a", "b", "c"]);
}

#[test]
fn test_normalize_keeps_spaces_and_dots() {
    assert_eq!(path::normalize("/My Table/.type"), "My Table/.type");
}

// =============================================================================
// Join Tests
// =============================================================================

#[test]
fn test_join() {
    assert_eq!(path::join("SmartDashboard", "x"), "SmartDashboard/x");
    assert_eq!(path::join("", "x"), "x");
    assert_eq!(path::join("/a/", "/b/c/"), "a/b/c");
    assert_eq!(path::join("a", ""), "a");
}

// =============================================================================
// Query Tests
// =============================================================================

#[test]
fn test_name_and_parent() {
    assert_eq!(path::name("a/b/c"), "c");
    assert_eq!(path::name("top"), "top");
    assert_eq!(path::parent("a/b/c"), "a/b");
    assert_eq!(path::parent("top"), "");
}

#[test]
fn test_is_under_respects_segment_boundaries() {
    assert!(path::is_under("a/b", "a"));
    assert!(path::is_under("a", "a"));
    assert!(!path::is_under("ab/c", "a"));
    assert!(path::is_under("anything", ""));
}

#[test]
fn test_relative() {
    assert_eq!(path::relative("a/b/c", "a"), Some("b/c"));
    assert_eq!(path::relative("a", "a"), None);
    assert_eq!(path::relative("ab", "a"), None);
    assert_eq!(path::relative("x", ""), Some("x"));
    assert_eq!(path::relative("", ""), None);
}
