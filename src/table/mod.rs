//! Table Module
//!
//! Hierarchical namespace over the flat store.
//!
//! ## Responsibilities
//! - Path normalization (`/a//b/` is `a/b`)
//! - Sub-table views scoped to a path prefix
//! - Immediate-child enumeration in creation order
//! - Tree reconstruction from flat path lists
//! - Structured sub-table detection via a pluggable recognizer
//!
//! Sub-tables are implied by their descendants; there is no table object
//! in the store, only entries with longer paths.

pub mod metadata;
pub mod path;
mod table;
mod tree;

pub use metadata::{MetadataPrefix, StructureRecognizer};
pub use table::{Resolved, Table};
pub use tree::{build_tree, TreeNode};
