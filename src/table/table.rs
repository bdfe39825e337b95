//! Table views

use std::sync::Arc;

use crate::entry::{Entry, EntryCallback, EntryEvent, EventMask, ListenerId, ListenerScope};
use crate::error::Result;
use crate::store::Store;
use crate::value::{Value, ValueType};

use super::{path, tree, TreeNode};

/// A view of the store scoped to a path prefix
///
/// Views are cheap to create and hold no state of their own; writing
/// through a view writes to the shared store.
#[derive(Clone)]
pub struct Table {
    store: Arc<Store>,
    path: String,
}

/// What a path resolves to
#[derive(Debug, Clone)]
pub enum Resolved {
    Entry(Entry),
    Table(Table),

    /// `a` is an entry and `a/b` exists too
    Both(Entry, Table),
}

impl Table {
    pub(crate) fn new(store: Arc<Store>, table_path: &str) -> Self {
        Self {
            store,
            path: path::normalize(table_path),
        }
    }

    /// Normalized path of this table (`""` for the root)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment (`""` for the root)
    pub fn name(&self) -> &str {
        path::name(&self.path)
    }

    /// Handle for an entry below this table; `key` may contain separators
    pub fn entry(&self, key: &str) -> Entry {
        Entry::new(Arc::clone(&self.store), &path::join(&self.path, key))
    }

    /// View of a sub-table below this one
    pub fn sub_table(&self, key: &str) -> Table {
        Table::new(Arc::clone(&self.store), &path::join(&self.path, key))
    }

    /// Parent view, or `None` for the root
    pub fn parent(&self) -> Option<Table> {
        if self.path.is_empty() {
            None
        } else {
            Some(Table::new(Arc::clone(&self.store), path::parent(&self.path)))
        }
    }

    // =========================================================================
    // Enumeration
    // =========================================================================

    /// Names of entries directly in this table, in creation order
    pub fn keys(&self) -> Vec<String> {
        self.store.child_keys(&self.path)
    }

    /// Names of entries directly in this table whose type passes `filter`
    pub fn keys_matching<F>(&self, filter: F) -> Vec<String>
    where
        F: Fn(ValueType) -> bool,
    {
        self.keys()
            .into_iter()
            .filter(|k| filter(self.entry(k).value_type()))
            .collect()
    }

    /// Names of non-empty sub-tables directly in this table
    pub fn sub_tables(&self) -> Vec<String> {
        self.store.child_tables(&self.path)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.store.contains(&path::join(&self.path, key))
    }

    pub fn contains_sub_table(&self, key: &str) -> bool {
        self.store.has_descendants(&path::join(&self.path, key))
    }

    /// True if nothing lives at or below this table
    pub fn is_empty(&self) -> bool {
        !self.store.has_descendants(&self.path)
    }

    /// Full paths of every entry below this table
    pub fn entry_paths(&self, sorted: bool) -> Vec<String> {
        self.store
            .paths(&self.path, sorted)
            .into_iter()
            .filter(|p| *p != self.path)
            .collect()
    }

    /// Nested view of everything below this table
    ///
    /// Node paths in the returned tree are relative to this table.
    pub fn build_tree(&self) -> TreeNode {
        let paths = self.entry_paths(true);
        tree::build_tree(
            paths
                .iter()
                .filter_map(|p| path::relative(p, &self.path)),
        )
    }

    /// Resolve a relative path to an entry, a sub-table, or both
    pub fn resolve(&self, key: &str) -> Option<Resolved> {
        let entry = self.entry(key);
        let table = self.sub_table(key);
        match (entry.exists(), !table.is_empty() && !table.path.is_empty()) {
            (true, true) => Some(Resolved::Both(entry, table)),
            (true, false) => Some(Resolved::Entry(entry)),
            (false, true) => Some(Resolved::Table(table)),
            (false, false) if table.path.is_empty() => Some(Resolved::Table(table)),
            (false, false) => None,
        }
    }

    // =========================================================================
    // Structured objects
    // =========================================================================

    /// True if the recognizer sees a structured object in this table's keys
    pub fn is_structured(&self) -> bool {
        self.store.recognizer().is_structured(&self.keys())
    }

    /// Metadata entries (keys starting with `prefix`) and their values
    pub fn metadata(&self, prefix: &str) -> Vec<(String, Value)> {
        self.keys()
            .into_iter()
            .filter(|k| !prefix.is_empty() && k.starts_with(prefix))
            .filter_map(|k| {
                let value = self.entry(&k).value()?;
                Some((k, value))
            })
            .collect()
    }

    // =========================================================================
    // Typed convenience
    // =========================================================================

    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.entry(key).value()
    }

    pub fn put_value(&self, key: &str, value: impl Into<Value>) -> Result<u64> {
        self.entry(key).set(value)
    }

    pub fn get_boolean(&self, key: &str, default: bool) -> bool {
        self.entry(key).get_boolean(default)
    }

    pub fn put_boolean(&self, key: &str, value: bool) -> Result<u64> {
        self.entry(key).set_boolean(value)
    }

    pub fn get_number(&self, key: &str, default: f64) -> f64 {
        self.entry(key).get_double(default)
    }

    pub fn put_number(&self, key: &str, value: f64) -> Result<u64> {
        self.entry(key).set_double(value)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.entry(key).get_string(default)
    }

    pub fn put_string(&self, key: &str, value: impl Into<String>) -> Result<u64> {
        self.entry(key).set_string(value)
    }

    pub fn get_raw(&self, key: &str, default: &[u8]) -> Vec<u8> {
        self.entry(key).get_raw(default)
    }

    pub fn put_raw(&self, key: &str, value: impl Into<Vec<u8>>) -> Result<u64> {
        self.entry(key).set_raw(value)
    }

    pub fn get_boolean_array(&self, key: &str, default: &[bool]) -> Vec<bool> {
        self.entry(key).get_boolean_array(default)
    }

    pub fn put_boolean_array(&self, key: &str, value: impl Into<Vec<bool>>) -> Result<u64> {
        self.entry(key).set_boolean_array(value)
    }

    pub fn get_number_array(&self, key: &str, default: &[f64]) -> Vec<f64> {
        self.entry(key).get_double_array(default)
    }

    pub fn put_number_array(&self, key: &str, value: impl Into<Vec<f64>>) -> Result<u64> {
        self.entry(key).set_double_array(value)
    }

    pub fn get_string_array(&self, key: &str, default: &[String]) -> Vec<String> {
        self.entry(key).get_string_array(default)
    }

    pub fn put_string_array(&self, key: &str, value: impl Into<Vec<String>>) -> Result<u64> {
        self.entry(key).set_string_array(value)
    }

    /// Delete one entry below this table
    pub fn delete(&self, key: &str) -> bool {
        self.entry(key).delete()
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Listen for changes anywhere below this table
    pub fn add_listener<F>(&self, mask: EventMask, callback: F) -> ListenerId
    where
        F: Fn(&EntryEvent) + Send + Sync + 'static,
    {
        let callback: EntryCallback = Arc::new(callback);
        self.store
            .add_entry_listener(ListenerScope::Prefix(self.path.clone()), mask, callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.store.remove_listener(id)
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").field("path", &self.path).finish()
    }
}
