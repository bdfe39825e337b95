//! Entry handles

use std::sync::Arc;

use crate::error::Result;
use crate::store::Store;
use crate::sync::NodeId;
use crate::table::path;
use crate::value::{TypedValue, Value, ValueType};

use super::{EntryCallback, EntryFlags, EntryEvent, EventMask, ListenerId, ListenerScope};

/// A consistent view of one entry at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot {
    pub value: Value,
    pub version: u64,
    pub flags: EntryFlags,

    /// Originator of the last applied mutation
    pub origin: NodeId,

    /// Unix millis when the entry was (re)created locally
    pub created_at: u64,
}

/// Handle to the entry at one path
///
/// Getting a handle never publishes anything: until the first `set` the
/// entry reads as unset (`ValueType::Unknown`). Reads never block on I/O.
#[derive(Clone)]
pub struct Entry {
    store: Arc<Store>,
    path: String,
}

impl Entry {
    pub(crate) fn new(store: Arc<Store>, entry_path: &str) -> Self {
        Self {
            store,
            path: path::normalize(entry_path),
        }
    }

    /// Normalized full path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        path::name(&self.path)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Last applied value, `None` while unset or after delete
    pub fn value(&self) -> Option<Value> {
        self.store.value(&self.path)
    }

    /// Value, version and flags read together
    pub fn snapshot(&self) -> Option<EntrySnapshot> {
        self.store.snapshot(&self.path)
    }

    pub fn exists(&self) -> bool {
        self.store.contains(&self.path)
    }

    pub fn value_type(&self) -> ValueType {
        self.value()
            .map(|v| v.value_type())
            .unwrap_or(ValueType::Unknown)
    }

    /// Current version (0 if never set; deleted entries keep their last version)
    pub fn version(&self) -> u64 {
        self.store.version(&self.path)
    }

    pub fn flags(&self) -> EntryFlags {
        self.snapshot().map(|s| s.flags).unwrap_or_default()
    }

    /// Typed read; `None` if unset or of another type
    pub fn get<T: TypedValue>(&self) -> Option<T> {
        self.value().as_ref().and_then(T::from_value)
    }

    /// Typed read with a fallback for unset or mistyped entries
    pub fn get_or<T: TypedValue>(&self, default: T) -> T {
        self.get().unwrap_or(default)
    }

    pub fn get_boolean(&self, default: bool) -> bool {
        self.get_or(default)
    }

    pub fn get_double(&self, default: f64) -> f64 {
        self.get_or(default)
    }

    pub fn get_string(&self, default: &str) -> String {
        self.get::<String>().unwrap_or_else(|| default.to_string())
    }

    pub fn get_raw(&self, default: &[u8]) -> Vec<u8> {
        self.get::<Vec<u8>>().unwrap_or_else(|| default.to_vec())
    }

    pub fn get_boolean_array(&self, default: &[bool]) -> Vec<bool> {
        self.get::<Vec<bool>>().unwrap_or_else(|| default.to_vec())
    }

    pub fn get_double_array(&self, default: &[f64]) -> Vec<f64> {
        self.get::<Vec<f64>>().unwrap_or_else(|| default.to_vec())
    }

    pub fn get_string_array(&self, default: &[String]) -> Vec<String> {
        self.get::<Vec<String>>().unwrap_or_else(|| default.to_vec())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set the value; returns the new version
    ///
    /// A type change is accepted or refused per the configured type policy.
    pub fn set(&self, value: impl Into<Value>) -> Result<u64> {
        self.store.set_local(&self.path, value.into(), None)
    }

    /// Set only if the current version is `expected` (0 for never set)
    pub fn set_if_version(&self, value: impl Into<Value>, expected: u64) -> Result<u64> {
        self.store.set_local(&self.path, value.into(), Some(expected))
    }

    pub fn set_boolean(&self, value: bool) -> Result<u64> {
        self.set(value)
    }

    pub fn set_double(&self, value: f64) -> Result<u64> {
        self.set(value)
    }

    pub fn set_string(&self, value: impl Into<String>) -> Result<u64> {
        self.set(Value::String(value.into()))
    }

    pub fn set_raw(&self, value: impl Into<Vec<u8>>) -> Result<u64> {
        self.set(Value::Raw(value.into()))
    }

    pub fn set_boolean_array(&self, value: impl Into<Vec<bool>>) -> Result<u64> {
        self.set(Value::BooleanArray(value.into()))
    }

    pub fn set_double_array(&self, value: impl Into<Vec<f64>>) -> Result<u64> {
        self.set(Value::DoubleArray(value.into()))
    }

    pub fn set_string_array(&self, value: impl Into<Vec<String>>) -> Result<u64> {
        self.set(Value::StringArray(value.into()))
    }

    /// Replace the flags. Returns false if unset or unchanged.
    pub fn set_flags(&self, flags: EntryFlags) -> Result<bool> {
        self.store.set_flags_local(&self.path, flags)
    }

    pub fn set_persistent(&self, persistent: bool) -> Result<bool> {
        let flags = self.flags();
        let flags = if persistent {
            flags.with(EntryFlags::PERSISTENT)
        } else {
            flags.without(EntryFlags::PERSISTENT)
        };
        self.set_flags(flags)
    }

    /// Remove the entry. Its version is kept so it is never reused.
    pub fn delete(&self) -> bool {
        self.store.delete_local(&self.path)
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Listen for changes to this entry only
    pub fn add_listener<F>(&self, mask: EventMask, callback: F) -> ListenerId
    where
        F: Fn(&EntryEvent) + Send + Sync + 'static,
    {
        let callback: EntryCallback = Arc::new(callback);
        self.store
            .add_entry_listener(ListenerScope::Exact(self.path.clone()), mask, callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.store.remove_listener(id)
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("path", &self.path)
            .field("value", &self.value())
            .finish()
    }
}
