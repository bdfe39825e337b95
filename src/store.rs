//! Store Module
//!
//! The shared table state that every view, entry handle and connection
//! works against.
//!
//! ## Responsibilities
//! - Hold every entry's `(value, version, flags, originator)` behind one lock
//! - Apply local mutations (bump version, queue for peers, notify)
//! - Apply remote mutations through the merge rule
//! - Answer path and hierarchy queries
//! - Hand a consistent snapshot to newly attached peers

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam::channel::Sender;
use parking_lot::RwLock;

use crate::config::{Config, TypePolicy};
use crate::entry::{
    ConnectionCallback, EntryCallback, EntryEvent, EntryFlags, EntrySnapshot, EventKind,
    EventMask, ListenerId, ListenerScope, Notifier,
};
use crate::error::{Result, SyncError};
use crate::network::{ConnectionEvent, PeerInfo};
use crate::protocol::{EntryDelete, EntryUpdate, Message};
use crate::sync::{merge, MergeDecision, NodeId, PeerId, PeerSet, Stamp};
use crate::table::metadata::{MetadataPrefix, StructureRecognizer};
use crate::table::path;
use crate::value::Value;

/// Per-path state
///
/// `value == None` is a tombstone: the path was deleted at `version` and
/// is hidden from every query, but its version is never reused.
///
/// Tombstones are kept for the life of the store and replayed to every
/// peer that attaches, so a delete reaches peers that were away when it
/// happened. Only `clear_non_persistent` drops them. The map therefore
/// grows with the number of distinct paths ever deleted, not with churn
/// on a path.
#[derive(Debug, Clone)]
struct Slot {
    value: Option<Value>,
    version: u64,
    flags: EntryFlags,
    origin: NodeId,
    created_at: u64,
    seq: u64,
}

impl Slot {
    fn stamp(&self) -> Stamp {
        Stamp::new(self.version, self.origin)
    }

    fn snapshot(&self) -> Option<EntrySnapshot> {
        self.value.as_ref().map(|value| EntrySnapshot {
            value: value.clone(),
            version: self.version,
            flags: self.flags,
            origin: self.origin,
            created_at: self.created_at,
        })
    }

    /// Update for a live entry, Delete for a tombstone
    fn state_message(&self, path: &str) -> Message {
        match self.update_message(path) {
            Some(message) => message,
            None => Message::Delete(EntryDelete {
                path: path.to_string(),
                version: self.version,
                origin: self.origin,
            }),
        }
    }

    fn update_message(&self, path: &str) -> Option<Message> {
        self.value.as_ref().map(|value| {
            Message::Update(EntryUpdate {
                path: path.to_string(),
                value: value.clone(),
                version: self.version,
                flags: self.flags,
                origin: self.origin,
            })
        })
    }
}

/// Shared table state
///
/// ## Concurrency
/// - `slots`: one RwLock; readers get a consistent triple per entry
/// - Peer queues and the notifier queue are fed while the write lock is
///   held, which keeps per-entry ordering; neither ever blocks
/// - Listener callbacks run on the notifier thread, never under `slots`
pub struct Store {
    node_id: NodeId,
    type_policy: TypePolicy,
    recognizer: Arc<dyn StructureRecognizer>,

    slots: RwLock<BTreeMap<String, Slot>>,

    /// Creation order counter (drives `child_keys` ordering)
    next_seq: AtomicU64,

    /// Set while acting as a client: read-only entries refuse local writes
    client_mode: AtomicBool,

    /// Set while acting as a server: read-only entries refuse peer writes
    server_mode: AtomicBool,

    peers: PeerSet,
    notifier: Notifier,
}

impl Store {
    /// Create an empty store
    pub fn new(config: &Config) -> Self {
        Self::with_node_id(config, NodeId::random())
    }

    /// Create an empty store with a fixed originator id
    pub fn with_node_id(config: &Config, node_id: NodeId) -> Self {
        Self {
            node_id,
            type_policy: config.type_policy,
            recognizer: Arc::new(MetadataPrefix::new(config.metadata_prefix.clone())),
            slots: RwLock::new(BTreeMap::new()),
            next_seq: AtomicU64::new(0),
            client_mode: AtomicBool::new(false),
            server_mode: AtomicBool::new(false),
            peers: PeerSet::new(),
            notifier: Notifier::new(),
        }
    }

    /// Replace the structured sub-table recognizer
    pub fn with_recognizer(mut self, recognizer: Arc<dyn StructureRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn recognizer(&self) -> &dyn StructureRecognizer {
        self.recognizer.as_ref()
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    pub(crate) fn set_client_mode(&self, enabled: bool) {
        self.client_mode.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn set_server_mode(&self, enabled: bool) {
        self.server_mode.store(enabled, Ordering::Relaxed);
    }

    /// A server keeps read-only entries away from its peers
    fn refuses_peer_write(&self, slot: Option<&Slot>, from: Option<PeerId>) -> bool {
        from.is_some()
            && self.server_mode.load(Ordering::Relaxed)
            && slot
                .map(|s| s.value.is_some() && s.flags.is_read_only())
                .unwrap_or(false)
    }

    fn check_writable(&self, entry_path: &str, slot: Option<&Slot>) -> Result<()> {
        let read_only = slot
            .map(|s| s.value.is_some() && s.flags.is_read_only())
            .unwrap_or(false);
        if read_only && self.client_mode.load(Ordering::Relaxed) {
            return Err(SyncError::ReadOnly(entry_path.to_string()));
        }
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current state of a live entry
    pub fn snapshot(&self, entry_path: &str) -> Option<EntrySnapshot> {
        self.slots.read().get(entry_path).and_then(Slot::snapshot)
    }

    /// Current value of a live entry
    pub fn value(&self, entry_path: &str) -> Option<Value> {
        self.slots
            .read()
            .get(entry_path)
            .and_then(|slot| slot.value.clone())
    }

    /// Last version seen for a path, tombstones included (0 if never seen)
    pub fn version(&self, entry_path: &str) -> u64 {
        self.slots
            .read()
            .get(entry_path)
            .map(|slot| slot.version)
            .unwrap_or(0)
    }

    pub fn contains(&self, entry_path: &str) -> bool {
        self.slots
            .read()
            .get(entry_path)
            .map(|slot| slot.value.is_some())
            .unwrap_or(false)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.value.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live entry paths at or below `prefix`
    ///
    /// `sorted` gives lexicographic order; otherwise creation order.
    pub fn paths(&self, prefix: &str, sorted: bool) -> Vec<String> {
        let prefix = path::normalize(prefix);
        let slots = self.slots.read();
        let mut found: Vec<(&String, &Slot)> = slots
            .iter()
            .filter(|(p, slot)| slot.value.is_some() && path::is_under(p, &prefix))
            .collect();
        if !sorted {
            found.sort_by_key(|(_, slot)| slot.seq);
        }
        found.into_iter().map(|(p, _)| p.clone()).collect()
    }

    /// Live entries at or below `prefix`, in path order
    pub fn entries(&self, prefix: &str) -> Vec<(String, EntrySnapshot)> {
        let prefix = path::normalize(prefix);
        self.slots
            .read()
            .iter()
            .filter(|(p, _)| path::is_under(p, &prefix))
            .filter_map(|(p, slot)| slot.snapshot().map(|s| (p.clone(), s)))
            .collect()
    }

    /// Names of live entries directly inside the table at `table_path`,
    /// in order of first creation
    pub fn child_keys(&self, table_path: &str) -> Vec<String> {
        let slots = self.slots.read();
        let mut keys: Vec<(u64, String)> = slots
            .iter()
            .filter(|(_, slot)| slot.value.is_some())
            .filter_map(|(p, slot)| {
                let rest = path::relative(p, table_path)?;
                if rest.contains(path::SEPARATOR) {
                    None
                } else {
                    Some((slot.seq, rest.to_string()))
                }
            })
            .collect();
        keys.sort();
        keys.into_iter().map(|(_, k)| k).collect()
    }

    /// Names of non-empty sub-tables directly inside `table_path`,
    /// ordered by the first creation of anything inside them
    pub fn child_tables(&self, table_path: &str) -> Vec<String> {
        let slots = self.slots.read();
        let mut first_seen: BTreeMap<String, u64> = BTreeMap::new();
        for (p, slot) in slots.iter().filter(|(_, slot)| slot.value.is_some()) {
            let Some(rest) = path::relative(p, table_path) else {
                continue;
            };
            if let Some((head, _)) = rest.split_once(path::SEPARATOR) {
                let seq = first_seen.entry(head.to_string()).or_insert(slot.seq);
                *seq = (*seq).min(slot.seq);
            }
        }
        let mut tables: Vec<(u64, String)> =
            first_seen.into_iter().map(|(name, seq)| (seq, name)).collect();
        tables.sort();
        tables.into_iter().map(|(_, name)| name).collect()
    }

    /// True if any live entry lies strictly below `table_path`
    pub fn has_descendants(&self, table_path: &str) -> bool {
        self.slots
            .read()
            .iter()
            .any(|(p, slot)| slot.value.is_some() && path::relative(p, table_path).is_some())
    }

    // =========================================================================
    // Local Mutations
    // =========================================================================

    /// Set a value through the local API
    ///
    /// Creates the entry if needed, bumps its version by one, queues it for
    /// every peer and notifies listeners. With `expected` set, the write only
    /// happens if the current version (0 for never-set) matches.
    pub fn set_local(&self, entry_path: &str, value: Value, expected: Option<u64>) -> Result<u64> {
        let entry_path = checked_path(entry_path)?;
        let mut slots = self.slots.write();

        let current = slots.get(&entry_path);
        let current_version = current.map(|s| s.version).unwrap_or(0);
        self.check_writable(&entry_path, current)?;

        if let Some(expected) = expected {
            if expected != current_version {
                return Err(SyncError::VersionConflict {
                    path: entry_path,
                    expected,
                    actual: current_version,
                });
            }
        }

        if let Some(stored) = current.and_then(|s| s.value.as_ref()) {
            if stored.value_type() != value.value_type() && self.type_policy == TypePolicy::Reject {
                return Err(SyncError::TypeConflict {
                    path: entry_path,
                    expected: stored.value_type(),
                    actual: value.value_type(),
                });
            }
        }

        let kind = match current {
            Some(slot) if slot.value.is_some() => EventKind::Update,
            _ => EventKind::Create,
        };
        let flags = match kind {
            EventKind::Update => current.map(|s| s.flags).unwrap_or_default(),
            _ => EntryFlags::NONE,
        };

        let slot = self.write_slot(
            &mut slots,
            &entry_path,
            Some(value),
            Stamp::new(current_version + 1, self.node_id),
            flags,
            kind,
        );
        let version = slot.version;
        if let Some(message) = slot.update_message(&entry_path) {
            self.peers.broadcast(&message, None);
        }
        self.notify(&entry_path, &slots, kind, false);

        tracing::trace!("Local set {} -> v{}", entry_path, version);
        Ok(version)
    }

    /// Change the flags of a live entry
    ///
    /// Returns false if the entry does not exist or already has these flags.
    pub fn set_flags_local(&self, entry_path: &str, flags: EntryFlags) -> Result<bool> {
        let entry_path = checked_path(entry_path)?;
        let mut slots = self.slots.write();
        self.check_writable(&entry_path, slots.get(&entry_path))?;

        let (value, version) = match slots.get(&entry_path) {
            Some(slot) if slot.value.is_some() && slot.flags != flags => {
                (slot.value.clone(), slot.version)
            }
            _ => return Ok(false),
        };

        let slot = self.write_slot(
            &mut slots,
            &entry_path,
            value,
            Stamp::new(version + 1, self.node_id),
            flags,
            EventKind::Update,
        );
        if let Some(message) = slot.update_message(&entry_path) {
            self.peers.broadcast(&message, None);
        }
        self.notify(&entry_path, &slots, EventKind::Update, false);
        Ok(true)
    }

    /// Delete a live entry, leaving a tombstone
    ///
    /// Returns false if there was nothing to delete.
    pub fn delete_local(&self, entry_path: &str) -> bool {
        let entry_path = path::normalize(entry_path);
        let mut slots = self.slots.write();
        self.delete_locked(&mut slots, &entry_path)
    }

    /// Delete every live entry that is not persistent
    pub fn delete_all_local(&self) -> usize {
        let mut slots = self.slots.write();
        let doomed: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.value.is_some() && !slot.flags.is_persistent())
            .map(|(p, _)| p.clone())
            .collect();
        doomed
            .iter()
            .filter(|p| self.delete_locked(&mut slots, p))
            .count()
    }

    fn delete_locked(&self, slots: &mut BTreeMap<String, Slot>, entry_path: &str) -> bool {
        let version = match slots.get(entry_path) {
            Some(slot) if slot.value.is_some() => slot.version,
            _ => return false,
        };
        if self.check_writable(entry_path, slots.get(entry_path)).is_err() {
            tracing::debug!("Refusing to delete read-only entry {}", entry_path);
            return false;
        }
        let stamp = Stamp::new(version + 1, self.node_id);

        self.write_slot(slots, entry_path, None, stamp, EntryFlags::NONE, EventKind::Delete);
        self.peers.broadcast(
            &Message::Delete(EntryDelete {
                path: entry_path.to_string(),
                version: stamp.version,
                origin: stamp.origin,
            }),
            None,
        );
        self.notify(entry_path, slots, EventKind::Delete, false);
        true
    }

    // =========================================================================
    // Remote Mutations
    // =========================================================================

    /// Apply an update received from peer `from`
    ///
    /// Returns true if it won the merge. Winners are relayed to every other peer.
    pub fn apply_remote_update(&self, update: &EntryUpdate, from: Option<PeerId>) -> bool {
        let entry_path = path::normalize(&update.path);
        if entry_path.is_empty() {
            tracing::warn!("Dropping update with empty path from peer {:?}", from);
            return false;
        }

        let mut slots = self.slots.write();
        let stamp = Stamp::new(update.version, update.origin);
        let current = slots.get(&entry_path);

        if self.refuses_peer_write(current, from) {
            tracing::warn!(
                "Dropping update to read-only entry {} from peer {:?}",
                entry_path,
                from
            );
            return false;
        }
        if merge::resolve(current.map(Slot::stamp), stamp) == MergeDecision::Discard {
            tracing::trace!(
                "Discarding stale update {} v{} (local v{})",
                entry_path,
                update.version,
                current.map(|s| s.version).unwrap_or(0)
            );
            return false;
        }

        let kind = match current {
            Some(slot) if slot.value.is_some() => EventKind::Update,
            _ => EventKind::Create,
        };
        self.write_slot(
            &mut slots,
            &entry_path,
            Some(update.value.clone()),
            stamp,
            update.flags,
            kind,
        );

        let mut relayed = update.clone();
        relayed.path = entry_path.clone();
        self.peers.broadcast(&Message::Update(relayed), from);
        self.notify(&entry_path, &slots, kind, true);
        true
    }

    /// Apply a delete received from peer `from`
    ///
    /// Unknown paths still get a tombstone so a late stale update cannot
    /// resurrect them.
    pub fn apply_remote_delete(&self, delete: &EntryDelete, from: Option<PeerId>) -> bool {
        let entry_path = path::normalize(&delete.path);
        if entry_path.is_empty() {
            tracing::warn!("Dropping delete with empty path from peer {:?}", from);
            return false;
        }

        let mut slots = self.slots.write();
        let stamp = Stamp::new(delete.version, delete.origin);
        let current = slots.get(&entry_path);

        if self.refuses_peer_write(current, from) {
            tracing::warn!(
                "Dropping delete of read-only entry {} from peer {:?}",
                entry_path,
                from
            );
            return false;
        }
        if merge::resolve(current.map(Slot::stamp), stamp) == MergeDecision::Discard {
            return false;
        }
        let was_live = current.map(|s| s.value.is_some()).unwrap_or(false);

        self.write_slot(
            &mut slots,
            &entry_path,
            None,
            stamp,
            EntryFlags::NONE,
            EventKind::Delete,
        );

        let mut relayed = delete.clone();
        relayed.path = entry_path.clone();
        self.peers.broadcast(&Message::Delete(relayed), from);
        if was_live {
            self.notify(&entry_path, &slots, EventKind::Delete, true);
        }
        true
    }

    /// Drop every non-persistent entry and every tombstone without telling peers
    ///
    /// Used by clients when their server link goes away.
    pub fn clear_non_persistent(&self) -> usize {
        let mut slots = self.slots.write();
        let doomed: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| !slot.flags.is_persistent() || slot.value.is_none())
            .map(|(p, _)| p.clone())
            .collect();

        let mut cleared = 0;
        for entry_path in doomed {
            if let Some(slot) = slots.remove(&entry_path) {
                if slot.value.is_some() {
                    cleared += 1;
                    self.notifier.entry(EntryEvent {
                        path: entry_path,
                        kind: EventKind::Delete,
                        value: None,
                        version: slot.version,
                        flags: slot.flags,
                        remote: false,
                    });
                }
            }
        }
        cleared
    }

    /// Load a previously saved entry, keeping whichever of it and the
    /// current state has the higher version
    pub fn restore(&self, entry_path: &str, value: Value, version: u64, flags: EntryFlags) -> bool {
        let entry_path = path::normalize(entry_path);
        if entry_path.is_empty() {
            return false;
        }

        let mut slots = self.slots.write();
        let stamp = Stamp::new(version, self.node_id);
        let current = slots.get(&entry_path);
        if merge::resolve(current.map(Slot::stamp), stamp) == MergeDecision::Discard {
            return false;
        }

        let kind = match current {
            Some(slot) if slot.value.is_some() => EventKind::Update,
            _ => EventKind::Create,
        };
        let slot = self.write_slot(&mut slots, &entry_path, Some(value), stamp, flags, kind);
        if let Some(message) = slot.update_message(&entry_path) {
            self.peers.broadcast(&message, None);
        }
        self.notify(&entry_path, &slots, kind, false);
        true
    }

    // =========================================================================
    // Peers
    // =========================================================================

    /// Queue the full state for a new peer, then start broadcasting to it
    ///
    /// Live entries go out as updates and tombstones as deletes, so a
    /// delete made while disconnected reaches the other side. Both happen
    /// under the read lock, so no local mutation can slip in between the
    /// snapshot and registration.
    pub fn attach_peer(&self, info: PeerInfo, outbound: Sender<Message>) -> usize {
        let slots = self.slots.read();
        let mut sent = 0;
        for (entry_path, slot) in slots.iter() {
            if outbound.send(slot.state_message(entry_path)).is_err() {
                tracing::debug!("Peer {} went away during snapshot", info.id);
                return sent;
            }
            sent += 1;
        }
        let _ = outbound.send(Message::SnapshotDone);
        self.peers.insert(info, outbound);
        sent
    }

    pub fn detach_peer(&self, id: PeerId) -> Option<PeerInfo> {
        self.peers.remove(id)
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn add_entry_listener(
        &self,
        scope: ListenerScope,
        mask: EventMask,
        callback: EntryCallback,
    ) -> ListenerId {
        if !mask.contains(EventMask::IMMEDIATE) {
            return self.notifier.add_entry_listener(scope, mask, callback);
        }

        // Hold the lock so no change is queued between replay and registration
        let slots = self.slots.read();
        let id = self.notifier.add_entry_listener(scope.clone(), mask, callback);
        let replay: Vec<EntryEvent> = slots
            .iter()
            .filter(|(p, slot)| slot.value.is_some() && scope.matches(p))
            .map(|(p, slot)| EntryEvent {
                path: p.clone(),
                kind: EventKind::Create,
                value: slot.value.clone(),
                version: slot.version,
                flags: slot.flags,
                remote: false,
            })
            .collect();
        self.notifier.replay(id, replay);
        id
    }

    pub fn add_connection_listener(
        &self,
        callback: ConnectionCallback,
        current: Option<ConnectionEvent>,
    ) -> ListenerId {
        let id = self.notifier.add_connection_listener(callback);
        if let Some(event) = current {
            self.notifier.connection_replay(id, event);
        }
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.notifier.remove_listener(id)
    }

    pub(crate) fn notify_connection(&self, event: ConnectionEvent) {
        self.notifier.connection(event);
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn write_slot<'a>(
        &self,
        slots: &'a mut BTreeMap<String, Slot>,
        entry_path: &str,
        value: Option<Value>,
        stamp: Stamp,
        flags: EntryFlags,
        kind: EventKind,
    ) -> &'a Slot {
        let next_seq = &self.next_seq;
        let slot = slots.entry(entry_path.to_string()).or_insert_with(|| Slot {
            value: None,
            version: 0,
            flags: EntryFlags::NONE,
            origin: stamp.origin,
            created_at: 0,
            seq: 0,
        });

        if kind == EventKind::Create {
            slot.created_at = now_millis();
            slot.seq = next_seq.fetch_add(1, Ordering::Relaxed);
        }
        slot.value = value;
        slot.version = stamp.version;
        slot.origin = stamp.origin;
        slot.flags = flags;
        slot
    }

    fn notify(&self, entry_path: &str, slots: &BTreeMap<String, Slot>, kind: EventKind, remote: bool) {
        if let Some(slot) = slots.get(entry_path) {
            self.notifier.entry(EntryEvent {
                path: entry_path.to_string(),
                kind,
                value: slot.value.clone(),
                version: slot.version,
                flags: slot.flags,
                remote,
            });
        }
    }
}

fn checked_path(entry_path: &str) -> Result<String> {
    let normalized = path::normalize(entry_path);
    if normalized.is_empty() {
        return Err(SyncError::InvalidPath(entry_path.to_string()));
    }
    Ok(normalized)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
