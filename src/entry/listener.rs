//! Listeners and notification delivery
//!
//! ## Delivery Model
//! - The store queues notifications while it still holds its write lock,
//!   so the queue order matches the order mutations were applied
//! - A single notifier thread drains the queue and invokes callbacks with
//!   no store or registry lock held; callbacks may call back into the table
//! - Per-entry delivery is therefore FIFO; nothing is promised across entries
//!   beyond what falls out of the single queue
//! - A listener only sees events queued after it was registered

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;

use crate::network::ConnectionEvent;
use crate::table::path;
use crate::value::Value;

use super::EntryFlags;

/// Callback invoked for entry changes
pub type EntryCallback = Arc<dyn Fn(&EntryEvent) + Send + Sync>;

/// Callback invoked for connection state changes
pub type ConnectionCallback = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Handle returned when registering a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// What happened to an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

/// A change notification
#[derive(Debug, Clone)]
pub struct EntryEvent {
    /// Normalized full path of the entry
    pub path: String,

    pub kind: EventKind,

    /// New value (`None` for deletes)
    pub value: Option<Value>,

    /// Version after the change
    pub version: u64,

    pub flags: EntryFlags,

    /// True when the change arrived from a peer
    pub remote: bool,
}

/// Selects which events a listener receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMask(u8);

impl EventMask {
    pub const CREATE: EventMask = EventMask(0x01);
    pub const UPDATE: EventMask = EventMask(0x02);
    pub const DELETE: EventMask = EventMask(0x04);

    /// Drop changes made through the local API
    pub const REMOTE_ONLY: EventMask = EventMask(0x08);

    /// Replay every existing entry as a Create event on registration
    pub const IMMEDIATE: EventMask = EventMask(0x10);

    /// Create, update and delete from any origin
    pub const ALL: EventMask = EventMask(0x07);

    pub fn contains(&self, other: EventMask) -> bool {
        self.0 & other.0 == other.0
    }

    fn accepts(&self, event: &EntryEvent) -> bool {
        let kind = match event.kind {
            EventKind::Create => Self::CREATE,
            EventKind::Update => Self::UPDATE,
            EventKind::Delete => Self::DELETE,
        };
        self.contains(kind) && (event.remote || !self.contains(Self::REMOTE_ONLY))
    }
}

impl std::ops::BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

/// Which paths a listener watches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerScope {
    /// A single entry
    Exact(String),

    /// An entry path and everything below it (`""` is the whole table)
    Prefix(String),
}

impl ListenerScope {
    pub fn exact(p: &str) -> Self {
        ListenerScope::Exact(path::normalize(p))
    }

    pub fn prefix(p: &str) -> Self {
        ListenerScope::Prefix(path::normalize(p))
    }

    pub fn matches(&self, entry_path: &str) -> bool {
        match self {
            ListenerScope::Exact(p) => p == entry_path,
            ListenerScope::Prefix(p) => path::is_under(entry_path, p),
        }
    }
}

struct EntryListener {
    id: ListenerId,

    /// Queue position at registration; earlier events are not delivered
    since: u64,

    scope: ListenerScope,
    mask: EventMask,
    callback: EntryCallback,
}

struct ConnectionListener {
    id: ListenerId,
    callback: ConnectionCallback,
}

/// Registered listeners, shared between the store and the notifier thread
#[derive(Default)]
struct Registry {
    next_id: AtomicU64,

    /// Entry events queued so far
    queued: AtomicU64,

    entry: RwLock<Vec<EntryListener>>,
    connection: RwLock<Vec<ConnectionListener>>,
}

impl Registry {
    fn allocate_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn entry_callbacks(&self, seq: u64, event: &EntryEvent) -> Vec<EntryCallback> {
        self.entry
            .read()
            .iter()
            .filter(|l| seq > l.since && l.scope.matches(&event.path) && l.mask.accepts(event))
            .map(|l| Arc::clone(&l.callback))
            .collect()
    }

    fn entry_callback(&self, id: ListenerId) -> Option<EntryCallback> {
        self.entry
            .read()
            .iter()
            .find(|l| l.id == id)
            .map(|l| Arc::clone(&l.callback))
    }

    fn connection_callbacks(&self) -> Vec<ConnectionCallback> {
        self.connection
            .read()
            .iter()
            .map(|l| Arc::clone(&l.callback))
            .collect()
    }

    fn connection_callback(&self, id: ListenerId) -> Option<ConnectionCallback> {
        self.connection
            .read()
            .iter()
            .find(|l| l.id == id)
            .map(|l| Arc::clone(&l.callback))
    }
}

enum Notification {
    Entry {
        seq: u64,
        event: EntryEvent,
    },
    Replay {
        listener: ListenerId,
        events: Vec<EntryEvent>,
    },
    Connection(ConnectionEvent),
    ConnectionReplay {
        listener: ListenerId,
        event: ConnectionEvent,
    },
}

/// Queue plus dispatcher thread for listener callbacks
pub(crate) struct Notifier {
    sender: Sender<Notification>,
    registry: Arc<Registry>,
}

impl Notifier {
    /// Create the queue and spawn the dispatcher thread
    ///
    /// The thread exits once the notifier is dropped and the queue is drained.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        let registry = Arc::new(Registry::default());

        let thread_registry = Arc::clone(&registry);
        let spawned = thread::Builder::new()
            .name("tablesync-notify".to_string())
            .spawn(move || dispatch(receiver, thread_registry));
        if let Err(e) = spawned {
            tracing::error!("Failed to spawn notifier thread: {}", e);
        }

        Self { sender, registry }
    }

    pub fn add_entry_listener(
        &self,
        scope: ListenerScope,
        mask: EventMask,
        callback: EntryCallback,
    ) -> ListenerId {
        let id = self.registry.allocate_id();
        let since = self.registry.queued.load(Ordering::Acquire);
        self.registry.entry.write().push(EntryListener {
            id,
            since,
            scope,
            mask,
            callback,
        });
        id
    }

    pub fn add_connection_listener(&self, callback: ConnectionCallback) -> ListenerId {
        let id = self.registry.allocate_id();
        self.registry
            .connection
            .write()
            .push(ConnectionListener { id, callback });
        id
    }

    /// Remove a listener of either kind. Returns false if the id is unknown.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut entry = self.registry.entry.write();
        let before = entry.len();
        entry.retain(|l| l.id != id);
        if entry.len() != before {
            return true;
        }
        drop(entry);

        let mut connection = self.registry.connection.write();
        let before = connection.len();
        connection.retain(|l| l.id != id);
        connection.len() != before
    }

    pub fn entry(&self, event: EntryEvent) {
        let seq = self.registry.queued.fetch_add(1, Ordering::AcqRel) + 1;
        self.send(Notification::Entry { seq, event });
    }

    pub fn replay(&self, listener: ListenerId, events: Vec<EntryEvent>) {
        if !events.is_empty() {
            self.send(Notification::Replay { listener, events });
        }
    }

    pub fn connection(&self, event: ConnectionEvent) {
        self.send(Notification::Connection(event));
    }

    pub fn connection_replay(&self, listener: ListenerId, event: ConnectionEvent) {
        self.send(Notification::ConnectionReplay { listener, event });
    }

    fn send(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            tracing::warn!("Notifier thread is gone, dropping notification");
        }
    }
}

fn dispatch(receiver: Receiver<Notification>, registry: Arc<Registry>) {
    while let Ok(notification) = receiver.recv() {
        match notification {
            Notification::Entry { seq, event } => {
                for callback in registry.entry_callbacks(seq, &event) {
                    callback(&event);
                }
            }
            Notification::Replay { listener, events } => {
                if let Some(callback) = registry.entry_callback(listener) {
                    for event in &events {
                        callback(event);
                    }
                }
            }
            Notification::Connection(event) => {
                for callback in registry.connection_callbacks() {
                    callback(&event);
                }
            }
            Notification::ConnectionReplay { listener, event } => {
                if let Some(callback) = registry.connection_callback(listener) {
                    callback(&event);
                }
            }
        }
    }
    tracing::trace!("Notifier thread exiting");
}
