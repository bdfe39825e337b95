//! Instance Module
//!
//! The entry point a dashboard or robot program holds on to.
//!
//! ## Responsibilities
//! - Own the shared store and the sync engine
//! - Hand out table views and entry handles
//! - Start and stop the network side (server or client, never both)
//! - Load and save persistent entries

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::Config;
use crate::entry::{
    ConnectionCallback, Entry, EntryCallback, EntryEvent, EventMask, ListenerId, ListenerScope,
};
use crate::error::{Result, SyncError};
use crate::network::{Client, ConnectionEvent, ConnectionState, PeerInfo, Server};
use crate::persist::{self, LoadResult, PersistRecord};
use crate::store::Store;
use crate::sync::{NodeId, Role, SyncEngine};
use crate::table::{path, MetadataPrefix, Resolved, StructureRecognizer, Table, TreeNode};
use crate::value::Value;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

enum Mode {
    Idle,
    Server(Server),
    Client(Client),
}

/// A synchronized table instance
///
/// ## Concurrency Model
/// - All table reads return the last applied state without touching I/O
/// - Local writes and inbound network updates serialize on the store lock
/// - Network I/O runs on background threads owned by the server or client
pub struct Instance {
    config: Config,
    store: Arc<Store>,
    engine: Arc<SyncEngine>,
    mode: Mutex<Mode>,
}

impl Instance {
    /// Create a standalone instance
    pub fn new(config: Config) -> Self {
        let store = Arc::new(Store::new(&config));
        Self::from_store(config, store)
    }

    /// Create an instance with a fixed originator id
    pub fn with_node_id(config: Config, node_id: NodeId) -> Self {
        let store = Arc::new(Store::with_node_id(&config, node_id));
        Self::from_store(config, store)
    }

    /// Create an instance with a custom structured sub-table recognizer
    pub fn with_recognizer(config: Config, recognizer: Arc<dyn StructureRecognizer>) -> Self {
        let store = Arc::new(Store::new(&config).with_recognizer(recognizer));
        Self::from_store(config, store)
    }

    fn from_store(config: Config, store: Arc<Store>) -> Self {
        let engine = Arc::new(SyncEngine::new(Arc::clone(&store), &config));
        Self {
            config,
            store,
            engine,
            mode: Mutex::new(Mode::Idle),
        }
    }

    // =========================================================================
    // Tables and Entries
    // =========================================================================

    /// View of the whole table
    pub fn root_table(&self) -> Table {
        Table::new(Arc::clone(&self.store), "")
    }

    /// View of the sub-table at `table_path`
    pub fn table(&self, table_path: &str) -> Table {
        Table::new(Arc::clone(&self.store), table_path)
    }

    /// Handle for the entry at `entry_path` (never publishes anything by itself)
    pub fn entry(&self, entry_path: &str) -> Entry {
        Entry::new(Arc::clone(&self.store), entry_path)
    }

    /// Live entries at or below `prefix`, sorted by path or in creation order
    pub fn entries(&self, prefix: &str, sorted: bool) -> Vec<Entry> {
        self.store
            .paths(prefix, sorted)
            .iter()
            .map(|p| self.entry(p))
            .collect()
    }

    /// Full paths of live entries at or below `prefix`
    pub fn entry_paths(&self, prefix: &str, sorted: bool) -> Vec<String> {
        self.store.paths(prefix, sorted)
    }

    /// Nested view of every entry at or below `prefix`
    ///
    /// Node paths are full paths.
    pub fn build_tree(&self, prefix: &str) -> TreeNode {
        crate::table::build_tree(self.store.paths(prefix, true))
    }

    /// Resolve a full path to an entry, a sub-table, or both
    pub fn resolve(&self, full_path: &str) -> Option<Resolved> {
        self.root_table().resolve(full_path)
    }

    /// Delete every entry that is not persistent, on every peer
    pub fn delete_all_entries(&self) -> usize {
        self.store.delete_all_local()
    }

    /// The default metadata-prefix recognizer for this instance's config
    pub fn metadata_prefix(&self) -> MetadataPrefix {
        MetadataPrefix::new(self.config.metadata_prefix.clone())
    }

    /// Set a value by full path
    pub fn set_value(&self, entry_path: &str, value: impl Into<Value>) -> Result<u64> {
        self.entry(entry_path).set(value)
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Listen for changes at or below `prefix` (`""` for everything)
    pub fn add_entry_listener<F>(&self, prefix: &str, mask: EventMask, callback: F) -> ListenerId
    where
        F: Fn(&EntryEvent) + Send + Sync + 'static,
    {
        let callback: EntryCallback = Arc::new(callback);
        self.store
            .add_entry_listener(ListenerScope::prefix(prefix), mask, callback)
    }

    /// Listen for connection state changes
    ///
    /// With `immediate`, the current state is delivered first.
    pub fn add_connection_listener<F>(&self, callback: F, immediate: bool) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let callback: ConnectionCallback = Arc::new(callback);
        let current = immediate.then(|| ConnectionEvent {
            state: self.connection_state(),
            peer: None,
            joined: false,
        });
        self.store.add_connection_listener(callback, current)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.store.remove_listener(id)
    }

    // =========================================================================
    // Connection Lifecycle
    // =========================================================================

    /// Serve the table on `config.listen_addr`; returns the bound address
    ///
    /// Loads the persistent snapshot first if `persist_path` is configured
    /// and the file exists.
    pub fn start_server(&self) -> Result<SocketAddr> {
        let mut mode = self.mode.lock();
        if !matches!(*mode, Mode::Idle) {
            return Err(SyncError::Config("instance is already networked".to_string()));
        }

        if let Some(persist_path) = &self.config.persist_path {
            if persist_path.exists() {
                self.load_persistent(persist_path)?;
            }
        }

        self.engine.set_role(Role::Server);
        let server = match Server::start(self.config.clone(), Arc::clone(&self.engine)) {
            Ok(server) => server,
            Err(e) => {
                self.engine.set_role(Role::Standalone);
                return Err(e);
            }
        };
        let addr = server.local_addr();
        *mode = Mode::Server(server);
        Ok(addr)
    }

    /// Keep a link to the server at `server_addr`, reconnecting as needed
    ///
    /// Returns immediately; watch `connection_state` or a connection listener.
    pub fn connect_as_client(&self, server_addr: &str) -> Result<()> {
        let mut mode = self.mode.lock();
        if !matches!(*mode, Mode::Idle) {
            return Err(SyncError::Config("instance is already networked".to_string()));
        }

        self.engine.set_role(Role::Client);
        let client = match Client::start(server_addr, self.config.clone(), Arc::clone(&self.engine)) {
            Ok(client) => client,
            Err(e) => {
                self.engine.set_role(Role::Standalone);
                return Err(e);
            }
        };
        *mode = Mode::Client(client);
        Ok(())
    }

    /// Stop the server or client, closing every connection
    ///
    /// A server with `persist_path` saves its persistent entries first.
    pub fn disconnect(&self) {
        let previous = std::mem::replace(&mut *self.mode.lock(), Mode::Idle);
        match previous {
            Mode::Idle => return,
            Mode::Server(server) => {
                if let Some(persist_path) = &self.config.persist_path {
                    if let Err(e) = self.save_persistent(persist_path) {
                        tracing::warn!("Failed to save persistent entries: {}", e);
                    }
                }
                server.shutdown();
            }
            Mode::Client(client) => client.stop(),
        }
        self.engine.set_role(Role::Standalone);
        self.engine.set_state(ConnectionState::Disconnected, None, false);
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.engine.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// True once a peer's initial state has been applied on the current link
    pub fn is_synced(&self) -> bool {
        self.engine.is_synced()
    }

    /// Block until connected and initially synced, or `timeout` elapses
    pub fn wait_for_sync(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !(self.is_connected() && self.is_synced()) {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }
        true
    }

    /// Block until every queued outbound message was written and flushed
    /// to its socket, or `timeout` elapses
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.store.peers().pending() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }
        true
    }

    /// Peers that completed the handshake
    pub fn connections(&self) -> Vec<PeerInfo> {
        self.store.peers().infos()
    }

    pub fn role(&self) -> Role {
        self.engine.role()
    }

    pub fn node_id(&self) -> NodeId {
        self.store.node_id()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write every persistent entry to `file`; returns how many were saved
    pub fn save_persistent(&self, file: &Path) -> Result<usize> {
        let records: Vec<PersistRecord> = self
            .store
            .entries("")
            .iter()
            .filter(|(_, snapshot)| snapshot.flags.is_persistent())
            .map(|(p, snapshot)| PersistRecord::from_snapshot(p, snapshot))
            .collect();
        persist::save(file, &records)?;
        Ok(records.len())
    }

    /// Merge the entries saved in `file` into the table
    pub fn load_persistent(&self, file: &Path) -> Result<LoadResult> {
        let (records, result) = persist::load(file)?;
        for record in records {
            let record_path = path::normalize(&record.path);
            if !self
                .store
                .restore(&record_path, record.value, record.version, record.flags)
            {
                tracing::debug!("Kept newer local state for {}", record_path);
            }
        }
        tracing::info!(
            "Loaded {} persistent entries from {}",
            result.records_loaded,
            file.display()
        );
        Ok(result)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.disconnect();
    }
}
