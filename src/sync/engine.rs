//! Sync Engine
//!
//! Routes inbound peer messages into the store and tracks link state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::Sender;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{Config, DisconnectPolicy};
use crate::error::Result;
use crate::network::{ConnectionEvent, ConnectionState, PeerInfo};
use crate::protocol::{Hello, Message};
use crate::store::Store;

use super::PeerId;

/// Which side of the link this participant is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Not networked
    Standalone,
    Server,
    Client,
}

/// Applies inbound messages and owns the link-level bookkeeping
pub struct SyncEngine {
    store: Arc<Store>,
    node_name: String,
    disconnect_policy: DisconnectPolicy,

    role: Mutex<Role>,
    state: Mutex<ConnectionState>,
    next_peer_id: AtomicU64,

    /// A peer finished sending its initial state
    synced: AtomicBool,
}

impl SyncEngine {
    pub fn new(store: Arc<Store>, config: &Config) -> Self {
        Self {
            store,
            node_name: config.node_name.clone(),
            disconnect_policy: config.disconnect_policy,
            role: Mutex::new(Role::Standalone),
            state: Mutex::new(ConnectionState::Disconnected),
            next_peer_id: AtomicU64::new(1),
            synced: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn role(&self) -> Role {
        *self.role.lock()
    }

    pub fn set_role(&self, role: Role) {
        *self.role.lock() = role;
        self.store.set_client_mode(role == Role::Client);
        self.store.set_server_mode(role == Role::Server);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// True once some peer's initial state has been applied
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    pub fn allocate_peer_id(&self) -> PeerId {
        self.next_peer_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Our handshake message
    pub fn hello(&self) -> Message {
        Message::Hello(Hello {
            node_id: self.store.node_id(),
            name: self.node_name.clone(),
            role: self.role(),
        })
    }

    // =========================================================================
    // Link Lifecycle
    // =========================================================================

    /// Record a state change and notify connection listeners
    ///
    /// `joined` says whether `peer` arrived or went away.
    pub fn set_state(&self, state: ConnectionState, peer: Option<PeerInfo>, joined: bool) {
        {
            let mut current = self.state.lock();
            if *current == state && peer.is_none() {
                return;
            }
            *current = state;
        }
        tracing::debug!("Connection state -> {:?}", state);
        self.store.notify_connection(ConnectionEvent {
            state,
            peer,
            joined,
        });
    }

    /// Handshake done: exchange full state and start forwarding to the peer
    pub fn attach(&self, peer: PeerInfo, outbound: Sender<Message>) {
        let sent = self.store.attach_peer(peer.clone(), outbound);
        tracing::debug!(
            "Peer {} ({} @ {}) attached, sent {} entries",
            peer.id,
            peer.name,
            peer.addr,
            sent
        );
        self.set_state(ConnectionState::Connected, Some(peer), true);
    }

    /// The peer's connection ended
    pub fn detach(&self, peer: &PeerInfo) {
        self.store.detach_peer(peer.id);
        tracing::debug!("Peer {} ({}) detached", peer.id, peer.addr);

        let state = if self.store.peers().is_empty() {
            self.synced.store(false, Ordering::Release);
            ConnectionState::Disconnected
        } else {
            ConnectionState::Connected
        };
        self.set_state(state, Some(peer.clone()), false);

        if self.role() == Role::Client {
            self.apply_disconnect_policy();
        }
    }

    /// What a client does with its entries once its server link is gone
    pub fn apply_disconnect_policy(&self) {
        match self.disconnect_policy {
            DisconnectPolicy::ClearNonPersistent => {
                let cleared = self.store.clear_non_persistent();
                tracing::debug!("Cleared {} non-persistent entries after disconnect", cleared);
            }
            DisconnectPolicy::Retain => {}
        }
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Apply one message received from `peer`, in receipt order
    pub fn handle(&self, peer: &PeerInfo, message: Message) -> Result<()> {
        tracing::trace!("Received from peer {}: {:?}", peer.id, message.message_type());

        match message {
            Message::Keepalive => {}
            Message::SnapshotDone => {
                self.synced.store(true, Ordering::Release);
                tracing::debug!("Initial sync from peer {} complete", peer.id);
            }
            Message::Hello(hello) => {
                tracing::warn!(
                    "Ignoring repeated handshake from peer {} ({})",
                    peer.id,
                    hello.name
                );
            }
            Message::Update(update) => {
                self.store.apply_remote_update(&update, Some(peer.id));
            }
            Message::Delete(delete) => {
                self.store.apply_remote_delete(&delete, Some(peer.id));
            }
        }
        Ok(())
    }
}
