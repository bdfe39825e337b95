//! Outbound fan-out to connected peers

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::channel::Sender;
use parking_lot::RwLock;

use crate::network::PeerInfo;
use crate::protocol::Message;

/// Locally unique id of one connection
pub type PeerId = u64;

struct PeerHandle {
    info: PeerInfo,
    outbound: Sender<Message>,
}

/// The set of peers that receive broadcasts
///
/// Each peer has an unbounded outbound queue drained by its writer thread,
/// so queuing never blocks the caller.
#[derive(Default)]
pub struct PeerSet {
    peers: RwLock<HashMap<PeerId, PeerHandle>>,

    /// Messages taken off a queue by a writer but not yet flushed to its socket
    unflushed: AtomicUsize,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, info: PeerInfo, outbound: Sender<Message>) {
        self.peers
            .write()
            .insert(info.id, PeerHandle { info, outbound });
    }

    pub fn remove(&self, id: PeerId) -> Option<PeerInfo> {
        self.peers.write().remove(&id).map(|h| h.info)
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    pub fn infos(&self) -> Vec<PeerInfo> {
        let mut infos: Vec<PeerInfo> = self.peers.read().values().map(|h| h.info.clone()).collect();
        infos.sort_by_key(|i| i.id);
        infos
    }

    /// Messages not yet flushed to a socket, queued or held by a writer
    pub fn pending(&self) -> usize {
        let queued: usize = self.peers.read().values().map(|h| h.outbound.len()).sum();
        queued + self.unflushed.load(Ordering::Acquire)
    }

    /// A writer is about to take `count` messages off its queue
    pub(crate) fn begin_write(&self, count: usize) {
        self.unflushed.fetch_add(count, Ordering::AcqRel);
    }

    /// A writer flushed (or gave up on) `count` messages
    pub(crate) fn end_write(&self, count: usize) {
        self.unflushed.fetch_sub(count, Ordering::AcqRel);
    }

    /// Queue `message` for every peer except `except`. Returns how many queues accepted it.
    pub fn broadcast(&self, message: &Message, except: Option<PeerId>) -> usize {
        let peers = self.peers.read();
        let mut sent = 0;
        for (id, handle) in peers.iter() {
            if Some(*id) == except {
                continue;
            }
            match handle.outbound.send(message.clone()) {
                Ok(()) => sent += 1,
                Err(_) => tracing::trace!("Outbound queue for peer {} is closed", id),
            }
        }
        sent
    }
}
