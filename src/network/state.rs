//! Connection state and peer descriptions

use crate::sync::{NodeId, PeerId, Role};

/// Link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// A peer that completed the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addr: String,
    pub name: String,
    pub node_id: NodeId,
    pub role: Role,
}

/// Delivered to connection listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// Overall state after the change
    pub state: ConnectionState,

    /// The peer that joined or left, if any
    pub peer: Option<PeerInfo>,

    /// True if `peer` just joined, false if it left
    pub joined: bool,
}

impl ConnectionEvent {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}
