//! Tests for SyncEngine
//!
//! These tests verify:
//! - Handshake message and role bookkeeping
//! - Attach/detach state transitions and connection events
//! - Inbound message handling (updates, deletes, sync marker)
//! - Server-side read-only protection
//! - Client disconnect policies
//! - Peer fan-out bookkeeping

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver};

use tablesync::network::PeerInfo;
use tablesync::protocol::{EntryDelete, EntryUpdate, Hello, Message};
use tablesync::store::Store;
use tablesync::sync::{NodeId, PeerSet, Role, SyncEngine};
use tablesync::{
    Config, ConnectionEvent, ConnectionState, DisconnectPolicy, EntryFlags, Value,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_engine(config: Config) -> (Arc<Store>, SyncEngine) {
    let store = Arc::new(Store::with_node_id(&config, NodeId::from_u128(1)));
    let engine = SyncEngine::new(Arc::clone(&store), &config);
    (store, engine)
}

fn peer(id: u64) -> PeerInfo {
    PeerInfo {
        id,
        addr: format!("127.0.0.1:{}", 40000 + id),
        name: format!("peer{}", id),
        node_id: NodeId::from_u128(100 + id as u128),
        role: Role::Client,
    }
}

fn update(path: &str, value: f64, version: u64, flags: EntryFlags) -> Message {
    Message::Update(EntryUpdate {
        path: path.to_string(),
        value: Value::Double(value),
        version,
        flags,
        origin: NodeId::from_u128(50),
    })
}

fn watch_connections(store: &Store) -> Receiver<ConnectionEvent> {
    let (tx, rx) = unbounded();
    store.add_connection_listener(
        Arc::new(move |event: &ConnectionEvent| {
            let _ = tx.send(event.clone());
        }),
        None,
    );
    rx
}

// =============================================================================
// Handshake Tests
// =============================================================================

#[test]
fn test_hello_carries_identity_and_role() {
    let config = Config::builder().node_name("dashboard").build();
    let (_store, engine) = setup_engine(config);
    engine.set_role(Role::Client);

    match engine.hello() {
        Message::Hello(Hello {
            node_id,
            name,
            role,
        }) => {
            assert_eq!(node_id, NodeId::from_u128(1));
            assert_eq!(name, "dashboard");
            assert_eq!(role, Role::Client);
        }
        other => panic!("expected hello, got {:?}", other),
    }
}

#[test]
fn test_peer_ids_are_unique() {
    let (_store, engine) = setup_engine(Config::default());
    let a = engine.allocate_peer_id();
    let b = engine.allocate_peer_id();

    assert_ne!(a, b);
}

// =============================================================================
// Attach / Detach Tests
// =============================================================================

#[test]
fn test_attach_connects_and_sends_state() {
    let (store, engine) = setup_engine(Config::default());
    store.set_local("x", Value::Double(1.0), None).unwrap();
    let events = watch_connections(&store);

    let (tx, rx) = unbounded();
    engine.attach(peer(1), tx);

    assert_eq!(engine.state(), ConnectionState::Connected);
    let messages: Vec<Message> = rx.try_iter().collect();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1], Message::SnapshotDone);

    let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(event.joined);
    assert_eq!(event.peer.unwrap().id, 1);
    assert_eq!(event.state, ConnectionState::Connected);
}

#[test]
fn test_detach_last_peer_disconnects() {
    let (store, engine) = setup_engine(Config::default());
    engine.set_role(Role::Server);
    let events = watch_connections(&store);
    let (tx1, _rx1) = unbounded();
    let (tx2, _rx2) = unbounded();
    engine.attach(peer(1), tx1);
    engine.attach(peer(2), tx2);

    engine.detach(&peer(1));
    assert_eq!(engine.state(), ConnectionState::Connected);

    engine.detach(&peer(2));
    assert_eq!(engine.state(), ConnectionState::Disconnected);

    let states: Vec<(ConnectionState, bool)> = (0..4)
        .map(|_| events.recv_timeout(Duration::from_secs(2)).unwrap())
        .map(|e| (e.state, e.joined))
        .collect();
    assert_eq!(
        states,
        vec![
            (ConnectionState::Connected, true),
            (ConnectionState::Connected, true),
            (ConnectionState::Connected, false),
            (ConnectionState::Disconnected, false),
        ]
    );
}

#[test]
fn test_repeated_state_without_peer_is_not_reported() {
    let (store, engine) = setup_engine(Config::default());
    let events = watch_connections(&store);

    engine.set_state(ConnectionState::Connecting, None, false);
    engine.set_state(ConnectionState::Connecting, None, false);

    assert!(events.recv_timeout(Duration::from_secs(1)).is_ok());
    assert!(events.recv_timeout(Duration::from_millis(200)).is_err());
}

// =============================================================================
// Inbound Tests
// =============================================================================

#[test]
fn test_handle_update_and_delete() {
    let (store, engine) = setup_engine(Config::default());
    let from = peer(1);

    engine
        .handle(&from, update("a/b", 2.0, 3, EntryFlags::NONE))
        .unwrap();
    assert_eq!(store.value("a/b"), Some(Value::Double(2.0)));
    assert_eq!(store.version("a/b"), 3);

    engine
        .handle(
            &from,
            Message::Delete(EntryDelete {
                path: "a/b".to_string(),
                version: 4,
                origin: NodeId::from_u128(50),
            }),
        )
        .unwrap();
    assert!(!store.contains("a/b"));
}

#[test]
fn test_snapshot_done_marks_synced() {
    let (_store, engine) = setup_engine(Config::default());
    let from = peer(1);
    let (tx, _rx) = unbounded();
    engine.attach(from.clone(), tx);

    assert!(!engine.is_synced());
    engine.handle(&from, Message::SnapshotDone).unwrap();
    assert!(engine.is_synced());

    engine.detach(&from);
    assert!(!engine.is_synced());
}

#[test]
fn test_keepalive_and_repeated_hello_are_harmless() {
    let (store, engine) = setup_engine(Config::default());
    let from = peer(1);

    engine.handle(&from, Message::Keepalive).unwrap();
    engine.handle(&from, engine.hello()).unwrap();

    assert!(store.is_empty());
}

#[test]
fn test_server_drops_client_writes_to_read_only() {
    let (store, engine) = setup_engine(Config::default());
    engine.set_role(Role::Server);
    store.set_local("locked", Value::Double(1.0), None).unwrap();
    store
        .set_flags_local("locked", EntryFlags::READ_ONLY)
        .unwrap();

    engine
        .handle(&peer(1), update("locked", 9.0, 10, EntryFlags::NONE))
        .unwrap();
    engine
        .handle(
            &peer(1),
            Message::Delete(EntryDelete {
                path: "locked".to_string(),
                version: 11,
                origin: NodeId::from_u128(50),
            }),
        )
        .unwrap();

    assert_eq!(store.value("locked"), Some(Value::Double(1.0)));
    assert_eq!(store.version("locked"), 2);
}

#[test]
fn test_client_accepts_server_writes_to_read_only() {
    let (store, engine) = setup_engine(Config::default());
    engine.set_role(Role::Client);

    engine
        .handle(&peer(1), update("locked", 1.0, 1, EntryFlags::READ_ONLY))
        .unwrap();
    engine
        .handle(&peer(1), update("locked", 2.0, 2, EntryFlags::READ_ONLY))
        .unwrap();

    assert_eq!(store.value("locked"), Some(Value::Double(2.0)));
}

// =============================================================================
// Disconnect Policy Tests
// =============================================================================

#[test]
fn test_client_detach_clears_non_persistent() {
    let (store, engine) = setup_engine(Config::default());
    engine.set_role(Role::Client);
    let from = peer(1);
    let (tx, _rx) = unbounded();
    engine.attach(from.clone(), tx);
    engine
        .handle(&from, update("volatile", 1.0, 1, EntryFlags::NONE))
        .unwrap();
    engine
        .handle(&from, update("saved", 1.0, 1, EntryFlags::PERSISTENT))
        .unwrap();

    engine.detach(&from);

    assert!(!store.contains("volatile"));
    assert!(store.contains("saved"));
}

#[test]
fn test_client_detach_retains_with_retain_policy() {
    let config = Config::builder()
        .disconnect_policy(DisconnectPolicy::Retain)
        .build();
    let (store, engine) = setup_engine(config);
    engine.set_role(Role::Client);
    let from = peer(1);
    let (tx, _rx) = unbounded();
    engine.attach(from.clone(), tx);
    engine
        .handle(&from, update("volatile", 1.0, 1, EntryFlags::NONE))
        .unwrap();

    engine.detach(&from);

    assert!(store.contains("volatile"));
}

#[test]
fn test_server_detach_never_clears() {
    let (store, engine) = setup_engine(Config::default());
    engine.set_role(Role::Server);
    let from = peer(1);
    let (tx, _rx) = unbounded();
    engine.attach(from.clone(), tx);
    engine
        .handle(&from, update("from_client", 1.0, 1, EntryFlags::NONE))
        .unwrap();

    engine.detach(&from);

    assert!(store.contains("from_client"));
}

// =============================================================================
// PeerSet Tests
// =============================================================================

#[test]
fn test_peer_set_broadcast_and_pending() {
    let peers = PeerSet::new();
    let (tx1, rx1) = unbounded();
    let (tx2, rx2) = unbounded();
    peers.insert(peer(2), tx2);
    peers.insert(peer(1), tx1);

    assert_eq!(peers.broadcast(&Message::Keepalive, Some(1)), 1);
    assert_eq!(peers.pending(), 1);
    assert!(rx1.try_recv().is_err());
    assert_eq!(rx2.try_recv().unwrap(), Message::Keepalive);
    assert_eq!(peers.pending(), 0);

    let ids: Vec<u64> = peers.infos().iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn test_peer_set_closed_queue() {
    let peers = PeerSet::new();
    let (tx, rx) = unbounded();
    peers.insert(peer(1), tx);
    drop(rx);

    assert_eq!(peers.broadcast(&Message::Keepalive, None), 0);
    assert_eq!(peers.remove(1).unwrap().id, 1);
    assert!(peers.is_empty());
}
