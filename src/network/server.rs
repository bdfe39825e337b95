//! TCP Server
//!
//! Accepts connections and runs each one on its own thread.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::Result;
use crate::sync::{PeerId, SyncEngine};

use super::Connection;

/// How long the acceptor sleeps when no connection is pending
const ACCEPT_POLL: Duration = Duration::from_millis(50);

struct Shared {
    config: Config,
    engine: Arc<SyncEngine>,
    listener: TcpListener,
    shutdown: AtomicBool,
    connections: Mutex<HashMap<PeerId, Arc<Connection>>>,

    /// Connection threads; finished ones are pruned on accept
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// TCP server hosting the table for its clients
pub struct Server {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Bind the listen address and start accepting on a background thread
    pub fn start(config: Config, engine: Arc<SyncEngine>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        // Non-blocking accept so the loop can observe shutdown
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(Shared {
            config,
            engine,
            listener,
            shutdown: AtomicBool::new(false),
            connections: Mutex::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
        });

        let thread_shared = Arc::clone(&shared);
        let acceptor = thread::Builder::new()
            .name("tablesync-accept".to_string())
            .spawn(move || accept_loop(thread_shared))?;

        tracing::info!("Server listening on {}", local_addr);

        Ok(Self {
            shared,
            local_addr,
            acceptor: Mutex::new(Some(acceptor)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of live client connections
    pub fn connection_count(&self) -> usize {
        self.shared.connections.lock().len()
    }

    /// Stop accepting, end every connection and wait for their threads
    ///
    /// Messages already queued for a client are written before its socket closes.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(acceptor) = self.acceptor.lock().take() {
            if acceptor.join().is_err() {
                tracing::warn!("Acceptor thread panicked");
            }
        }

        let connections: Vec<Arc<Connection>> =
            self.shared.connections.lock().values().cloned().collect();
        for connection in connections {
            connection.stop();
        }

        let workers: Vec<JoinHandle<()>> = self.shared.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                tracing::warn!("Connection thread panicked");
            }
        }

        tracing::info!("Server on {} stopped", self.local_addr);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(shared: Arc<Shared>) {
    while !shared.shutdown.load(Ordering::Acquire) {
        match shared.listener.accept() {
            Ok((stream, addr)) => spawn_connection(&shared, stream, addr),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                tracing::warn!("Accept failed: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn spawn_connection(shared: &Arc<Shared>, stream: TcpStream, addr: SocketAddr) {
    if let Err(e) = stream.set_nonblocking(false) {
        tracing::warn!("Rejecting {}: {}", addr, e);
        return;
    }

    if shared.connections.lock().len() >= shared.config.max_connections {
        tracing::warn!(
            "Rejecting {}: connection limit {} reached",
            addr,
            shared.config.max_connections
        );
        return;
    }

    let id = shared.engine.allocate_peer_id();
    let connection = match Connection::new(id, stream, &shared.config) {
        Ok(connection) => Arc::new(connection),
        Err(e) => {
            tracing::warn!("Failed to set up connection from {}: {}", addr, e);
            return;
        }
    };

    shared.connections.lock().insert(id, Arc::clone(&connection));
    tracing::debug!("Accepted connection {} from {}", id, addr);

    let thread_shared = Arc::clone(shared);
    let thread_connection = Arc::clone(&connection);
    let mut workers = shared.workers.lock();
    workers.retain(|w| !w.is_finished());

    let spawned = thread::Builder::new()
        .name(format!("tablesync-conn-{}", id))
        .spawn(move || {
            if let Err(e) = thread_connection.run(&thread_shared.engine) {
                tracing::debug!("Connection {} ended with error: {}", id, e);
            }
            thread_shared.connections.lock().remove(&id);
        });

    match spawned {
        Ok(worker) => workers.push(worker),
        Err(e) => {
            tracing::warn!("Failed to spawn connection thread for {}: {}", addr, e);
            connection.close();
            shared.connections.lock().remove(&id);
        }
    }
}
