//! TCP Client
//!
//! Keeps one link to a server alive, reconnecting with backoff.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::sync::SyncEngine;

use super::{Connection, ConnectionState};

/// Port used when the server address has none
pub const DEFAULT_PORT: u16 = 1735;

/// Client side of the link
///
/// The background thread loops: connect, serve until the link drops,
/// apply the disconnect policy, wait out the backoff, try again.
pub struct Client {
    server_addr: String,
    stopping: Arc<AtomicBool>,

    /// Dropped on stop to wake the backoff wait
    wake: Mutex<Option<Sender<()>>>,

    current: Arc<Mutex<Option<Arc<Connection>>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Start connecting to `server_addr` in the background
    pub fn start(server_addr: &str, config: Config, engine: Arc<SyncEngine>) -> Result<Self> {
        let server_addr = with_default_port(server_addr);
        let stopping = Arc::new(AtomicBool::new(false));
        let current = Arc::new(Mutex::new(None));
        let (wake, sleeper) = bounded(1);

        let worker = Worker {
            server_addr: server_addr.clone(),
            config,
            engine,
            stopping: Arc::clone(&stopping),
            current: Arc::clone(&current),
            sleeper,
        };
        let thread = thread::Builder::new()
            .name("tablesync-client".to_string())
            .spawn(move || worker.run())?;

        tracing::info!("Client started for {}", server_addr);

        Ok(Self {
            server_addr,
            stopping,
            wake: Mutex::new(Some(wake)),
            current,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    /// Stop reconnecting and end the current link after its queued
    /// messages are written. Idempotent.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        self.wake.lock().take();

        if let Some(connection) = self.current.lock().as_ref() {
            connection.stop();
        }

        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                tracing::warn!("Client thread panicked");
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    server_addr: String,
    config: Config,
    engine: Arc<SyncEngine>,
    stopping: Arc<AtomicBool>,
    current: Arc<Mutex<Option<Arc<Connection>>>>,
    sleeper: Receiver<()>,
}

impl Worker {
    fn run(self) {
        let mut attempt: u32 = 0;

        while !self.is_stopping() {
            self.engine.set_state(ConnectionState::Connecting, None, false);

            match self.connect() {
                Ok(stream) => {
                    if self.serve(stream) {
                        attempt = 0;
                    }
                }
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", self.server_addr, e);
                }
            }

            self.engine.set_state(ConnectionState::Disconnected, None, false);
            if self.is_stopping() {
                break;
            }

            let delay = self.config.reconnect.delay(attempt);
            attempt = attempt.saturating_add(1);
            tracing::debug!("Reconnecting to {} in {:?}", self.server_addr, delay);

            match self.sleeper.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::info!("Client for {} stopped", self.server_addr);
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    fn connect(&self) -> Result<TcpStream> {
        let timeout = Duration::from_millis(self.config.read_timeout_ms.max(1));
        let addrs: Vec<SocketAddr> = self.server_addr.to_socket_addrs()?.collect();

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(e) => SyncError::Io(e),
            None => SyncError::Connection(format!("{} resolved to no address", self.server_addr)),
        })
    }

    /// Run one link to completion. Returns true if the handshake completed.
    fn serve(&self, stream: TcpStream) -> bool {
        let id = self.engine.allocate_peer_id();
        let connection = match Connection::new(id, stream, &self.config) {
            Ok(connection) => Arc::new(connection),
            Err(e) => {
                tracing::warn!("Failed to set up connection to {}: {}", self.server_addr, e);
                return false;
            }
        };

        *self.current.lock() = Some(Arc::clone(&connection));
        // stop() may have run before the connection was visible to it
        if self.is_stopping() {
            connection.stop();
        }

        if let Err(e) = connection.run(&self.engine) {
            tracing::debug!("Link to {} ended with error: {}", self.server_addr, e);
        }

        self.current.lock().take();
        connection.is_established()
    }
}

/// Append the default port to a bare host name
fn with_default_port(addr: &str) -> String {
    if addr.parse::<SocketAddr>().is_ok() {
        return addr.to_string();
    }
    match addr.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => addr.to_string(),
        _ => format!("{}:{}", addr, DEFAULT_PORT),
    }
}
