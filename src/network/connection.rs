//! Connection Handler
//!
//! Runs one established peer link, client or server side.

use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Select, Sender, TryRecvError};

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::protocol::{decode_frame, encode_message, read_frame, Hello, Message};
use crate::store::Store;
use crate::sync::{PeerId, SyncEngine};

use super::PeerInfo;

/// Handles a single peer connection
///
/// `run` blocks the calling thread until the link ends. `stop` and `close`
/// may be called from any thread at any time. `stop` ends reading but lets
/// the writer flush what is already queued; `close` drops the link at once.
pub struct Connection {
    id: PeerId,

    /// Kept for `close`; reader and writer use their own clones
    stream: TcpStream,

    /// Peer address for logging
    peer_addr: String,

    keepalive: Duration,

    closed: AtomicBool,

    /// Set once the handshake completed
    established: AtomicBool,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Disables Nagle and configures timeouts.
    pub fn new(id: PeerId, stream: TcpStream, config: &Config) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        if config.read_timeout_ms > 0 {
            stream.set_read_timeout(Some(Duration::from_millis(config.read_timeout_ms)))?;
        }
        if config.write_timeout_ms > 0 {
            stream.set_write_timeout(Some(Duration::from_millis(config.write_timeout_ms)))?;
        }

        Ok(Self {
            id,
            stream,
            peer_addr,
            keepalive: Duration::from_millis(config.keepalive_interval_ms.max(1)),
            closed: AtomicBool::new(false),
            established: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop reading and end the link once queued messages are written. Idempotent.
    pub fn stop(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Stopping connection to {}", self.peer_addr);
            let _ = self.stream.shutdown(Shutdown::Read);
        }
    }

    /// Tear the link down without draining. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Closing connection to {}", self.peer_addr);
            let _ = self.stream.shutdown(Shutdown::Both);
        }
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Handshake, initial state exchange, then inbound messages until the
    /// peer goes away or `close` is called.
    pub fn run(&self, engine: &SyncEngine) -> Result<()> {
        let (outbound, queue) = unbounded();

        let writer_stream = self.stream.try_clone()?;
        let keepalive = self.keepalive;
        let peer_addr = self.peer_addr.clone();
        let store = Arc::clone(engine.store());
        let writer = thread::Builder::new()
            .name(format!("tablesync-writer-{}", self.id))
            .spawn(move || write_loop(writer_stream, queue, keepalive, peer_addr, store))?;

        let result = self.serve(engine, &outbound);

        // The peer set dropped its sender on detach; once ours is gone the
        // writer drains the queue and exits. A failed link is cut first.
        drop(outbound);
        if result.is_err() {
            self.close();
        }
        if writer.join().is_err() {
            tracing::warn!("Writer thread for {} panicked", self.peer_addr);
        }
        self.closed.store(true, Ordering::Release);
        let _ = self.stream.shutdown(Shutdown::Both);
        result
    }

    fn serve(&self, engine: &SyncEngine, outbound: &Sender<Message>) -> Result<()> {
        let _ = outbound.send(engine.hello());

        let mut reader = BufReader::new(self.stream.try_clone()?);
        let hello = self.read_hello(&mut reader)?;

        let peer = PeerInfo {
            id: self.id,
            addr: self.peer_addr.clone(),
            name: hello.name,
            node_id: hello.node_id,
            role: hello.role,
        };

        engine.attach(peer.clone(), outbound.clone());
        self.established.store(true, Ordering::Release);

        let result = self.read_loop(&mut reader, engine, &peer);
        engine.detach(&peer);
        result
    }

    fn read_hello(&self, reader: &mut BufReader<TcpStream>) -> Result<Hello> {
        let frame = read_frame(reader)?;
        match decode_frame(&frame)? {
            Message::Hello(hello) => {
                tracing::debug!(
                    "Handshake from {}: {} ({:?}, node {})",
                    self.peer_addr,
                    hello.name,
                    hello.role,
                    hello.node_id
                );
                Ok(hello)
            }
            other => Err(SyncError::Protocol(format!(
                "Expected HELLO from {}, got {:?}",
                self.peer_addr,
                other.message_type()
            ))),
        }
    }

    fn read_loop(
        &self,
        reader: &mut BufReader<TcpStream>,
        engine: &SyncEngine,
        peer: &PeerInfo,
    ) -> Result<()> {
        loop {
            let frame = match read_frame(reader) {
                Ok(frame) => frame,
                Err(e) if e.is_disconnect() || self.is_closed() => {
                    tracing::debug!("Peer {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(e) if e.is_timeout() => {
                    tracing::warn!("Peer {} timed out", self.peer_addr);
                    return Err(SyncError::Connection(format!(
                        "read timeout from {}",
                        self.peer_addr
                    )));
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    return Err(e);
                }
            };

            // A bad frame was still read in full, so the stream is intact
            let message = match decode_frame(&frame) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!("Dropping malformed frame from {}: {}", self.peer_addr, e);
                    continue;
                }
            };

            if let Err(e) = engine.handle(peer, message) {
                tracing::warn!("Failed to apply message from {}: {}", self.peer_addr, e);
            }
        }
    }
}

/// Drain the outbound queue onto the socket, writing keepalives when idle
///
/// Messages are counted as unflushed before they leave the queue, so
/// `PeerSet::pending` only reaches zero once they are on the socket.
fn write_loop(
    stream: TcpStream,
    queue: Receiver<Message>,
    keepalive: Duration,
    peer_addr: String,
    store: Arc<Store>,
) {
    let peers = store.peers();
    let mut writer = BufWriter::new(stream);

    loop {
        let mut select = Select::new();
        select.recv(&queue);
        if select.ready_timeout(keepalive).is_err() {
            if write_batch(&mut writer, &[Message::Keepalive], &peer_addr).is_err() {
                break;
            }
            continue;
        }

        // Ready means a message is queued or every sender is gone
        let count = queue.len().max(1);
        peers.begin_write(count);
        let mut batch = Vec::with_capacity(count);
        let mut disconnected = false;
        while batch.len() < count {
            match queue.try_recv() {
                Ok(message) => batch.push(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        let written = write_batch(&mut writer, &batch, &peer_addr);
        peers.end_write(count);
        if written.is_err() || disconnected {
            break;
        }
    }
}

/// Write and flush one batch; on failure the socket is shut down
fn write_batch(
    writer: &mut BufWriter<TcpStream>,
    batch: &[Message],
    peer_addr: &str,
) -> std::io::Result<()> {
    for message in batch {
        let bytes = match encode_message(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Dropping unencodable message for {}: {}", peer_addr, e);
                continue;
            }
        };
        if let Err(e) = writer.write_all(&bytes) {
            return fail(writer, peer_addr, e);
        }
    }
    if let Err(e) = writer.flush() {
        return fail(writer, peer_addr, e);
    }
    Ok(())
}

fn fail(writer: &BufWriter<TcpStream>, peer_addr: &str, e: std::io::Error) -> std::io::Result<()> {
    tracing::debug!("Error writing to {}: {}", peer_addr, e);
    let _ = writer.get_ref().shutdown(Shutdown::Both);
    Err(e)
}
