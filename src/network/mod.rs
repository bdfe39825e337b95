//! Network Module
//!
//! TCP transport between a server and its clients.
//!
//! ## Architecture
//! - Server: one acceptor thread, one thread per connection
//! - Client: one thread running the connect / serve / back off loop
//! - Each connection: the owning thread reads, a writer thread drains the
//!   outbound queue and emits keepalives on idle links
//! - Inbound messages go to the SyncEngine in receipt order

mod client;
mod connection;
mod server;
mod state;

pub use client::Client;
pub use connection::Connection;
pub use server::Server;
pub use state::{ConnectionEvent, ConnectionState, PeerInfo};
