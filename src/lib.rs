//! # tablesync
//!
//! A synchronized, hierarchical key-value table shared between a server
//! (e.g. a robot controller) and its clients (e.g. operator dashboards):
//! - Typed values with per-entry versions and flags
//! - Hierarchical paths with sub-table views
//! - Last-writer-wins sync keyed on versions, not clocks
//! - Change and connection listeners delivered off-lock
//! - Automatic reconnect with full-state exchange
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Instance  (Table views / Entry handles)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ local set / delete
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Store                                │
//! │        (RwLock: value, version, flags per path)              │
//! └──────┬──────────────────────────────┬───────────────────────┘
//!        │ notifications                │ outbound queues
//!        ▼                              ▼
//!   ┌─────────────┐          ┌──────────────────────┐
//!   │  Notifier   │          │   PeerSet / writers  │──► TCP
//!   │  (thread)   │          └──────────────────────┘
//!   └─────────────┘          ┌──────────────────────┐
//!                            │ SyncEngine (merge)   │◄── TCP readers
//!                            └──────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use tablesync::{Config, Instance};
//!
//! let nt = Instance::new(Config::default());
//! nt.connect_as_client("localhost").unwrap();
//!
//! let sd = nt.table("SmartDashboard");
//! let time = sd.get_number("robotTime", 0.0);
//! sd.put_boolean("lightOn", time > 5.0).unwrap();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod value;
pub mod entry;
pub mod table;
pub mod store;
pub mod protocol;
pub mod sync;
pub mod network;
pub mod persist;
pub mod instance;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{SyncError, Result};
pub use config::{Config, DisconnectPolicy, ReconnectPolicy, TypePolicy};
pub use entry::{Entry, EntryEvent, EntryFlags, EventKind, EventMask, ListenerId};
pub use instance::Instance;
pub use network::{ConnectionEvent, ConnectionState};
pub use table::{Resolved, Table, TreeNode};
pub use value::{TypedValue, Value, ValueType};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of tablesync
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
