//! Entry Module
//!
//! A single named, typed, versioned value.
//!
//! ## Responsibilities
//! - Lightweight [`Entry`] handles bound to a path in the shared store
//! - Entry flags (persistent, read-only-from-clients)
//! - Change listeners and their off-lock delivery
//!
//! An `Entry` owns no state. The `(value, version, flags)` triple lives in
//! the store behind one lock, so readers always see a complete triple.

mod entry;
mod flags;
mod listener;

pub use entry::{Entry, EntrySnapshot};
pub use flags::EntryFlags;
pub use listener::{
    ConnectionCallback, EntryCallback, EntryEvent, EventKind, EventMask, ListenerId,
    ListenerScope,
};

pub(crate) use listener::Notifier;
