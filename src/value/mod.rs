//! Value Module
//!
//! Typed values stored in table entries.
//!
//! ## Responsibilities
//! - Tagged union over the supported scalar, array and raw types
//! - Structural, type-sensitive equality (`Double(1.0) != String("1.0")`)
//! - Serde support for the wire codec and persistence files
//! - Typed access through the [`TypedValue`] capability trait
//!
//! No coercion happens here: parsing user text into a double is the
//! caller's business.

mod value;
mod typed;

pub use value::{Value, ValueType};
pub use typed::TypedValue;
