//! Utility modules shared across the crate.
//!
//! - Error types
//! - Symbol interning
//! - Serde helpers for maps with structured keys
//! - Pretty printing

pub mod errors;
pub mod intern;
pub mod serde_pairs;
pub mod pretty;

// Re-exports
pub use self::errors::*;
pub use self::intern::Symbol;
pub use self::pretty::{CodeFormatter, PrettyPrint};
