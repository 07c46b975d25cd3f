//! Symbol interning for dimension, array and parameter names.
//!
//! Names are compared and hashed constantly while passes rebuild spaces,
//! so they are interned once in a process-wide table and carried around
//! as `Copy` handles.

use string_interner::{StringInterner, DefaultSymbol, backend::StringBackend, Symbol as SymbolTrait};
use std::cmp::Ordering;
use std::fmt;
use std::sync::RwLock;
use serde::{Serialize, Serializer, Deserialize, Deserializer};
use once_cell::sync::Lazy;

/// Type alias for our interner backend
type Backend = StringBackend<DefaultSymbol>;

/// A symbol representing an interned string.
///
/// Symbols order by their text, so maps keyed by names iterate the same
/// way regardless of interning order.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(u32);

/// Global symbol interner (thread-safe).
static GLOBAL_INTERNER: Lazy<RwLock<StringInterner<Backend>>> =
    Lazy::new(|| RwLock::new(StringInterner::new()));

impl Symbol {
    /// Intern `s` and return its symbol.
    pub fn new(s: &str) -> Self {
        intern(s)
    }

    /// The interned string.
    pub fn as_string(&self) -> String {
        resolve(*self).unwrap_or_default()
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        intern(s)
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.0 == other.0 {
            return Ordering::Equal;
        }
        let interner = GLOBAL_INTERNER.read().unwrap_or_else(|e| e.into_inner());
        let text = |sym: &Symbol| {
            DefaultSymbol::try_from_usize(sym.0 as usize).and_then(|s| interner.resolve(s))
        };
        text(self).cmp(&text(other))
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`", self.as_string())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

// Symbols travel as their text; raw indices are only meaningful in-process.
impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_string())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(intern(&s))
    }
}

/// Intern a string in the global interner.
pub fn intern(s: &str) -> Symbol {
    let mut interner = GLOBAL_INTERNER.write().unwrap_or_else(|e| e.into_inner());
    let sym = interner.get_or_intern(s);
    Symbol(sym.to_usize() as u32)
}

/// Resolve a symbol from the global interner.
pub fn resolve(sym: Symbol) -> Option<String> {
    let interner = GLOBAL_INTERNER.read().unwrap_or_else(|e| e.into_inner());
    let internal_sym = DefaultSymbol::try_from_usize(sym.0 as usize)?;
    interner.resolve(internal_sym).map(|s| s.to_string())
}
