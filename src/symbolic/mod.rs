//! Narrow interface to the symbolic-expression capability.
//!
//! The core never simplifies or solves equations; it only needs to add
//! bounds, order them, and rename the symbols that stand for iteration
//! dimensions.

pub mod expr;

pub use expr::{compare_bound, BoundOrdering, SymExpr};

use crate::utils::intern::Symbol;
use std::collections::BTreeMap;

/// A symbol-to-expression replacement table.
pub type Substitution = BTreeMap<Symbol, SymExpr>;

/// Values that can have symbols replaced, producing a new value.
pub trait Substitute {
    /// Apply `mapping` to every symbolic expression reachable from `self`.
    fn substitute(&self, mapping: &Substitution) -> Self;
}

impl Substitute for SymExpr {
    fn substitute(&self, mapping: &Substitution) -> Self {
        SymExpr::substitute(self, mapping)
    }
}

/// Free-function form of [`Substitute::substitute`].
pub fn substitute<T: Substitute>(value: &T, mapping: &Substitution) -> T {
    value.substitute(mapping)
}

/// A substitution renaming a single symbol.
pub fn rename(from: Symbol, to: Symbol) -> Substitution {
    let mut mapping = Substitution::new();
    mapping.insert(from, SymExpr::symbol(to));
    mapping
}
