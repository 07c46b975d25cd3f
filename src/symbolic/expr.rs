//! Symbolic integer expressions used as interval bounds and subscripts.
//!
//! A `SymExpr` is a constant plus an integer-weighted sum of named symbols:
//! `e = c0 + c1*s1 + ... + cn*sn`. This is all the compiler core needs from
//! a symbolic algebra: addition, substitution, and ordering two bounds by
//! looking at the literal part of their difference.

use crate::utils::intern::Symbol;
use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::{Add, Sub, Neg};

/// Result of comparing two symbolic bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundOrdering {
    /// `a < b` for every value of the free symbols
    Lt,
    /// `a == b` structurally
    Eq,
    /// `a > b` for every value of the free symbols
    Gt,
    /// The difference still depends on free symbols
    Incomparable,
}

/// A symbolic integer expression: constant + sum(coeff * symbol).
///
/// The arithmetic operators follow plain `i64` semantics and are meant
/// for halo offsets and block sizes. Anything derived from untrusted
/// constants goes through the `checked_*` forms, which report overflow
/// as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymExpr {
    /// Constant term
    #[serde(default)]
    pub constant: i64,
    /// Coefficient for each symbol; zero coefficients are never stored
    #[serde(default)]
    pub terms: BTreeMap<Symbol, i64>,
}

impl SymExpr {
    /// The literal zero.
    pub fn zero() -> Self {
        Self::default()
    }

    /// A literal integer.
    pub fn int(value: i64) -> Self {
        Self { constant: value, terms: BTreeMap::new() }
    }

    /// A single symbol with unit coefficient.
    pub fn symbol(name: impl Into<Symbol>) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(name.into(), 1);
        Self { constant: 0, terms }
    }

    /// Check if this expression has no free symbols.
    pub fn is_literal(&self) -> bool {
        self.terms.is_empty()
    }

    /// Get the value if this is a literal.
    pub fn as_literal(&self) -> Option<i64> {
        if self.is_literal() { Some(self.constant) } else { None }
    }

    pub fn is_zero(&self) -> bool {
        self.as_literal() == Some(0)
    }

    /// Coefficient of `sym` (zero if absent).
    pub fn coeff(&self, sym: Symbol) -> i64 {
        self.terms.get(&sym).copied().unwrap_or(0)
    }

    /// All symbols this expression depends on.
    pub fn free_symbols(&self) -> BTreeSet<Symbol> {
        self.terms.keys().copied().collect()
    }

    /// Scale the expression by a constant.
    pub fn scale(&self, factor: i64) -> Self {
        let mut out = Self::int(self.constant * factor);
        for (&s, &c) in &self.terms {
            out.add_term(s, c * factor);
        }
        out
    }

    /// `self + other`, or `None` on overflow.
    pub fn checked_add(&self, other: &SymExpr) -> Option<Self> {
        let mut out = self.clone();
        out.constant = out.constant.checked_add(other.constant)?;
        for (&s, &c) in &other.terms {
            let sum = out.coeff(s).checked_add(c)?;
            out.terms.remove(&s);
            if sum != 0 {
                out.terms.insert(s, sum);
            }
        }
        Some(out)
    }

    /// `self - other`, or `None` on overflow.
    pub fn checked_sub(&self, other: &SymExpr) -> Option<Self> {
        self.checked_add(&other.checked_scale(-1)?)
    }

    /// `self * factor`, or `None` on overflow.
    pub fn checked_scale(&self, factor: i64) -> Option<Self> {
        let mut out = Self::int(self.constant.checked_mul(factor)?);
        for (&s, &c) in &self.terms {
            let c = c.checked_mul(factor)?;
            if c != 0 {
                out.terms.insert(s, c);
            }
        }
        Some(out)
    }

    fn add_term(&mut self, sym: Symbol, coeff: i64) {
        let entry = self.terms.entry(sym).or_insert(0);
        *entry += coeff;
        if *entry == 0 {
            self.terms.remove(&sym);
        }
    }

    /// Replace symbols according to `mapping`; unmapped symbols are kept.
    pub fn substitute(&self, mapping: &BTreeMap<Symbol, SymExpr>) -> Self {
        let mut out = Self::int(self.constant);
        for (&s, &c) in &self.terms {
            match mapping.get(&s) {
                Some(replacement) => out = out + replacement.scale(c),
                None => out.add_term(s, c),
            }
        }
        out
    }

    /// Evaluate given concrete symbol values; `None` if a symbol is unbound.
    pub fn evaluate(&self, bindings: &HashMap<Symbol, i64>) -> Option<i64> {
        let mut result = self.constant;
        for (s, &c) in &self.terms {
            result = result.checked_add(c.checked_mul(*bindings.get(s)?)?)?;
        }
        Some(result)
    }
}

/// Order two bounds. Only differences that reduce to a literal are ordered;
/// a difference that overflows is incomparable.
pub fn compare_bound(a: &SymExpr, b: &SymExpr) -> BoundOrdering {
    match a.checked_sub(b).and_then(|d| d.as_literal()) {
        Some(d) if d < 0 => BoundOrdering::Lt,
        Some(0) => BoundOrdering::Eq,
        Some(_) => BoundOrdering::Gt,
        None => BoundOrdering::Incomparable,
    }
}

impl From<i64> for SymExpr {
    fn from(value: i64) -> Self {
        SymExpr::int(value)
    }
}

impl From<Symbol> for SymExpr {
    fn from(sym: Symbol) -> Self {
        SymExpr::symbol(sym)
    }
}

impl Add for SymExpr {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self.constant += other.constant;
        for (s, c) in other.terms {
            self.add_term(s, c);
        }
        self
    }
}

impl Add<i64> for SymExpr {
    type Output = Self;

    fn add(mut self, other: i64) -> Self {
        self.constant += other;
        self
    }
}

impl Sub for SymExpr {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self + (-other)
    }
}

impl Sub<i64> for SymExpr {
    type Output = Self;

    fn sub(mut self, other: i64) -> Self {
        self.constant -= other;
        self
    }
}

impl Neg for SymExpr {
    type Output = Self;

    fn neg(self) -> Self {
        self.scale(-1)
    }
}

impl fmt::Display for SymExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (s, &c) in &self.terms {
            match c {
                1 => parts.push(s.to_string()),
                -1 => parts.push(format!("-{}", s)),
                _ => parts.push(format!("{}*{}", c, s)),
            }
        }
        if self.constant != 0 || parts.is_empty() {
            parts.push(self.constant.to_string());
        }
        write!(f, "{}", parts.join(" + ").replace("+ -", "- "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal() {
        let e = SymExpr::int(5);
        assert!(e.is_literal());
        assert_eq!(e.as_literal(), Some(5));
        assert!(SymExpr::zero().is_zero());
    }

    #[test]
    fn test_add_cancels_terms() {
        let x = SymExpr::symbol("x_m");
        let e = x.clone() + SymExpr::int(2) - x;
        assert_eq!(e, SymExpr::int(2));
        assert!(e.terms.is_empty());
    }

    #[test]
    fn test_compare_bound() {
        let a = SymExpr::symbol("x_m") - 1;
        let b = SymExpr::symbol("x_m") + 2;
        assert_eq!(compare_bound(&a, &b), BoundOrdering::Lt);
        assert_eq!(compare_bound(&b, &a), BoundOrdering::Gt);
        assert_eq!(compare_bound(&a, &a), BoundOrdering::Eq);
        let c = SymExpr::symbol("y_m");
        assert_eq!(compare_bound(&a, &c), BoundOrdering::Incomparable);
    }

    #[test]
    fn test_substitute() {
        let e = SymExpr::symbol("x").scale(2) + 1;
        let mut mapping = BTreeMap::new();
        mapping.insert(Symbol::new("x"), SymExpr::symbol("x_lr0") + 3);
        let s = e.substitute(&mapping);
        assert_eq!(s.coeff(Symbol::new("x_lr0")), 2);
        assert_eq!(s.constant, 7);
        assert_eq!(s.coeff(Symbol::new("x")), 0);
    }

    #[test]
    fn test_evaluate() {
        let e = SymExpr::symbol("x_M") - SymExpr::symbol("x_m") + 1;
        let mut env = HashMap::new();
        env.insert(Symbol::new("x_m"), 0);
        env.insert(Symbol::new("x_M"), 9);
        assert_eq!(e.evaluate(&env), Some(10));
        env.remove(&Symbol::new("x_M"));
        assert_eq!(e.evaluate(&env), None);
    }

    #[test]
    fn test_checked_arithmetic_reports_overflow() {
        let big = SymExpr::symbol("x_m") + i64::MAX;
        assert_eq!(big.checked_add(&SymExpr::int(1)), None);
        assert_eq!(SymExpr::int(i64::MIN).checked_scale(-1), None);
        let ordering = compare_bound(&SymExpr::int(i64::MIN), &SymExpr::int(1));
        assert_eq!(ordering, BoundOrdering::Incomparable);

        let x = SymExpr::symbol("x");
        assert_eq!(x.checked_sub(&x), Some(SymExpr::zero()));
        assert_eq!((x.clone() + 3).checked_sub(&(x - 1)), Some(SymExpr::int(4)));

        let env: HashMap<Symbol, i64> = [(Symbol::new("x_m"), 1)].into_iter().collect();
        assert_eq!(big.evaluate(&env), None);
    }

    #[test]
    fn test_display() {
        let e = SymExpr::symbol("x_M") - 1;
        assert_eq!(e.to_string(), "x_M - 1");
        assert_eq!(SymExpr::int(-2).to_string(), "-2");
    }
}
