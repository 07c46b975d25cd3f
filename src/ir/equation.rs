//! Lowered equations.
//!
//! The front-end hands over equations already lowered to indexed array
//! accesses, each with its own iteration and data space. The core only
//! ever renames iteration variables inside them.

use crate::ir::space::{DataSpace, IterationSpace};
use crate::symbolic::{Substitute, Substitution, SymExpr};
use crate::utils::intern::Symbol;
use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// An indexed array reference, e.g. `u[t + 1, x - 1]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Access {
    pub array: Symbol,
    pub indices: Vec<SymExpr>,
}

/// How two accesses relate across iterations of their index variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDistance {
    /// They never touch the same element
    Disjoint,
    /// They touch the same element when the second access runs at the
    /// first one's index values plus these constants
    Uniform(BTreeMap<Symbol, i64>),
    /// No constant distance could be derived
    Unknown,
}

impl Access {
    pub fn new(array: impl Into<Symbol>, indices: Vec<SymExpr>) -> Self {
        Self { array: array.into(), indices }
    }

    /// Distance from `self` to `other`.
    ///
    /// Only subscripts of the form `i + c` (or a bare constant) are
    /// understood; anything else is `Unknown`.
    pub fn distance(&self, other: &Access) -> AccessDistance {
        if self.array != other.array {
            return AccessDistance::Disjoint;
        }
        if self.indices.len() != other.indices.len() {
            return AccessDistance::Unknown;
        }
        let mut distance = BTreeMap::new();
        for (a, b) in self.indices.iter().zip(&other.indices) {
            let Some(d) = a.checked_sub(b).and_then(|d| d.as_literal()) else {
                return AccessDistance::Unknown;
            };
            let mut symbols = a.free_symbols().into_iter();
            match (symbols.next(), symbols.next()) {
                (None, _) if d != 0 => return AccessDistance::Disjoint,
                (None, _) => {}
                (Some(s), None) if a.coeff(s) == 1 => {
                    if *distance.entry(s).or_insert(d) != d {
                        return AccessDistance::Disjoint;
                    }
                }
                _ => return AccessDistance::Unknown,
            }
        }
        AccessDistance::Uniform(distance)
    }
}

impl Substitute for Access {
    fn substitute(&self, mapping: &Substitution) -> Self {
        Self {
            array: self.array,
            indices: self.indices.iter().map(|i| i.substitute(mapping)).collect(),
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let idx: Vec<String> = self.indices.iter().map(|i| i.to_string()).collect();
        write!(f, "{}[{}]", self.array, idx.join(", "))
    }
}

/// Right-hand side expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Int(i64),
    /// A scalar parameter (`dt`, `h_x`, ...)
    Symbol(Symbol),
    Access(Access),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Neg(Box<Expr>),
}

impl Expr {
    /// Every array access, left to right.
    pub fn accesses(&self) -> Vec<&Access> {
        let mut out = Vec::new();
        self.collect_accesses(&mut out);
        out
    }

    fn collect_accesses<'a>(&'a self, out: &mut Vec<&'a Access>) {
        match self {
            Expr::Int(_) | Expr::Symbol(_) => {}
            Expr::Access(a) => out.push(a),
            Expr::Add(ops) | Expr::Mul(ops) => ops.iter().for_each(|e| e.collect_accesses(out)),
            Expr::Neg(e) => e.collect_accesses(out),
        }
    }
}

impl Substitute for Expr {
    fn substitute(&self, mapping: &Substitution) -> Self {
        match self {
            Expr::Int(_) | Expr::Symbol(_) => self.clone(),
            Expr::Access(a) => Expr::Access(a.substitute(mapping)),
            Expr::Add(ops) => Expr::Add(ops.iter().map(|e| e.substitute(mapping)).collect()),
            Expr::Mul(ops) => Expr::Mul(ops.iter().map(|e| e.substitute(mapping)).collect()),
            Expr::Neg(e) => Expr::Neg(Box::new(e.substitute(mapping))),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |ops: &[Expr], sep: &str| {
            ops.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(sep)
        };
        match self {
            Expr::Int(v) => write!(f, "{}", v),
            Expr::Symbol(s) => write!(f, "{}", s),
            Expr::Access(a) => write!(f, "{}", a),
            Expr::Add(ops) => write!(f, "({})", join(ops, " + ")),
            Expr::Mul(ops) => write!(f, "{}", join(ops, "*")),
            Expr::Neg(e) => write!(f, "-{}", e),
        }
    }
}

/// `lhs = rhs`, with the spaces it was lowered against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoweredEq {
    pub lhs: Access,
    pub rhs: Expr,
    pub ispace: IterationSpace,
    #[serde(default)]
    pub dspace: DataSpace,
}

impl LoweredEq {
    pub fn new(lhs: Access, rhs: Expr, ispace: IterationSpace, dspace: DataSpace) -> Self {
        Self { lhs, rhs, ispace, dspace }
    }

    /// The array written.
    pub fn write(&self) -> Symbol {
        self.lhs.array
    }

    /// Arrays read.
    pub fn reads(&self) -> BTreeSet<Symbol> {
        self.rhs.accesses().into_iter().map(|a| a.array).collect()
    }

    /// Same equation over different spaces.
    pub fn with_spaces(&self, ispace: IterationSpace, dspace: DataSpace) -> Self {
        Self { lhs: self.lhs.clone(), rhs: self.rhs.clone(), ispace, dspace }
    }
}

impl Substitute for LoweredEq {
    /// Renames inside the expressions only; spaces are rebuilt by the caller.
    fn substitute(&self, mapping: &Substitution) -> Self {
        Self {
            lhs: self.lhs.substitute(mapping),
            rhs: self.rhs.substitute(mapping),
            ispace: self.ispace.clone(),
            dspace: self.dspace.clone(),
        }
    }
}

impl fmt::Display for LoweredEq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.lhs, self.rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::rename;

    fn eq() -> LoweredEq {
        let x = SymExpr::symbol("x");
        LoweredEq::new(
            Access::new("v", vec![x.clone()]),
            Expr::Add(vec![
                Expr::Access(Access::new("u", vec![x.clone() - 1])),
                Expr::Access(Access::new("u", vec![x + 1])),
                Expr::Symbol(Symbol::new("dt")),
            ]),
            IterationSpace::default(),
            DataSpace::default(),
        )
    }

    #[test]
    fn test_reads_and_write() {
        let e = eq();
        assert_eq!(e.write(), Symbol::new("v"));
        assert_eq!(e.reads().into_iter().collect::<Vec<_>>(), vec![Symbol::new("u")]);
    }

    #[test]
    fn test_access_distance() {
        let x = SymExpr::symbol("x");
        let t = SymExpr::symbol("t");
        let write = Access::new("u", vec![t.clone() + 1, x.clone()]);

        let read = Access::new("u", vec![t.clone(), x.clone() + 1]);
        let expected: BTreeMap<Symbol, i64> =
            [(Symbol::new("t"), 1), (Symbol::new("x"), -1)].into_iter().collect();
        assert_eq!(write.distance(&read), AccessDistance::Uniform(expected));

        let other = Access::new("v", vec![t.clone(), x.clone()]);
        assert_eq!(write.distance(&other), AccessDistance::Disjoint);

        let plane0 = Access::new("u", vec![SymExpr::int(0), x.clone()]);
        let plane1 = Access::new("u", vec![SymExpr::int(1), x.clone()]);
        assert_eq!(plane0.distance(&plane1), AccessDistance::Disjoint);

        let skewed = Access::new("u", vec![t, SymExpr::symbol("y")]);
        assert_eq!(write.distance(&skewed), AccessDistance::Unknown);
        let strided = Access::new("u", vec![x.scale(2)]);
        assert_eq!(strided.distance(&strided), AccessDistance::Unknown);
    }

    #[test]
    fn test_substitute_renames_indices() {
        let e = eq().substitute(&rename(Symbol::new("x"), Symbol::new("x_lr0")));
        assert_eq!(e.to_string(), "v[x_lr0] = (u[x_lr0 - 1] + u[x_lr0 + 1] + dt)");
    }
}
