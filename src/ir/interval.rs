//! Intervals and interval groups.
//!
//! An `Interval` is a pair of symbolic offsets `[lower, upper]` applied to
//! the implicit bounds of its dimension: over `x`, `[-1, 1]` means
//! `x_m - 1 <= x <= x_M + 1`. The null interval is the empty set over a
//! dimension.
//!
//! An `IntervalGroup` is an ordered sequence of intervals (one per
//! dimension) plus *relations*: chains of dimensions whose relative
//! nesting order is fixed. The sequence is always a linear extension of
//! the relations.

use crate::ir::dimension::Dimension;
use crate::symbolic::{compare_bound, BoundOrdering, SymExpr};
use crate::utils::errors::{CompileError, CompileResult, InternalErrorKind};
use serde::{Serialize, Deserialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// A symbolic 1-D range over a dimension, or the empty range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interval {
    /// `[lower, upper]`, both inclusive, offset from the dimension bounds
    Closed {
        dim: Dimension,
        lower: SymExpr,
        upper: SymExpr,
    },
    /// The empty set over `dim`
    Null { dim: Dimension },
}

impl Interval {
    /// Create a closed interval.
    pub fn new(dim: Dimension, lower: impl Into<SymExpr>, upper: impl Into<SymExpr>) -> Self {
        Interval::Closed { dim, lower: lower.into(), upper: upper.into() }
    }

    /// Create the null interval over `dim`.
    pub fn null(dim: Dimension) -> Self {
        Interval::Null { dim }
    }

    pub fn dim(&self) -> &Dimension {
        match self {
            Interval::Closed { dim, .. } | Interval::Null { dim } => dim,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Interval::Null { .. })
    }

    pub fn lower(&self) -> Option<&SymExpr> {
        self.bounds().map(|(l, _)| l)
    }

    pub fn upper(&self) -> Option<&SymExpr> {
        self.bounds().map(|(_, u)| u)
    }

    /// Both offsets, unless null.
    pub fn bounds(&self) -> Option<(&SymExpr, &SymExpr)> {
        match self {
            Interval::Closed { lower, upper, .. } => Some((lower, upper)),
            Interval::Null { .. } => None,
        }
    }

    /// Same bounds over a different dimension.
    pub fn switch(&self, dim: &Dimension) -> Interval {
        match self {
            Interval::Closed { lower, upper, .. } => {
                Interval::new(dim.clone(), lower.clone(), upper.clone())
            }
            Interval::Null { .. } => Interval::null(dim.clone()),
        }
    }

    /// `[0, 0]` over the same dimension.
    pub fn zero(&self) -> Interval {
        Interval::new(self.dim().clone(), 0, 0)
    }

    /// Shift both offsets.
    pub fn translate(&self, lower: impl Into<SymExpr>, upper: impl Into<SymExpr>) -> Interval {
        match self {
            Interval::Closed { dim, lower: l, upper: u } => {
                Interval::new(dim.clone(), l.clone() + lower.into(), u.clone() + upper.into())
            }
            Interval::Null { .. } => self.clone(),
        }
    }

    fn check_same_dim(&self, other: &Interval, op: &str) -> CompileResult<()> {
        if self.dim() != other.dim() {
            return Err(CompileError::internal(
                InternalErrorKind::DimensionMismatch,
                format!("cannot compute {} of {} and {}", op, self, other),
            ));
        }
        Ok(())
    }

    /// The tightest range contained in both.
    pub fn intersection(&self, other: &Interval) -> CompileResult<Interval> {
        self.check_same_dim(other, "intersection")?;
        let ((l1, u1), (l2, u2)) = match (self.bounds(), other.bounds()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(Interval::null(self.dim().clone())),
        };
        let lower = max_bound(l1, l2)?;
        let upper = min_bound(u1, u2)?;
        if compare_bound(&lower, &upper) == BoundOrdering::Gt {
            return Ok(Interval::null(self.dim().clone()));
        }
        Ok(Interval::new(self.dim().clone(), lower, upper))
    }

    /// The smallest range containing both.
    pub fn union(&self, other: &Interval) -> CompileResult<Interval> {
        self.check_same_dim(other, "union")?;
        match (self.bounds(), other.bounds()) {
            (Some((l1, u1)), Some((l2, u2))) => {
                Ok(Interval::new(self.dim().clone(), min_bound(l1, l2)?, max_bound(u1, u2)?))
            }
            (Some(_), None) => Ok(self.clone()),
            (None, _) => Ok(other.clone()),
        }
    }

    /// Whether `other` lies within `self`.
    pub fn contains(&self, other: &Interval) -> CompileResult<bool> {
        self.check_same_dim(other, "containment")?;
        match (self.bounds(), other.bounds()) {
            (_, None) => Ok(true),
            (None, Some(_)) => Ok(false),
            (Some((l1, u1)), Some((l2, u2))) => {
                let lower_ok = ordered(l1, l2)? != BoundOrdering::Gt;
                let upper_ok = ordered(u1, u2)? != BoundOrdering::Lt;
                Ok(lower_ok && upper_ok)
            }
        }
    }

    /// Absolute first and last iteration points, unless null.
    pub fn extent(&self) -> Option<(SymExpr, SymExpr)> {
        self.bounds().map(|(l, u)| {
            (self.dim().symbolic_min() + l.clone(), self.dim().symbolic_max() + u.clone())
        })
    }
}

fn ordered(a: &SymExpr, b: &SymExpr) -> CompileResult<BoundOrdering> {
    match compare_bound(a, b) {
        BoundOrdering::Incomparable => Err(CompileError::internal(
            InternalErrorKind::IncomparableBounds,
            format!("cannot order bounds `{}` and `{}`", a, b),
        )),
        ord => Ok(ord),
    }
}

/// The larger of two bounds.
pub fn max_bound(a: &SymExpr, b: &SymExpr) -> CompileResult<SymExpr> {
    Ok(match ordered(a, b)? {
        BoundOrdering::Lt => b.clone(),
        _ => a.clone(),
    })
}

/// The smaller of two bounds.
pub fn min_bound(a: &SymExpr, b: &SymExpr) -> CompileResult<SymExpr> {
    Ok(match ordered(a, b)? {
        BoundOrdering::Gt => b.clone(),
        _ => a.clone(),
    })
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Closed { dim, lower, upper } => write!(f, "{}[{}, {}]", dim, lower, upper),
            Interval::Null { dim } => write!(f, "{}[]", dim),
        }
    }
}

/// How `IntervalGroup::generate` combines intervals over the same dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOp {
    Intersection,
    Union,
}

impl FromStr for GenerateOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intersection" => Ok(GenerateOp::Intersection),
            "union" => Ok(GenerateOp::Union),
            other => Err(format!("unknown interval operation `{}`", other)),
        }
    }
}

/// An ordered group of intervals with nesting relations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawIntervalGroup")]
pub struct IntervalGroup {
    intervals: Vec<Interval>,
    relations: BTreeSet<Vec<Dimension>>,
}

#[derive(Deserialize)]
struct RawIntervalGroup {
    intervals: Vec<Interval>,
    #[serde(default)]
    relations: BTreeSet<Vec<Dimension>>,
}

impl TryFrom<RawIntervalGroup> for IntervalGroup {
    type Error = CompileError;

    fn try_from(raw: RawIntervalGroup) -> CompileResult<Self> {
        IntervalGroup::new(raw.intervals, raw.relations)
    }
}

impl IntervalGroup {
    /// Build a group, reordering `intervals` to honor `relations`.
    pub fn new(
        intervals: Vec<Interval>,
        relations: impl IntoIterator<Item = Vec<Dimension>>,
    ) -> CompileResult<Self> {
        let relations: BTreeSet<Vec<Dimension>> =
            relations.into_iter().filter(|r| r.len() > 1).collect();
        let mut seen = BTreeSet::new();
        for i in &intervals {
            if !seen.insert(i.dim().clone()) {
                return Err(CompileError::internal(
                    InternalErrorKind::DimensionMismatch,
                    format!("dimension `{}` appears twice in an interval group", i.dim()),
                ));
            }
        }
        let intervals = toposort(intervals, &relations)?;
        Ok(Self { intervals, relations })
    }

    /// Build a group with no relations, keeping the given order.
    pub fn from_intervals(intervals: Vec<Interval>) -> Self {
        Self { intervals, relations: BTreeSet::new() }
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn relations(&self) -> &BTreeSet<Vec<Dimension>> {
        &self.relations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interval> {
        self.intervals.iter()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Dimensions in nesting order.
    pub fn dimensions(&self) -> Vec<Dimension> {
        self.intervals.iter().map(|i| i.dim().clone()).collect()
    }

    /// The interval over `dim`, if present.
    pub fn get(&self, dim: &Dimension) -> Option<&Interval> {
        self.intervals.iter().find(|i| i.dim() == dim)
    }

    pub fn index_of(&self, dim: &Dimension) -> Option<usize> {
        self.intervals.iter().position(|i| i.dim() == dim)
    }

    /// Combine several groups dimension by dimension.
    ///
    /// Dimensions present in more than one group get the intersection (or
    /// union) of their intervals; the others are kept as they are. The
    /// result follows the first group's order, extended by dimensions met
    /// later. Relations of all groups are carried over.
    pub fn generate(op: GenerateOp, groups: &[IntervalGroup]) -> CompileResult<IntervalGroup> {
        let mut order: Vec<Dimension> = Vec::new();
        for g in groups {
            for d in g.dimensions() {
                if !order.contains(&d) {
                    order.push(d);
                }
            }
        }

        let mut intervals = Vec::with_capacity(order.len());
        for d in &order {
            let mut acc: Option<Interval> = None;
            for i in groups.iter().filter_map(|g| g.get(d)) {
                acc = Some(match acc {
                    None => i.clone(),
                    Some(a) => match op {
                        GenerateOp::Intersection => a.intersection(i)?,
                        GenerateOp::Union => a.union(i)?,
                    },
                });
            }
            if let Some(i) = acc {
                intervals.push(i);
            }
        }

        let relations = groups.iter().flat_map(|g| g.relations.iter().cloned());
        IntervalGroup::new(intervals, relations)
    }

    /// Replace the interval over `interval.dim()` (same position).
    pub fn replace(&self, interval: Interval) -> CompileResult<IntervalGroup> {
        let idx = self.index_of(interval.dim()).ok_or_else(|| {
            CompileError::internal(
                InternalErrorKind::MissingInterval,
                format!("no interval over `{}` in {}", interval.dim(), self),
            )
        })?;
        let mut intervals = self.intervals.clone();
        intervals[idx] = interval;
        Ok(Self { intervals, relations: self.relations.clone() })
    }

    /// Replace dimension `old` by `new` everywhere, keeping bounds.
    pub fn switch(&self, old: &Dimension, new: &Dimension) -> IntervalGroup {
        let intervals = self
            .intervals
            .iter()
            .map(|i| if i.dim() == old { i.switch(new) } else { i.clone() })
            .collect();
        let relations = self
            .relations
            .iter()
            .map(|r| r.iter().map(|d| if d == old { new.clone() } else { d.clone() }).collect())
            .collect();
        Self { intervals, relations }
    }

    /// Replace the interval over `old` by `new` (in place, in the given
    /// order). Relations mentioning `old` are rewritten to the first new
    /// dimension; `extra` relations are added before reordering.
    pub fn expand(
        &self,
        old: &Dimension,
        new: Vec<Interval>,
        extra: impl IntoIterator<Item = Vec<Dimension>>,
    ) -> CompileResult<IntervalGroup> {
        let idx = self.index_of(old).ok_or_else(|| {
            CompileError::internal(
                InternalErrorKind::MissingInterval,
                format!("no interval over `{}` in {}", old, self),
            )
        })?;
        let head = match new.first() {
            Some(i) => i.dim().clone(),
            None => {
                return Err(CompileError::internal(
                    InternalErrorKind::MissingInterval,
                    format!("`{}` must be replaced by at least one interval", old),
                ))
            }
        };

        let mut intervals = self.intervals.clone();
        intervals.splice(idx..=idx, new);

        let relations: Vec<Vec<Dimension>> = self
            .relations
            .iter()
            .map(|r| r.iter().map(|d| if d == old { head.clone() } else { d.clone() }).collect())
            .chain(extra)
            .collect();
        IntervalGroup::new(intervals, relations)
    }
}

/// Stable topological sort of `intervals` by the relation chains.
///
/// Ties are broken by input position. Dimensions mentioned only in
/// relations take part in the sort (so orderings stay transitive through
/// them) but are not emitted.
fn toposort(
    intervals: Vec<Interval>,
    relations: &BTreeSet<Vec<Dimension>>,
) -> CompileResult<Vec<Interval>> {
    if relations.is_empty() {
        return Ok(intervals);
    }

    let mut nodes: Vec<Dimension> = intervals.iter().map(|i| i.dim().clone()).collect();
    let present = nodes.len();
    let mut index: HashMap<Dimension, usize> =
        nodes.iter().cloned().enumerate().map(|(i, d)| (d, i)).collect();
    for r in relations {
        for d in r {
            if !index.contains_key(d) {
                index.insert(d.clone(), nodes.len());
                nodes.push(d.clone());
            }
        }
    }

    let mut succs: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); nodes.len()];
    for r in relations {
        for w in r.windows(2) {
            let (a, b) = (index[&w[0]], index[&w[1]]);
            if a != b {
                succs[a].insert(b);
            }
        }
    }
    let mut indegree = vec![0usize; nodes.len()];
    for s in &succs {
        for &b in s {
            indegree[b] += 1;
        }
    }

    // Relation-only nodes go first so they never hold back a present one.
    let priority = |n: usize| if n < present { (1u8, n) } else { (0u8, n) };
    let mut ready: BTreeSet<(u8, usize)> =
        (0..nodes.len()).filter(|&n| indegree[n] == 0).map(priority).collect();

    let mut order = Vec::with_capacity(present);
    let mut visited = 0;
    while let Some(&key) = ready.iter().next() {
        ready.remove(&key);
        let n = key.1;
        visited += 1;
        if n < present {
            order.push(n);
        }
        for &s in &succs[n] {
            indegree[s] -= 1;
            if indegree[s] == 0 {
                ready.insert(priority(s));
            }
        }
    }

    if visited != nodes.len() {
        return Err(CompileError::internal(
            InternalErrorKind::CyclicRelations,
            format!(
                "nesting relations over [{}] contain a cycle",
                nodes.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
            ),
        ));
    }

    let mut slots: Vec<Option<Interval>> = intervals.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|n| slots[n].take()).collect())
}

impl fmt::Display for IntervalGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.intervals.iter().map(|i| i.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim(name: &str) -> Dimension {
        Dimension::new(name)
    }

    #[test]
    fn test_switch_and_zero() {
        let i = Interval::new(dim("x"), -2, 3);
        let s = i.switch(&dim("y"));
        assert_eq!(s.dim(), &dim("y"));
        assert_eq!(s.lower(), Some(&SymExpr::int(-2)));
        assert_eq!(i.zero(), Interval::new(dim("x"), 0, 0));
    }

    #[test]
    fn test_intersection_and_union() {
        let a = Interval::new(dim("x"), -2, 1);
        let b = Interval::new(dim("x"), -1, 2);
        assert_eq!(a.intersection(&b).unwrap(), Interval::new(dim("x"), -1, 1));
        assert_eq!(a.union(&b).unwrap(), Interval::new(dim("x"), -2, 2));
    }

    #[test]
    fn test_disjoint_intersection_is_null() {
        let a = Interval::new(dim("x"), 0, 1);
        let b = Interval::new(dim("x"), 5, 6);
        assert!(a.intersection(&b).unwrap().is_null());
    }

    #[test]
    fn test_contains() {
        let a = Interval::new(dim("x"), -2, 2);
        let b = Interval::new(dim("x"), -1, 1);
        assert!(a.contains(&b).unwrap());
        assert!(!b.contains(&a).unwrap());
        assert!(b.contains(&Interval::null(dim("x"))).unwrap());
    }

    #[test]
    fn test_mismatched_dimensions_fail() {
        let a = Interval::new(dim("x"), 0, 1);
        let b = Interval::new(dim("y"), 0, 1);
        let err = a.contains(&b).unwrap_err();
        assert_eq!(err.internal_kind(), Some(InternalErrorKind::DimensionMismatch));
    }

    #[test]
    fn test_incomparable_bounds_fail() {
        let a = Interval::new(dim("x"), SymExpr::symbol("p"), 1);
        let b = Interval::new(dim("x"), 0, 1);
        let err = a.intersection(&b).unwrap_err();
        assert_eq!(err.internal_kind(), Some(InternalErrorKind::IncomparableBounds));
    }

    #[test]
    fn test_relations_order_group() {
        let ig = IntervalGroup::new(
            vec![
                Interval::new(dim("x"), 0, 0),
                Interval::new(dim("t"), 0, 0),
                Interval::new(dim("y"), 0, 0),
            ],
            vec![vec![dim("t"), dim("x")]],
        )
        .unwrap();
        assert_eq!(ig.dimensions(), vec![dim("t"), dim("x"), dim("y")]);
    }

    #[test]
    fn test_relations_through_absent_dimension() {
        let ig = IntervalGroup::new(
            vec![Interval::new(dim("c"), 0, 0), Interval::new(dim("a"), 0, 0)],
            vec![vec![dim("a"), dim("b"), dim("c")]],
        )
        .unwrap();
        assert_eq!(ig.dimensions(), vec![dim("a"), dim("c")]);
    }

    #[test]
    fn test_cyclic_relations_fail() {
        let err = IntervalGroup::new(
            vec![Interval::new(dim("x"), 0, 0), Interval::new(dim("y"), 0, 0)],
            vec![vec![dim("x"), dim("y")], vec![dim("y"), dim("x")]],
        )
        .unwrap_err();
        assert_eq!(err.internal_kind(), Some(InternalErrorKind::CyclicRelations));
    }

    #[test]
    fn test_generate_keeps_unshared_dimensions() {
        let g1 = IntervalGroup::from_intervals(vec![
            Interval::new(dim("t"), 0, 0),
            Interval::new(dim("x"), -2, 1),
        ]);
        let g2 = IntervalGroup::from_intervals(vec![
            Interval::new(dim("x"), -1, 2),
            Interval::new(dim("y"), 0, 3),
        ]);
        let out = IntervalGroup::generate(GenerateOp::Intersection, &[g1, g2]).unwrap();
        assert_eq!(out.dimensions(), vec![dim("t"), dim("x"), dim("y")]);
        assert_eq!(out.get(&dim("x")), Some(&Interval::new(dim("x"), -1, 1)));
        assert_eq!(out.get(&dim("y")), Some(&Interval::new(dim("y"), 0, 3)));
    }

    #[test]
    fn test_generate_op_from_str() {
        assert_eq!("intersection".parse::<GenerateOp>(), Ok(GenerateOp::Intersection));
        assert!("bogus".parse::<GenerateOp>().is_err());
    }
}
