//! Iteration and data spaces.

use crate::ir::dimension::Dimension;
use crate::ir::interval::{GenerateOp, Interval, IntervalGroup};
use crate::symbolic::SymExpr;
use crate::utils::errors::{CompileError, CompileResult, InternalErrorKind};
use crate::utils::intern::Symbol;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fmt;

/// Iteration direction of a dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "++"),
            Direction::Backward => write!(f, "--"),
        }
    }
}

/// An interval together with the direction it is traversed in.
///
/// Sequences of these are the keys the queue engine groups elements by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IterationInterval {
    pub interval: Interval,
    pub direction: Direction,
}

impl IterationInterval {
    pub fn new(interval: Interval, direction: Direction) -> Self {
        Self { interval, direction }
    }

    pub fn dim(&self) -> &Dimension {
        self.interval.dim()
    }
}

impl fmt::Display for IterationInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.interval, self.direction)
    }
}

/// The loop nest shape of an equation or Cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IterationSpace {
    /// Intervals in nesting order, outermost first
    pub intervals: IntervalGroup,
    /// Derived iteration variables stepping alongside each dimension
    #[serde(default, with = "crate::utils::serde_pairs")]
    pub sub_iterators: BTreeMap<Dimension, Vec<Dimension>>,
    /// Traversal direction; dimensions not listed run forward
    #[serde(default, with = "crate::utils::serde_pairs")]
    pub directions: BTreeMap<Dimension, Direction>,
}

impl IterationSpace {
    pub fn new(
        intervals: IntervalGroup,
        sub_iterators: BTreeMap<Dimension, Vec<Dimension>>,
        directions: BTreeMap<Dimension, Direction>,
    ) -> Self {
        Self { intervals, sub_iterators, directions }
    }

    /// A space over `intervals`, every dimension running forward.
    pub fn from_intervals(intervals: IntervalGroup) -> Self {
        let directions =
            intervals.dimensions().into_iter().map(|d| (d, Direction::Forward)).collect();
        Self { intervals, sub_iterators: BTreeMap::new(), directions }
    }

    pub fn dimensions(&self) -> Vec<Dimension> {
        self.intervals.dimensions()
    }

    pub fn direction(&self, dim: &Dimension) -> Direction {
        self.directions.get(dim).copied().unwrap_or_default()
    }

    /// The iteration intervals, outermost first.
    pub fn itintervals(&self) -> Vec<IterationInterval> {
        self.intervals
            .iter()
            .map(|i| IterationInterval::new(i.clone(), self.direction(i.dim())))
            .collect()
    }

    /// Whether no shared dimension is traversed in opposite directions.
    pub fn is_compatible(&self, other: &IterationSpace) -> bool {
        self.directions
            .iter()
            .all(|(d, dir)| other.directions.get(d).map_or(true, |o| o == dir))
    }

    /// The smallest space enclosing all of `spaces`.
    pub fn union(spaces: &[&IterationSpace]) -> CompileResult<IterationSpace> {
        let groups: Vec<IntervalGroup> = spaces.iter().map(|s| s.intervals.clone()).collect();
        let intervals = IntervalGroup::generate(GenerateOp::Union, &groups)?;

        let mut sub_iterators: BTreeMap<Dimension, Vec<Dimension>> = BTreeMap::new();
        let mut directions: BTreeMap<Dimension, Direction> = BTreeMap::new();
        for s in spaces {
            for (d, subs) in &s.sub_iterators {
                let entry = sub_iterators.entry(d.clone()).or_default();
                for i in subs {
                    if !entry.contains(i) {
                        entry.push(i.clone());
                    }
                }
            }
            for (d, dir) in &s.directions {
                match directions.get(d) {
                    Some(existing) if existing != dir => {
                        return Err(CompileError::internal(
                            InternalErrorKind::IncompatibleSpaces,
                            format!(
                                "dimension `{}` is traversed both {:?} and {:?}",
                                d, existing, dir
                            ),
                        ));
                    }
                    _ => {
                        directions.insert(d.clone(), *dir);
                    }
                }
            }
        }
        Ok(Self { intervals, sub_iterators, directions })
    }

    /// Replace dimension `old` by the dimensions of `new`.
    ///
    /// Every new dimension inherits `old`'s direction; the innermost one
    /// takes over its sub-iterators.
    pub fn expand(
        &self,
        old: &Dimension,
        new: Vec<Interval>,
        extra_relations: impl IntoIterator<Item = Vec<Dimension>>,
    ) -> CompileResult<IterationSpace> {
        let new_dims: Vec<Dimension> = new.iter().map(|i| i.dim().clone()).collect();
        let intervals = self.intervals.expand(old, new, extra_relations)?;

        let direction = self.direction(old);
        let mut directions = self.directions.clone();
        directions.remove(old);
        for d in &new_dims {
            directions.insert(d.clone(), direction);
        }

        let mut sub_iterators = self.sub_iterators.clone();
        if let (Some(subs), Some(last)) = (sub_iterators.remove(old), new_dims.last()) {
            sub_iterators.insert(last.clone(), subs);
        }
        Ok(Self { intervals, sub_iterators, directions })
    }

    /// Same space with a different interval group.
    pub fn with_intervals(&self, intervals: IntervalGroup) -> Self {
        Self { intervals, ..self.clone() }
    }
}

impl fmt::Display for IterationSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.itintervals().iter().map(|i| i.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Per-array data footprint of an equation or Cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataSpace {
    /// Footprint over all arrays
    pub intervals: IntervalGroup,
    /// Footprint of each array
    #[serde(default)]
    pub parts: BTreeMap<Symbol, IntervalGroup>,
}

impl DataSpace {
    pub fn new(intervals: IntervalGroup, parts: BTreeMap<Symbol, IntervalGroup>) -> Self {
        Self { intervals, parts }
    }

    /// The smallest footprint enclosing all of `spaces`.
    pub fn union(spaces: &[&DataSpace]) -> CompileResult<DataSpace> {
        let groups: Vec<IntervalGroup> = spaces.iter().map(|s| s.intervals.clone()).collect();
        let intervals = IntervalGroup::generate(GenerateOp::Union, &groups)?;

        let mut per_array: BTreeMap<Symbol, Vec<IntervalGroup>> = BTreeMap::new();
        for s in spaces {
            for (array, ig) in &s.parts {
                per_array.entry(*array).or_default().push(ig.clone());
            }
        }
        let parts = per_array
            .into_iter()
            .map(|(a, gs)| -> CompileResult<(Symbol, IntervalGroup)> {
                Ok((a, IntervalGroup::generate(GenerateOp::Union, &gs)?))
            })
            .collect::<CompileResult<_>>()?;
        Ok(Self { intervals, parts })
    }

    /// Move every footprint over `old` onto `new`, shifting its bounds by
    /// `(lower, upper)`. Footprints not touching `old` are kept.
    pub fn remap(
        &self,
        old: &Dimension,
        new: &Dimension,
        lower: &SymExpr,
        upper: &SymExpr,
    ) -> CompileResult<DataSpace> {
        let retarget = |ig: &IntervalGroup| -> CompileResult<IntervalGroup> {
            match ig.get(old) {
                Some(i) => {
                    let moved = i.switch(new).translate(lower.clone(), upper.clone());
                    ig.switch(old, new).replace(moved)
                }
                None => Ok(ig.clone()),
            }
        };
        let intervals = retarget(&self.intervals)?;
        let parts = self
            .parts
            .iter()
            .map(|(a, ig)| -> CompileResult<(Symbol, IntervalGroup)> { Ok((*a, retarget(ig)?)) })
            .collect::<CompileResult<_>>()?;
        Ok(Self { intervals, parts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim(name: &str) -> Dimension {
        Dimension::new(name)
    }

    fn space(bounds: &[(&str, i64, i64)]) -> IterationSpace {
        IterationSpace::from_intervals(IntervalGroup::from_intervals(
            bounds.iter().map(|&(d, l, u)| Interval::new(dim(d), l, u)).collect(),
        ))
    }

    #[test]
    fn test_itintervals_carry_direction() {
        let mut s = space(&[("t", 0, 0), ("x", -1, 1)]);
        s.directions.insert(dim("t"), Direction::Backward);
        let its = s.itintervals();
        assert_eq!(its.len(), 2);
        assert_eq!(its[0].direction, Direction::Backward);
        assert_eq!(its[1].direction, Direction::Forward);
    }

    #[test]
    fn test_union_widens() {
        let a = space(&[("x", -2, 1)]);
        let b = space(&[("x", -1, 2)]);
        let u = IterationSpace::union(&[&a, &b]).unwrap();
        assert_eq!(u.intervals.get(&dim("x")), Some(&Interval::new(dim("x"), -2, 2)));
    }

    #[test]
    fn test_union_rejects_opposite_directions() {
        let a = space(&[("t", 0, 0)]);
        let mut b = space(&[("t", 0, 0)]);
        b.directions.insert(dim("t"), Direction::Backward);
        assert!(!a.is_compatible(&b));
        let err = IterationSpace::union(&[&a, &b]).unwrap_err();
        assert_eq!(err.internal_kind(), Some(InternalErrorKind::IncompatibleSpaces));
    }

    #[test]
    fn test_expand_moves_direction_and_sub_iterators() {
        let mut s = space(&[("t", 0, 0), ("x", 0, 0)]);
        s.sub_iterators.insert(dim("t"), vec![dim("t0"), dim("t1")]);
        s.directions.insert(dim("t"), Direction::Backward);
        let a = dim("ta");
        let b = dim("tb");
        let out = s
            .expand(
                &dim("t"),
                vec![Interval::new(a.clone(), 0, 0), Interval::new(b.clone(), 0, 0)],
                vec![],
            )
            .unwrap();
        assert_eq!(out.dimensions(), vec![a.clone(), b.clone(), dim("x")]);
        assert_eq!(out.direction(&a), Direction::Backward);
        assert_eq!(out.sub_iterators.get(&b), Some(&vec![dim("t0"), dim("t1")]));
        assert!(!out.directions.contains_key(&dim("t")));
    }

    #[test]
    fn test_dataspace_remap() {
        let ig = IntervalGroup::from_intervals(vec![Interval::new(dim("x"), -1, 1)]);
        let mut parts = BTreeMap::new();
        parts.insert(Symbol::new("u"), ig.clone());
        let ds = DataSpace::new(ig, parts);
        let sub = dim("x_mr0");
        let out = ds.remap(&dim("x"), &sub, &SymExpr::int(1), &SymExpr::int(-1)).unwrap();
        assert_eq!(out.intervals.dimensions(), vec![sub.clone()]);
        assert_eq!(out.parts[&Symbol::new("u")].get(&sub), Some(&Interval::new(sub, 0, 0)));
    }
}
