//! Remainder decomposition (boundary splitting).
//!
//! Sibling equations sharing a loop nest may have different valid ranges
//! along a dimension, e.g. `[-2, 1]` and `[-1, 2]` over `x`. The common
//! range `[-1, 1]` is iterated by a *middle* sub-dimension shared by all
//! siblings; what sticks out on either side is iterated by *left* and
//! *right* sub-dimensions of each sibling:
//!
//! ```text
//! eq1 over x[-2, 1]          eq1 over x_lr0[-2, -2]   (left)
//! eq2 over x[-1, 2]    =>    eq1 over x_mr0           (middle)
//!                            eq2 over x_mr0           (middle)
//!                            eq2 over x_rr0[2, 2]     (right)
//! ```
//!
//! Empty remainders produce no equation.

use crate::ir::{
    clusterize, Cluster, Dimension, DimensionKind, Interval, LoweredEq, Property, SubRegion,
};
use crate::symbolic::{compare_bound, rename, BoundOrdering, Substitute, SymExpr};
use crate::transform::Transform;
use crate::utils::errors::{CompileError, CompileResult, InternalErrorKind};
use log::debug;
use std::collections::{BTreeMap, HashMap};

fn check_pair(i1: &Interval, i2: &Interval) -> CompileResult<()> {
    if i1.dim() != i2.dim() {
        return Err(CompileError::internal(
            InternalErrorKind::DimensionMismatch,
            format!("cannot compute a remainder of {} against {}", i1, i2),
        ));
    }
    Ok(())
}

fn order(a: &SymExpr, b: &SymExpr) -> CompileResult<BoundOrdering> {
    match compare_bound(a, b) {
        BoundOrdering::Incomparable => Err(CompileError::internal(
            InternalErrorKind::IncomparableBounds,
            format!("cannot order remainder bounds `{}` and `{}`", a, b),
        )),
        ord => Ok(ord),
    }
}

/// The part of `i1` strictly below `i2`: `[i1.lower, i2.lower - 1]`, or
/// null if `i1` does not start before `i2`.
pub fn left_remainder(i1: &Interval, i2: &Interval) -> CompileResult<Interval> {
    check_pair(i1, i2)?;
    let (Some(l1), Some(l2)) = (i1.lower(), i2.lower()) else {
        return Ok(Interval::null(i1.dim().clone()));
    };
    match order(l1, l2)? {
        BoundOrdering::Lt => Ok(Interval::new(i1.dim().clone(), l1.clone(), l2.clone() - 1)),
        _ => Ok(Interval::null(i1.dim().clone())),
    }
}

/// The part of `i1` strictly above `i2`: `[i2.upper + 1, i1.upper]`, or
/// null if `i1` does not end after `i2`.
pub fn right_remainder(i1: &Interval, i2: &Interval) -> CompileResult<Interval> {
    check_pair(i1, i2)?;
    let (Some(u1), Some(u2)) = (i1.upper(), i2.upper()) else {
        return Ok(Interval::null(i1.dim().clone()));
    };
    match order(u1, u2)? {
        BoundOrdering::Gt => Ok(Interval::new(i1.dim().clone(), u2.clone() + 1, u1.clone())),
        _ => Ok(Interval::null(i1.dim().clone())),
    }
}

/// Remainder decomposition pass.
#[derive(Debug, Clone, Default)]
pub struct Remainder {
    /// Next free index per (dimension, region tag)
    counters: HashMap<(Dimension, &'static str), usize>,
    /// Number of dimensions split
    splits: usize,
}

impl Remainder {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many dimensions have been split.
    pub fn splits(&self) -> usize {
        self.splits
    }

    fn fresh_name(&mut self, d: &Dimension, tag: &'static str) -> String {
        let n = self.counters.entry((d.clone(), tag)).or_insert(0);
        let name = format!("{}_{}{}", d.name, tag, n);
        *n += 1;
        name
    }

    /// Split `siblings` along `d` into left, middle and right equations.
    ///
    /// If the siblings have nothing in common along `d` they are returned
    /// unchanged.
    pub fn decompose(
        &mut self,
        siblings: &[LoweredEq],
        d: &Dimension,
    ) -> CompileResult<Vec<LoweredEq>> {
        let intervals = siblings
            .iter()
            .map(|eq| {
                eq.ispace.intervals.get(d).cloned().ok_or_else(|| {
                    CompileError::internal(
                        InternalErrorKind::MissingInterval,
                        format!("equation `{}` does not iterate over `{}`", eq, d),
                    )
                })
            })
            .collect::<CompileResult<Vec<_>>>()?;

        let Some(first) = intervals.first() else {
            return Ok(Vec::new());
        };
        let mut middle = first.clone();
        for i in &intervals[1..] {
            middle = middle.intersection(i)?;
        }
        let Some((ml, mu)) = middle.bounds() else {
            debug!("remainder: siblings along `{}` are disjoint, nothing to split", d);
            return Ok(siblings.to_vec());
        };
        let (ml, mu) = (ml.clone(), mu.clone());

        let mid_dim = Dimension::middle(&self.fresh_name(d, "mr"), d, ml.clone(), -mu.clone());
        let mut lefts: BTreeMap<SymExpr, Dimension> = BTreeMap::new();
        let mut rights: BTreeMap<SymExpr, Dimension> = BTreeMap::new();

        let mut out = Vec::with_capacity(siblings.len() * 3);
        for (eq, interval) in siblings.iter().zip(&intervals) {
            let left = left_remainder(interval, &middle)?;
            if let Some((lower, _)) = left.bounds() {
                let thickness = ml.clone() - lower.clone();
                let dim = match lefts.get(&thickness) {
                    Some(dim) => dim.clone(),
                    None => {
                        let dim = Dimension::left(&self.fresh_name(d, "lr"), d, thickness.clone());
                        lefts.insert(thickness, dim.clone());
                        dim
                    }
                };
                let offset = lower.clone();
                out.push(retarget(eq, interval, d, Interval::new(dim, offset.clone(), offset))?);
            }

            out.push(retarget(eq, interval, d, Interval::new(mid_dim.clone(), 0, 0))?);

            let right = right_remainder(interval, &middle)?;
            if let Some((_, upper)) = right.bounds() {
                let thickness = upper.clone() - mu.clone();
                let dim = match rights.get(&thickness) {
                    Some(dim) => dim.clone(),
                    None => {
                        let dim = Dimension::right(&self.fresh_name(d, "rr"), d, thickness.clone());
                        rights.insert(thickness, dim.clone());
                        dim
                    }
                };
                let offset = upper.clone();
                out.push(retarget(eq, interval, d, Interval::new(dim, offset.clone(), offset))?);
            }
        }

        debug!(
            "remainder: split `{}` over {} siblings into {} equations",
            d,
            siblings.len(),
            out.len()
        );
        self.splits += 1;
        Ok(out)
    }

    /// Split the first dimension along which the equations of `cluster`
    /// have different intervals.
    fn split_cluster(&mut self, cluster: Cluster) -> CompileResult<Vec<Cluster>> {
        if cluster.exprs.len() < 2 {
            return Ok(vec![cluster]);
        }
        let Some(d) = first_divergent(&cluster) else {
            return Ok(vec![cluster]);
        };

        let exprs = self.decompose(&cluster.exprs, &d)?;
        if exprs == cluster.exprs {
            return Ok(vec![cluster]);
        }

        // Sub-dimensions inherit the tags of `d`; only the middle one stays tilable
        let tags = cluster.properties.get(&d).cloned().unwrap_or_default();
        let mut properties = cluster.properties.drop(&d);
        for eq in &exprs {
            for sub in eq.ispace.dimensions().into_iter().filter(|s| s.parent() == Some(&d)) {
                let middle = matches!(
                    &sub.kind,
                    DimensionKind::Sub { region: SubRegion::Middle { .. }, .. }
                );
                let inherited = tags.iter().copied().filter(|p| middle || *p != Property::Tilable);
                properties = properties.with(&sub, inherited);
            }
        }
        clusterize(exprs, &properties)
    }
}

/// Move `eq` from `old` (its interval there being `current`) onto the
/// interval `new` over a sub-dimension.
fn retarget(
    eq: &LoweredEq,
    current: &Interval,
    old: &Dimension,
    new: Interval,
) -> CompileResult<LoweredEq> {
    let sub = new.dim().clone();
    let (lower, upper) = match (current.bounds(), new.bounds()) {
        (Some((cl, cu)), Some((nl, nu))) => (nl.clone() - cl.clone(), nu.clone() - cu.clone()),
        _ => (SymExpr::zero(), SymExpr::zero()),
    };
    let ispace = eq.ispace.expand(old, vec![new], Vec::new())?;
    let dspace = eq.dspace.remap(old, &sub, &lower, &upper)?;
    Ok(eq.substitute(&rename(old.name, sub.name)).with_spaces(ispace, dspace))
}

/// First dimension of `cluster` along which its equations disagree.
fn first_divergent(cluster: &Cluster) -> Option<Dimension> {
    cluster.dimensions().into_iter().find(|d| {
        let intervals: Option<Vec<&Interval>> =
            cluster.exprs.iter().map(|eq| eq.ispace.intervals.get(d)).collect();
        intervals.map_or(false, |is| is.windows(2).any(|w| w[0] != w[1]))
    })
}

impl Transform for Remainder {
    fn apply(&mut self, clusters: Vec<Cluster>) -> CompileResult<Vec<Cluster>> {
        let mut processed = Vec::with_capacity(clusters.len());
        for c in clusters {
            processed.extend(self.split_cluster(c)?);
        }
        Ok(processed)
    }

    fn name(&self) -> &str {
        "remainder"
    }
}
