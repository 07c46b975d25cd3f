//! Dependences between Clusters sharing loops.
//!
//! Equations of two Clusters depend on each other when they access the
//! same array and at least one of them writes it. With subscripts of the
//! form `i + c` the dependence has a constant distance along every loop.
//! Fusion and the loop-nest builder check these distances before letting
//! a later Cluster run inside the loops of an earlier one.

use crate::ir::cluster::Cluster;
use crate::ir::dimension::Dimension;
use crate::ir::equation::AccessDistance;
use crate::ir::properties::Properties;
use crate::ir::space::{Direction, IterationInterval};
use crate::utils::intern::Symbol;
use std::collections::BTreeMap;
use std::iter;

/// A dependence from an earlier Cluster to a later one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Distance {
    /// Nonzero components in loop order. Each sits on the outermost
    /// shared loop of its family and is signed along the traversal
    /// direction; an empty vector is a loop-independent dependence.
    Uniform(Vec<(Dimension, i64)>),
    /// No constant distance could be derived
    Unknown,
}

impl Distance {
    /// Sharing the loops would make the later Cluster touch an element
    /// before the earlier one does.
    pub fn is_reversed(&self) -> bool {
        matches!(self, Distance::Uniform(c) if c.first().is_some_and(|(_, v)| *v < 0))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Distance::Unknown)
    }

    /// The shared loop carrying the dependence, if any.
    pub fn carrier(&self) -> Option<&Dimension> {
        match self {
            Distance::Uniform(c) => c.first().filter(|(_, v)| *v > 0).map(|(d, _)| d),
            Distance::Unknown => None,
        }
    }

    /// Loops with a nonzero component.
    pub fn components(&self) -> impl Iterator<Item = &Dimension> {
        let components: &[(Dimension, i64)] = match self {
            Distance::Uniform(c) => c,
            Distance::Unknown => &[],
        };
        components.iter().map(|(d, _)| d)
    }
}

/// Every dependence from `earlier` to `later`, measured along the shared
/// `loops` (outermost first).
pub fn dependences(
    earlier: &Cluster,
    later: &Cluster,
    loops: &[IterationInterval],
) -> Vec<Distance> {
    let dims: Vec<Dimension> =
        earlier.dimensions().into_iter().chain(later.dimensions()).collect();
    let mut out = Vec::new();
    for a in &earlier.exprs {
        let reads_a = a.rhs.accesses();
        for b in &later.exprs {
            let reads_b = b.rhs.accesses();
            let pairs = iter::once((&a.lhs, &b.lhs))
                .chain(reads_b.iter().map(|r| (&a.lhs, *r)))
                .chain(reads_a.iter().map(|r| (*r, &b.lhs)));
            for (x, y) in pairs {
                match x.distance(y) {
                    AccessDistance::Disjoint => {}
                    AccessDistance::Unknown => out.push(Distance::Unknown),
                    AccessDistance::Uniform(d) => out.extend(along(loops, &dims, &d)),
                }
            }
        }
    }
    out
}

/// Project a per-index distance onto `loops`; `None` when the accesses
/// never alias.
fn along(
    loops: &[IterationInterval],
    dims: &[Dimension],
    distance: &BTreeMap<Symbol, i64>,
) -> Option<Distance> {
    let dim_of = |s: &Symbol| dims.iter().find(|d| d.name == *s);
    // Offsets along parameters are fixed for the whole run
    if distance.iter().any(|(s, v)| *v != 0 && dim_of(s).is_none()) {
        return None;
    }

    let mut components = Vec::new();
    for (pos, l) in loops.iter().enumerate() {
        let d = l.dim();
        if loops[..pos].iter().any(|o| o.dim().shares_root(d)) {
            continue;
        }
        let offset = distance
            .iter()
            .filter(|(s, _)| dim_of(*s).is_some_and(|x| x.shares_root(d)))
            .map(|(_, v)| *v)
            .find(|v| *v != 0)
            .unwrap_or(0);
        let offset = match l.direction {
            Direction::Forward => offset,
            Direction::Backward => -offset,
        };
        if offset != 0 {
            components.push((d.clone(), offset));
        }
    }
    Some(Distance::Uniform(components))
}

/// Narrow the tags of `dims` for Clusters that now share loops despite
/// `deps`: a carrying loop turns sequential and any other loop with a
/// component loses `PARALLEL_INDEP`. Every loop of a blocked family is
/// treated alike.
pub fn narrow(properties: &Properties, dims: &[Dimension], deps: &[Distance]) -> Properties {
    let mut out = properties.clone();
    for d in dims {
        if deps.iter().filter_map(Distance::carrier).any(|c| c.shares_root(d)) {
            out = out.sequentialize(d);
        } else if deps.iter().flat_map(|dep| dep.components()).any(|c| c.shares_root(d)) {
            out = out.affect(d);
        }
    }
    out
}
