//! Clusters and Cluster groups.
//!
//! A `Cluster` is the scheduling unit every pass works on: a list of
//! equations sharing one iteration space. Clusters are value snapshots;
//! passes build new ones with the `with_*` rebuilders instead of mutating.

use crate::ir::dimension::Dimension;
use crate::ir::equation::LoweredEq;
use crate::ir::properties::Properties;
use crate::ir::space::{DataSpace, IterationInterval, IterationSpace};
use crate::utils::errors::{CompileError, CompileResult, InternalErrorKind};
use crate::utils::intern::Symbol;
use serde::{Serialize, Deserialize};
use std::collections::BTreeSet;
use std::fmt;

/// Equations sharing an iteration space, with their scheduling tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cluster {
    /// Equations in execution order
    pub exprs: Vec<LoweredEq>,
    pub ispace: IterationSpace,
    #[serde(default)]
    pub dspace: DataSpace,
    #[serde(default)]
    pub properties: Properties,
}

impl Cluster {
    pub fn new(
        exprs: Vec<LoweredEq>,
        ispace: IterationSpace,
        dspace: DataSpace,
        properties: Properties,
    ) -> Self {
        Self { exprs, ispace, dspace, properties }
    }

    /// A Cluster holding a single equation, over that equation's spaces.
    pub fn from_eq(eq: LoweredEq, properties: Properties) -> Self {
        let ispace = eq.ispace.clone();
        let dspace = eq.dspace.clone();
        Self { exprs: vec![eq], ispace, dspace, properties }
    }

    /// Merge `clusters` into one, in order.
    ///
    /// Spaces are united and properties narrowed. Clusters traversing a
    /// shared dimension in opposite directions cannot be merged.
    pub fn from_clusters(clusters: &[Cluster]) -> CompileResult<Cluster> {
        let (first, rest) = clusters.split_first().ok_or_else(|| {
            CompileError::internal(
                InternalErrorKind::IncompatibleSpaces,
                "cannot build a Cluster out of zero Clusters",
            )
        })?;
        let ispaces: Vec<&IterationSpace> = clusters.iter().map(|c| &c.ispace).collect();
        let dspaces: Vec<&DataSpace> = clusters.iter().map(|c| &c.dspace).collect();
        let ispace = IterationSpace::union(&ispaces)?;
        let dspace = DataSpace::union(&dspaces)?;
        let properties =
            rest.iter().fold(first.properties.clone(), |acc, c| acc.merge(&c.properties));
        let exprs = clusters.iter().flat_map(|c| c.exprs.iter().cloned()).collect();
        Ok(Self { exprs, ispace, dspace, properties })
    }

    pub fn with_ispace(&self, ispace: IterationSpace) -> Self {
        Self { ispace, ..self.clone() }
    }

    pub fn with_properties(&self, properties: Properties) -> Self {
        Self { properties, ..self.clone() }
    }

    pub fn itintervals(&self) -> Vec<IterationInterval> {
        self.ispace.itintervals()
    }

    pub fn dimensions(&self) -> Vec<Dimension> {
        self.ispace.dimensions()
    }

    /// Arrays written by any equation.
    pub fn writes(&self) -> BTreeSet<Symbol> {
        self.exprs.iter().map(|e| e.write()).collect()
    }

    /// Arrays read by any equation.
    pub fn reads(&self) -> BTreeSet<Symbol> {
        self.exprs.iter().flat_map(|e| e.reads()).collect()
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cluster {}", self.ispace)?;
        for e in &self.exprs {
            writeln!(f, "  {}", e)?;
        }
        Ok(())
    }
}

/// Group consecutive equations with identical iteration spaces into
/// Clusters, each tagged with the entries of `properties` it iterates over.
pub fn clusterize(exprs: Vec<LoweredEq>, properties: &Properties) -> CompileResult<Vec<Cluster>> {
    let mut out: Vec<Cluster> = Vec::new();
    for eq in exprs {
        if let Some(c) = out.last_mut().filter(|c| c.ispace == eq.ispace) {
            c.dspace = DataSpace::union(&[&c.dspace, &eq.dspace])?;
            c.exprs.push(eq);
            continue;
        }
        let dims: BTreeSet<Dimension> = eq.ispace.dimensions().into_iter().collect();
        let props = properties.retain(|d| dims.contains(d));
        out.push(Cluster::from_eq(eq, props));
    }
    Ok(out)
}

/// Consecutive Clusters sharing an iteration prefix, batched by the queue
/// engine so passes can reason about them jointly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterGroup {
    pub clusters: Vec<Cluster>,
    /// The shared prefix
    pub itintervals: Vec<IterationInterval>,
}

impl ClusterGroup {
    pub fn new(clusters: Vec<Cluster>, itintervals: Vec<IterationInterval>) -> Self {
        Self { clusters, itintervals }
    }

    /// A singleton group keyed by the Cluster's full iteration intervals.
    pub fn from_cluster(cluster: Cluster) -> Self {
        let itintervals = cluster.itintervals();
        Self { clusters: vec![cluster], itintervals }
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn writes(&self) -> BTreeSet<Symbol> {
        self.clusters.iter().flat_map(|c| c.writes()).collect()
    }

    pub fn reads(&self) -> BTreeSet<Symbol> {
        self.clusters.iter().flat_map(|c| c.reads()).collect()
    }

    /// Whether running `other` before `self` could change the result:
    /// one writes an array the other reads or writes.
    pub fn depends_on(&self, other: &ClusterGroup) -> bool {
        let (w1, r1) = (self.writes(), self.reads());
        let (w2, r2) = (other.writes(), other.reads());
        !w1.is_disjoint(&r2) || !r1.is_disjoint(&w2) || !w1.is_disjoint(&w2)
    }

    /// Flatten groups back into Clusters, in order.
    pub fn concatenate(groups: Vec<ClusterGroup>) -> Vec<Cluster> {
        groups.into_iter().flat_map(|g| g.clusters).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::equation::{Access, Expr};
    use crate::ir::interval::{Interval, IntervalGroup};
    use crate::ir::properties::Property;
    use crate::symbolic::SymExpr;

    fn ispace(x: (i64, i64)) -> IterationSpace {
        IterationSpace::from_intervals(IntervalGroup::from_intervals(vec![
            Interval::new(Dimension::new("t"), 0, 0),
            Interval::new(Dimension::new("x"), x.0, x.1),
        ]))
    }

    fn eq(write: &str, read: &str, x: (i64, i64)) -> LoweredEq {
        let idx = vec![SymExpr::symbol("t"), SymExpr::symbol("x")];
        LoweredEq::new(
            Access::new(write, idx.clone()),
            Expr::Access(Access::new(read, idx)),
            ispace(x),
            DataSpace::default(),
        )
    }

    #[test]
    fn test_from_clusters_unites_and_narrows() {
        let x = Dimension::new("x");
        let a = Cluster::from_eq(
            eq("u", "v", (0, 0)),
            Properties::new().with(&x, [Property::Parallel]),
        );
        let b = Cluster::from_eq(
            eq("w", "u", (-1, 1)),
            Properties::new().with(&x, [Property::Sequential]),
        );
        let c = Cluster::from_clusters(&[a, b]).unwrap();
        assert_eq!(c.exprs.len(), 2);
        assert_eq!(c.ispace.intervals.get(&x), Some(&Interval::new(x.clone(), -1, 1)));
        assert!(c.properties.is_sequential(&x));
        assert!(!c.properties.is_parallel(&x));
    }

    #[test]
    fn test_from_clusters_empty_fails() {
        assert!(Cluster::from_clusters(&[]).is_err());
    }

    #[test]
    fn test_clusterize_groups_consecutive_spaces() {
        let exprs = vec![
            eq("a", "b", (0, 0)),
            eq("c", "d", (0, 0)),
            eq("e", "f", (1, 1)),
            eq("g", "h", (0, 0)),
        ];
        let clusters = clusterize(exprs, &Properties::new()).unwrap();
        let sizes: Vec<usize> = clusters.iter().map(|c| c.exprs.len()).collect();
        assert_eq!(sizes, vec![2, 1, 1]);
    }

    #[test]
    fn test_group_dependences() {
        let group = |w: &str, r: &str| {
            ClusterGroup::from_cluster(Cluster::from_eq(eq(w, r, (0, 0)), Properties::new()))
        };
        let (g1, g2, g3) = (group("u", "v"), group("w", "u"), group("z", "v"));
        assert!(g2.depends_on(&g1));
        assert!(!g3.depends_on(&g1));
        assert_eq!(ClusterGroup::concatenate(vec![g1, g2, g3]).len(), 3);
    }
}
