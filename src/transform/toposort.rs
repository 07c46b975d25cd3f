//! Dependence-preserving reordering of Cluster groups.
//!
//! Within each prefix, a group is moved up next to the last earlier group
//! iterating over the same intervals, provided it does not depend on any
//! group it jumps over. This brings fusible Clusters together.

use crate::ir::{Cluster, ClusterGroup, IterationInterval, QueueCG};
use crate::transform::Transform;
use crate::utils::errors::CompileResult;
use log::debug;

/// Cluster reordering pass.
#[derive(Debug, Clone, Default)]
pub struct Toposort {
    moved: usize,
}

impl Toposort {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many groups have been moved.
    pub fn moved(&self) -> usize {
        self.moved
    }
}

impl QueueCG for Toposort {
    fn callback(
        &mut self,
        cgroups: Vec<ClusterGroup>,
        prefix: &[IterationInterval],
    ) -> CompileResult<Vec<ClusterGroup>> {
        let mut processed: Vec<ClusterGroup> = Vec::with_capacity(cgroups.len());
        for cg in cgroups {
            let anchor = processed.iter().rposition(|g| g.itintervals == cg.itintervals);
            match anchor {
                Some(i) if i + 1 < processed.len()
                    && processed[i + 1..].iter().all(|g| !cg.depends_on(g)) =>
                {
                    debug!(
                        "toposort: moved a group over {} others at depth {}",
                        processed.len() - i - 1,
                        prefix.len()
                    );
                    self.moved += 1;
                    processed.insert(i + 1, cg);
                }
                _ => processed.push(cg),
            }
        }
        Ok(processed)
    }
}

impl Transform for Toposort {
    fn apply(&mut self, clusters: Vec<Cluster>) -> CompileResult<Vec<Cluster>> {
        self.process(clusters)
    }

    fn name(&self) -> &str {
        "toposort"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        Access, DataSpace, Dimension, Expr, Interval, IntervalGroup, IterationSpace, LoweredEq,
        Properties,
    };
    use crate::symbolic::SymExpr;

    fn make_cluster(write: &str, read: &str, inner: &str) -> Cluster {
        let ig = IntervalGroup::from_intervals(vec![
            Interval::new(Dimension::new("t"), 0, 0),
            Interval::new(Dimension::new(inner), 0, 0),
        ]);
        let idx = vec![SymExpr::symbol(inner)];
        let eq = LoweredEq::new(
            Access::new(write, idx.clone()),
            Expr::Access(Access::new(read, idx)),
            IterationSpace::from_intervals(ig),
            DataSpace::default(),
        );
        Cluster::from_eq(eq, Properties::new())
    }

    fn writes(clusters: &[Cluster]) -> Vec<String> {
        clusters.iter().flat_map(|c| c.writes()).map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_independent_group_moves_up() {
        let a = make_cluster("a", "src", "x");
        let b = make_cluster("b", "src", "y");
        let c = make_cluster("c", "src", "x");
        let mut pass = Toposort::new();
        let out = pass.apply(vec![a, b, c]).unwrap();
        assert_eq!(writes(&out), vec!["a", "c", "b"]);
        assert_eq!(pass.moved(), 1);
    }

    #[test]
    fn test_dependence_blocks_move() {
        let a = make_cluster("a", "src", "x");
        let b = make_cluster("b", "a", "y");
        let c = make_cluster("c", "b", "x");
        let out = Toposort::new().apply(vec![a, b, c]).unwrap();
        assert_eq!(writes(&out), vec!["a", "b", "c"]);
    }
}
