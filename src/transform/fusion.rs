//! Cluster fusion.
//!
//! Consecutive Clusters iterating over identical intervals are merged into
//! a single Cluster, so they end up in the same loop nest. A merge is
//! refused when a dependence between the two would run against the loop
//! order, or cannot be measured; a loop that ends up carrying a dependence
//! loses its parallel tags.

use crate::ir::{dependences, narrow, Cluster, ClusterGroup, Distance, IterationInterval, QueueCG};
use crate::transform::Transform;
use crate::utils::errors::{CompileResult, InternalErrorKind};
use itertools::Itertools;
use log::debug;

/// Cluster fusion pass.
#[derive(Debug, Clone, Default)]
pub struct Fusion {
    /// Number of merges performed
    fused: usize,
}

impl Fusion {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many Clusters have been merged away.
    pub fn fused(&self) -> usize {
        self.fused
    }

    /// Greedily merge neighbouring Clusters that can share a loop nest.
    fn fuse(&mut self, clusters: Vec<Cluster>) -> CompileResult<Vec<Cluster>> {
        let mut out: Vec<Cluster> = Vec::with_capacity(clusters.len());
        for c in clusters {
            let Some(last) = out.last() else {
                out.push(c);
                continue;
            };
            let loops = last.itintervals();
            if loops != c.itintervals() || !last.ispace.is_compatible(&c.ispace) {
                out.push(c);
                continue;
            }
            let Some(deps) = self.legal(last, &c, &loops) else {
                out.push(c);
                continue;
            };
            match Cluster::from_clusters(&[last.clone(), c.clone()]) {
                Ok(fused) => {
                    let properties = narrow(&fused.properties, &fused.dimensions(), &deps);
                    let fused = fused.with_properties(properties);
                    debug!("fusion: merged Clusters over {}", fused.ispace);
                    self.fused += 1;
                    if let Some(slot) = out.last_mut() {
                        *slot = fused;
                    }
                }
                Err(e) if is_incompatible(e.internal_kind()) => out.push(c),
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// The dependences from `a` to `b` if `b` may run inside `a`'s loops.
    fn legal(
        &self,
        a: &Cluster,
        b: &Cluster,
        loops: &[IterationInterval],
    ) -> Option<Vec<Distance>> {
        let deps = dependences(a, b, loops);
        if deps.iter().any(|d| d.is_unknown() || d.is_reversed()) {
            debug!("fusion: dependence prevents merging Clusters over {}", b.ispace);
            return None;
        }
        Some(deps)
    }
}

fn is_incompatible(kind: Option<InternalErrorKind>) -> bool {
    matches!(
        kind,
        Some(InternalErrorKind::IncompatibleSpaces | InternalErrorKind::CyclicRelations)
    )
}

impl QueueCG for Fusion {
    fn callback(
        &mut self,
        cgroups: Vec<ClusterGroup>,
        prefix: &[IterationInterval],
    ) -> CompileResult<Vec<ClusterGroup>> {
        let runs = cgroups.into_iter().chunk_by(|g| g.itintervals.clone());
        let mut processed = Vec::new();
        for (_, run) in &runs {
            let run: Vec<ClusterGroup> = run.collect();
            if run.len() == 1 {
                processed.extend(run);
                continue;
            }
            let fused = self.fuse(ClusterGroup::concatenate(run))?;
            processed.push(ClusterGroup::new(fused, prefix.to_vec()));
        }
        Ok(processed)
    }
}

impl Transform for Fusion {
    fn apply(&mut self, clusters: Vec<Cluster>) -> CompileResult<Vec<Cluster>> {
        self.process(clusters)
    }

    fn name(&self) -> &str {
        "fuse"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        Access, DataSpace, Dimension, Direction, Expr, Interval, IntervalGroup, IterationSpace,
        LoweredEq, Properties, Property,
    };
    use crate::symbolic::SymExpr;

    fn make_cluster(write: &str, read: &str, dims: &[&str]) -> Cluster {
        let ig = IntervalGroup::from_intervals(
            dims.iter().map(|d| Interval::new(Dimension::new(*d), 0, 0)).collect(),
        );
        let idx: Vec<SymExpr> = dims.iter().map(|d| SymExpr::symbol(*d)).collect();
        let eq = LoweredEq::new(
            Access::new(write, idx.clone()),
            Expr::Access(Access::new(read, idx)),
            IterationSpace::from_intervals(ig),
            DataSpace::default(),
        );
        let mut props = Properties::new();
        for d in dims {
            props = props.with(&Dimension::new(*d), [Property::Parallel]);
        }
        Cluster::from_eq(eq, props)
    }

    #[test]
    fn test_identical_spaces_fuse() {
        let a = make_cluster("u", "v", &["t", "x"]);
        let b = make_cluster("w", "u", &["t", "x"]);
        let mut pass = Fusion::new();
        let out = pass.apply(vec![a, b]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].exprs.len(), 2);
        assert_eq!(pass.fused(), 1);
    }

    #[test]
    fn test_different_spaces_stay_apart() {
        let a = make_cluster("u", "v", &["t", "x"]);
        let b = make_cluster("w", "u", &["t", "y"]);
        let out = Fusion::new().apply(vec![a, b]).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_non_adjacent_not_fused() {
        let a = make_cluster("u", "v", &["t", "x"]);
        let b = make_cluster("w", "u", &["t", "y"]);
        let c = make_cluster("z", "w", &["t", "x"]);
        let out = Fusion::new().apply(vec![a, b, c]).unwrap();
        assert_eq!(out.len(), 3);
        let written: Vec<String> = out[2].writes().iter().map(|s| s.to_string()).collect();
        assert_eq!(written, vec!["z"]);
    }

    #[test]
    fn test_opposite_directions_stay_apart() {
        let a = make_cluster("u", "v", &["t", "x"]);
        let mut b = make_cluster("w", "u", &["t", "x"]);
        b.ispace.directions.insert(Dimension::new("t"), Direction::Backward);
        let out = Fusion::new().apply(vec![a, b]).unwrap();
        assert_eq!(out.len(), 2);
    }

    /// `write[x] = read[x + offset]`, with `x` parallel.
    fn shifted(write: &str, read: &str, offset: i64) -> Cluster {
        let x = SymExpr::symbol("x");
        let ig = IntervalGroup::from_intervals(vec![Interval::new(Dimension::new("x"), 0, 0)]);
        let eq = LoweredEq::new(
            Access::new(write, vec![x.clone()]),
            Expr::Access(Access::new(read, vec![x + offset])),
            IterationSpace::from_intervals(ig),
            DataSpace::default(),
        );
        Cluster::from_eq(eq, Properties::new().with(&Dimension::new("x"), [Property::Parallel]))
    }

    #[test]
    fn test_forward_read_of_written_array_not_fused() {
        let input = vec![shifted("u", "src", 0), shifted("w", "u", 1)];
        let mut pass = Fusion::new();
        let out = pass.apply(input.clone()).unwrap();
        assert_eq!(out, input);
        assert_eq!(pass.fused(), 0);
    }

    #[test]
    fn test_carried_dependence_makes_loop_sequential() {
        let x = Dimension::new("x");
        let out = Fusion::new().apply(vec![shifted("u", "src", 0), shifted("w", "u", -1)]).unwrap();
        assert_eq!(out.len(), 1);
        assert!(!out[0].properties.is_parallel(&x));
        assert!(out[0].properties.is_sequential(&x));
    }

    #[test]
    fn test_unmeasurable_dependence_not_fused() {
        let x = SymExpr::symbol("x");
        let ig = IntervalGroup::from_intervals(vec![Interval::new(Dimension::new("x"), 0, 0)]);
        let eq = LoweredEq::new(
            Access::new("w", vec![x.clone()]),
            Expr::Access(Access::new("u", vec![x.scale(2)])),
            IterationSpace::from_intervals(ig),
            DataSpace::default(),
        );
        let strided = Cluster::from_eq(eq, Properties::new());
        let out = Fusion::new().apply(vec![shifted("u", "src", 0), strided]).unwrap();
        assert_eq!(out.len(), 2);
    }
}
