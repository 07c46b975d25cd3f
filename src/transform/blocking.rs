//! Loop blocking (tiling) over Clusters.
//!
//! Blocking replaces a `TILABLE` dimension by a hierarchy of block
//! dimensions plus an innermost unit-stride dimension that keeps the
//! original name, so equations need no rewriting.
//!
//! Example (`levels = 1`):
//! ```text
//! for x = x_m to x_M:
//!   for y = y_m to y_M:
//!     u[x][y] = ...
//! ```
//! becomes, once both dimensions are blocked:
//! ```text
//! for x0_blk0 = x_m to x_M step x0_blk0_size:
//!   for y0_blk0 = y_m to y_M step y0_blk0_size:
//!     for x = x0_blk0 to x0_blk0 + x0_blk0_size - 1:
//!       for y = y0_blk0 to y0_blk0 + y0_blk0_size - 1:
//!         u[x][y] = ...
//! ```

use crate::ir::{Cluster, Dimension, Interval, IterationInterval, Property, Queue};
use crate::symbolic::SymExpr;
use crate::transform::Transform;
use crate::utils::errors::{CompileError, CompileResult, InternalErrorKind};
use log::debug;
use std::collections::HashMap;

/// Loop blocking pass.
#[derive(Debug, Clone)]
pub struct Blocking {
    /// Number of block levels per blocked dimension
    pub levels: usize,
    /// Whether a Cluster's innermost dimension may be blocked too
    pub inner: bool,
    /// How many times each dimension has been blocked so far
    nblocked: HashMap<Dimension, usize>,
    /// Every block dimension created, in creation order
    created: Vec<Dimension>,
}

impl Blocking {
    /// Create a blocking pass with the given number of levels.
    pub fn new(levels: usize) -> Self {
        Self { levels, inner: false, nblocked: HashMap::new(), created: Vec::new() }
    }

    /// Allow blocking the innermost dimension.
    pub fn with_inner(mut self, inner: bool) -> Self {
        self.inner = inner;
        self
    }

    /// Block dimensions created so far (innermost unit-stride ones excluded).
    pub fn block_dimensions(&self) -> &[Dimension] {
        &self.created
    }

    fn should_block(&self, cluster: &Cluster, d: &Dimension) -> bool {
        if !cluster.properties.is_tilable(d) {
            return false;
        }
        self.inner || cluster.dimensions().last() != Some(d)
    }

    /// Block `d` in `cluster`.
    fn block(&mut self, cluster: &Cluster, d: &Dimension) -> CompileResult<Cluster> {
        let n = self.nblocked.get(d).copied().unwrap_or(0);
        let name = |level: usize| format!("{}{}_blk{}", d.name, n, level);

        // The block hierarchy, coarsest first, then the unit-stride dimension
        let mut block_dims = vec![Dimension::block(&name(0), d)];
        for level in 1..self.levels {
            let outer = &block_dims[block_dims.len() - 1];
            let bd = Dimension::block_within(&name(level), outer, None);
            block_dims.push(bd);
        }
        let innermost = Dimension::block_within(
            &d.name.as_string(),
            &block_dims[block_dims.len() - 1],
            Some(SymExpr::int(1)),
        );
        self.created.extend(block_dims.iter().cloned());
        block_dims.push(innermost);

        let interval = cluster.ispace.intervals.get(d).ok_or_else(|| {
            CompileError::internal(
                InternalErrorKind::MissingInterval,
                format!("cannot block `{}`: not in {}", d, cluster.ispace),
            )
        })?;
        let mut intervals = vec![interval.switch(&block_dims[0])];
        intervals.extend(block_dims[1..].iter().map(|bd| interval.switch(bd).zero()));

        // Keep block dimensions of the same level adjacent across blocked
        // dimensions: (t, xb, yb, x, y) rather than (t, xb, x, yb, y)
        let mut relations = vec![block_dims.clone()];
        for i in cluster.ispace.intervals.iter().filter(|i| i.dim().is_block()) {
            let defines = i.dim().defines();
            for bd in &block_dims {
                if !bd.defines().is_disjoint(&defines) {
                    break;
                }
                if defines.len() > bd.defines().len() {
                    relations.push(vec![bd.clone(), i.dim().clone()]);
                }
            }
        }

        let ispace = cluster.ispace.expand(d, intervals, relations)?;

        let tags = cluster.properties.get(d).cloned().unwrap_or_default();
        let mut properties = cluster.properties.drop(d);
        for bd in &block_dims {
            let inherited = tags.iter().copied().filter(|p| *p != Property::Tilable);
            properties = properties.with(bd, inherited);
        }

        *self.nblocked.entry(d.clone()).or_insert(0) += 1;
        debug!(
            "blocking: `{}` -> [{}]",
            d,
            block_dims.iter().map(|b| b.to_string()).collect::<Vec<_>>().join(", ")
        );

        Ok(cluster.with_ispace(ispace).with_properties(properties))
    }
}

impl Queue for Blocking {
    type Element = Cluster;

    fn callback(
        &mut self,
        clusters: Vec<Cluster>,
        prefix: &[IterationInterval],
    ) -> CompileResult<Vec<Cluster>> {
        let Some(last) = prefix.last() else {
            return Ok(clusters);
        };
        let d = last.dim().clone();

        let mut processed = Vec::with_capacity(clusters.len());
        for c in clusters {
            if self.should_block(&c, &d) {
                processed.push(self.block(&c, &d)?);
            } else {
                processed.push(c);
            }
        }
        Ok(processed)
    }
}

impl Transform for Blocking {
    fn apply(&mut self, clusters: Vec<Cluster>) -> CompileResult<Vec<Cluster>> {
        if self.levels == 0 {
            return Ok(clusters);
        }
        self.process_fatd(clusters, 1)
    }

    fn name(&self) -> &str {
        "blocking"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Access, DataSpace, Expr, IntervalGroup, IterationSpace, LoweredEq, Properties};
    use std::collections::BTreeSet;

    fn dim(name: &str) -> Dimension {
        Dimension::new(name)
    }

    fn make_cluster(tilable: &[&str]) -> Cluster {
        let dims = ["t", "x", "y"];
        let ig = IntervalGroup::from_intervals(
            dims.iter().map(|d| Interval::new(dim(d), 0, 0)).collect(),
        );
        let ispace = IterationSpace::from_intervals(ig);
        let idx: Vec<SymExpr> = dims.iter().map(|d| SymExpr::symbol(*d)).collect();
        let eq = LoweredEq::new(
            Access::new("u", idx.clone()),
            Expr::Access(Access::new("v", idx)),
            ispace,
            DataSpace::default(),
        );
        let mut props = Properties::new().with(&dim("t"), [Property::Sequential]);
        for d in ["x", "y"] {
            props = props.with(&dim(d), [Property::Parallel]);
        }
        for d in tilable {
            props = props.with(&dim(d), [Property::Tilable]);
        }
        Cluster::from_eq(eq, props)
    }

    fn names(c: &Cluster) -> Vec<String> {
        c.dimensions().iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn test_non_tilable_untouched() {
        let c = make_cluster(&[]);
        let out = Blocking::new(1).apply(vec![c.clone()]).unwrap();
        assert_eq!(out, vec![c]);
    }

    #[test]
    fn test_block_one_dimension() {
        let c = make_cluster(&["x"]);
        let mut pass = Blocking::new(1).with_inner(true);
        let out = pass.apply(vec![c]).unwrap();
        assert_eq!(names(&out[0]), vec!["t", "x0_blk0", "x", "y"]);
        assert_eq!(pass.block_dimensions().len(), 1);

        let bd = &out[0].dimensions()[1];
        assert!(bd.is_block());
        assert!(out[0].properties.is_parallel(bd));
        assert!(!out[0].properties.is_tilable(bd));
        assert!(out[0].properties.get(&dim("x")).is_none());
    }

    #[test]
    fn test_same_level_block_dimensions_adjacent() {
        let c = make_cluster(&["x", "y"]);
        let out = Blocking::new(1).with_inner(true).apply(vec![c]).unwrap();
        assert_eq!(names(&out[0]), vec!["t", "x0_blk0", "y0_blk0", "x", "y"]);
    }

    #[test]
    fn test_innermost_skipped_unless_requested() {
        let c = make_cluster(&["x", "y"]);
        let out = Blocking::new(1).apply(vec![c]).unwrap();
        assert_eq!(names(&out[0]), vec!["t", "x0_blk0", "x", "y"]);
    }

    #[test]
    fn test_two_levels() {
        let c = make_cluster(&["x"]);
        let out = Blocking::new(2).with_inner(true).apply(vec![c]).unwrap();
        assert_eq!(names(&out[0]), vec!["t", "x0_blk0", "x0_blk1", "x", "y"]);
        let dims = out[0].dimensions();
        assert_eq!(dims[2].parent(), Some(&dims[1]));
        assert_eq!(dims[3].step(), SymExpr::int(1));
        let expected = Interval::new(dims[2].clone(), 0, 0);
        assert_eq!(out[0].ispace.intervals.get(&dims[2]), Some(&expected));
    }

    #[test]
    fn test_counter_gives_unique_names() {
        let a = make_cluster(&["x"]);
        let b = make_cluster(&["x"]);
        let out = Blocking::new(1).with_inner(true).apply(vec![a, b]).unwrap();
        assert_eq!(names(&out[0])[1], "x0_blk0");
        assert_eq!(names(&out[1])[1], "x1_blk0");
    }

    #[test]
    fn test_zero_levels_is_noop() {
        let c = make_cluster(&["x", "y"]);
        let out = Blocking::new(0).with_inner(true).apply(vec![c.clone()]).unwrap();
        assert_eq!(out, vec![c]);
    }

    /// `make_cluster` with explicit relations `t < x` and `x < y`.
    fn make_related_cluster(tilable: &[&str]) -> Cluster {
        let c = make_cluster(tilable);
        let intervals = c.ispace.intervals.intervals().to_vec();
        let relations = vec![vec![dim("t"), dim("x")], vec![dim("x"), dim("y")]];
        let ig = IntervalGroup::new(intervals, relations).unwrap();
        c.with_ispace(c.ispace.with_intervals(ig))
    }

    #[test]
    fn test_existing_relations_follow_block_dimension() {
        let out = Blocking::new(1).apply(vec![make_related_cluster(&["x"])]).unwrap();
        assert_eq!(names(&out[0]), vec!["t", "x0_blk0", "x", "y"]);

        let dims = out[0].dimensions();
        let expected: BTreeSet<Vec<Dimension>> = [
            vec![dim("t"), dims[1].clone()],
            vec![dims[1].clone(), dim("y")],
            vec![dims[1].clone(), dims[2].clone()],
        ]
        .into_iter()
        .collect();
        assert_eq!(out[0].ispace.intervals.relations(), &expected);
    }

    #[test]
    fn test_existing_relations_with_two_blocked_dimensions() {
        let c = make_related_cluster(&["x", "y"]);
        let out = Blocking::new(1).with_inner(true).apply(vec![c]).unwrap();
        assert_eq!(names(&out[0]), vec!["t", "x0_blk0", "y0_blk0", "x", "y"]);

        let dims = out[0].dimensions();
        let relations = out[0].ispace.intervals.relations();
        assert!(relations.contains(&vec![dim("t"), dims[1].clone()]));
        assert!(relations.contains(&vec![dims[1].clone(), dims[2].clone()]));
        assert!(relations.contains(&vec![dims[2].clone(), dims[4].clone()]));
        // The original basic dimensions no longer appear anywhere
        assert!(relations.iter().flatten().all(|d| *d != dim("x") && *d != dim("y")));
    }
}
