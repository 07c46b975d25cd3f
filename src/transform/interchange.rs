//! Loop interchange over Clusters.
//!
//! Interchange moves a parallel loop outward within a perfect nest (a
//! prefix shared by exactly one Cluster), so more parallelism sits at the
//! outermost levels.
//!
//! Example:
//! ```text
//! for t = ...          // SEQUENTIAL
//!   for x = ...        // PARALLEL_INDEP
//!     u[x] = ...
//! ```
//! becomes:
//! ```text
//! for x = ...
//!   for t = ...
//!     u[x] = ...
//! ```
//!
//! The rewrite is conservative. Only dimensions with no dependence
//! component at all (`PARALLEL_INDEP`) move, they never cross a parallel
//! loop or a dimension derived from the same root, and nests shared by
//! several Clusters are left alone. A loop never hops over an enclosing
//! loop the Cluster shares with its neighbours, even where the Cluster is
//! alone deeper down.

use crate::ir::{Cluster, IntervalGroup, IterationInterval, Queue};
use crate::transform::Transform;
use crate::utils::errors::{CompileError, CompileResult, InternalErrorKind};
use log::debug;

/// Loop interchange pass.
#[derive(Debug, Clone, Default)]
pub struct Interchange {
    /// Number of loops moved so far
    moved: usize,
    /// For each enclosing prefix level of the current group, whether
    /// more than one Cluster shared it
    shared: Vec<bool>,
}

impl Interchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many loops this pass has moved.
    pub fn moved(&self) -> usize {
        self.moved
    }

    /// Number of outer loops the current group shares with other Clusters.
    fn pinned_depth(&self) -> usize {
        self.shared.iter().rposition(|s| *s).map_or(0, |level| level + 1)
    }

    /// Move the innermost prefix dimension of `cluster` outward, if allowed.
    fn promote(
        &mut self,
        cluster: &Cluster,
        prefix: &[IterationInterval],
    ) -> CompileResult<Option<Cluster>> {
        let Some(last) = prefix.last() else {
            return Ok(None);
        };
        let d = last.dim();
        if !cluster.properties.is_parallel_indep(d) {
            return Ok(None);
        }

        let dims = cluster.dimensions();
        let pos = dims.iter().position(|x| x == d).ok_or_else(|| {
            CompileError::internal(
                InternalErrorKind::MissingInterval,
                format!("prefix dimension `{}` not in {}", d, cluster.ispace),
            )
        })?;

        // Hop over enclosing loops that are neither parallel nor related to
        // `d`, and not shared with another Cluster
        let floor = self.pinned_depth();
        let mut target = pos;
        while target > floor {
            let outer = &dims[target - 1];
            if cluster.properties.is_parallel(outer) || outer.shares_root(d) {
                break;
            }
            target -= 1;
        }
        if target == pos {
            return Ok(None);
        }

        let mut intervals = cluster.ispace.intervals.intervals().to_vec();
        let moved = intervals.remove(pos);
        intervals.insert(target, moved);
        let order: Vec<_> = intervals.iter().map(|i| i.dim().clone()).collect();
        let ig = IntervalGroup::new(intervals, vec![order])?;

        debug!("interchange: `{}` moved from depth {} to {}", d, pos, target);
        self.moved += 1;
        Ok(Some(cluster.with_ispace(cluster.ispace.with_intervals(ig))))
    }
}

/// The single Cluster of a perfect nest.
pub fn expect_perfect<'a>(
    clusters: &'a [Cluster],
    prefix: &[IterationInterval],
) -> CompileResult<&'a Cluster> {
    match clusters {
        [c] => Ok(c),
        _ => Err(CompileError::internal(
            InternalErrorKind::ImperfectNest,
            format!(
                "expected a perfect nest at depth {}, found {} Clusters",
                prefix.len(),
                clusters.len()
            ),
        )),
    }
}

impl Queue for Interchange {
    type Element = Cluster;

    fn callback(
        &mut self,
        clusters: Vec<Cluster>,
        prefix: &[IterationInterval],
    ) -> CompileResult<Vec<Cluster>> {
        // FATD visits parents first, so the levels above are on the stack
        let level = prefix.len();
        self.shared.truncate(level.saturating_sub(1));
        self.shared.push(clusters.len() > 1);

        // Imperfect nests and the top level stay as they are
        if prefix.is_empty() || clusters.len() != 1 {
            return Ok(clusters);
        }
        let cluster = expect_perfect(&clusters, prefix)?;
        match self.promote(cluster, prefix)? {
            Some(c) => Ok(vec![c]),
            None => Ok(clusters),
        }
    }
}

impl Transform for Interchange {
    fn apply(&mut self, clusters: Vec<Cluster>) -> CompileResult<Vec<Cluster>> {
        self.shared.clear();
        self.process_fatd(clusters, 1)
    }

    fn name(&self) -> &str {
        "interchange"
    }
}
