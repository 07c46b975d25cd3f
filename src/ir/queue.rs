//! Divide-and-conquer processing over nested iteration spaces.
//!
//! A `Queue` splits a sequence of elements into runs of consecutive
//! elements sharing the first `level` iteration intervals and hands each
//! run, with its shared prefix, to `callback`. Runs are never merged
//! across a differing neighbour: the element order encodes dependences.
//!
//! Two recursion orders are provided:
//! - `process_fdta` (first divide, then apply): children are processed
//!   before the callback sees their parent prefix.
//! - `process_fatd` (first apply, then divide): the callback rewrites a
//!   prefix group before its children are visited, so the recursion
//!   follows whatever the callback produced.

use crate::ir::cluster::{Cluster, ClusterGroup};
use crate::ir::space::IterationInterval;
use crate::utils::errors::{CompileError, CompileResult, InternalErrorKind};
use itertools::Itertools;

/// Anything the queue engine can group by iteration prefix.
pub trait Prefixed {
    fn itintervals(&self) -> Vec<IterationInterval>;
}

impl Prefixed for Cluster {
    fn itintervals(&self) -> Vec<IterationInterval> {
        Cluster::itintervals(self)
    }
}

impl Prefixed for ClusterGroup {
    fn itintervals(&self) -> Vec<IterationInterval> {
        self.itintervals.clone()
    }
}

/// The first `level` iteration intervals of `element` (fewer if it has fewer).
pub fn prefix_key<E: Prefixed>(element: &E, level: usize) -> Vec<IterationInterval> {
    let mut key = element.itintervals();
    key.truncate(level);
    key
}

/// Split `elements` into maximal runs of consecutive elements with equal
/// `prefix_key(_, level)`. Order is preserved; equal keys separated by a
/// different one form separate runs.
pub fn group_runs<E: Prefixed>(
    elements: Vec<E>,
    level: usize,
) -> Vec<(Vec<IterationInterval>, Vec<E>)> {
    let chunks = elements.into_iter().chunk_by(|e| prefix_key(e, level));
    let runs = chunks.into_iter().map(|(key, run)| (key, run.collect())).collect();
    runs
}

/// A pass driven by the divide-and-conquer engine.
pub trait Queue {
    type Element: Prefixed;

    /// Process `elements`, all sharing `prefix`.
    ///
    /// Every concrete queue must override this.
    fn callback(
        &mut self,
        elements: Vec<Self::Element>,
        prefix: &[IterationInterval],
    ) -> CompileResult<Vec<Self::Element>> {
        let _ = elements;
        Err(CompileError::internal(
            InternalErrorKind::CallbackNotImplemented,
            format!("queue callback not implemented (prefix depth {})", prefix.len()),
        ))
    }

    /// First divide, then apply.
    fn process_fdta(
        &mut self,
        elements: Vec<Self::Element>,
        level: usize,
        prefix: &[IterationInterval],
    ) -> CompileResult<Vec<Self::Element>> {
        let mut processed = Vec::with_capacity(elements.len());
        for (pfx, run) in group_runs(elements, level) {
            if level > pfx.len() {
                processed.extend(run);
            } else {
                processed.extend(self.process_fdta(run, level + 1, &pfx)?);
            }
        }
        self.callback(processed, prefix)
    }

    /// First apply, then divide.
    fn process_fatd(
        &mut self,
        elements: Vec<Self::Element>,
        level: usize,
    ) -> CompileResult<Vec<Self::Element>> {
        let mut processed = Vec::with_capacity(elements.len());
        for (pfx, run) in group_runs(elements, level) {
            if level > pfx.len() {
                processed.extend(run);
            } else {
                let rewritten = self.callback(run, &pfx)?;
                processed.extend(self.process_fatd(rewritten, level + 1)?);
            }
        }
        Ok(processed)
    }
}

/// A queue whose callback sees Clusters batched into `ClusterGroup`s.
///
/// Clusters are wrapped one per group on the way in. Whatever the
/// callback returns for a prefix is collapsed into a single group keyed
/// by that prefix, and everything is flattened back into Clusters at the
/// end.
pub trait QueueCG {
    fn callback(
        &mut self,
        cgroups: Vec<ClusterGroup>,
        prefix: &[IterationInterval],
    ) -> CompileResult<Vec<ClusterGroup>> {
        let _ = cgroups;
        Err(CompileError::internal(
            InternalErrorKind::CallbackNotImplemented,
            format!("cluster-group callback not implemented (prefix depth {})", prefix.len()),
        ))
    }

    /// Run the queue over `clusters` (FDTA from depth 1).
    fn process(&mut self, clusters: Vec<Cluster>) -> CompileResult<Vec<Cluster>> {
        let cgroups = clusters.into_iter().map(ClusterGroup::from_cluster).collect();
        let processed = Grouped(self).process_fdta(cgroups, 1, &[])?;
        Ok(ClusterGroup::concatenate(processed))
    }
}

struct Grouped<'a, Q: ?Sized>(&'a mut Q);

impl<Q: QueueCG + ?Sized> Queue for Grouped<'_, Q> {
    type Element = ClusterGroup;

    fn callback(
        &mut self,
        elements: Vec<ClusterGroup>,
        prefix: &[IterationInterval],
    ) -> CompileResult<Vec<ClusterGroup>> {
        let out = self.0.callback(elements, prefix)?;
        if out.is_empty() {
            return Ok(out);
        }
        Ok(vec![ClusterGroup::new(ClusterGroup::concatenate(out), prefix.to_vec())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::dimension::Dimension;
    use crate::ir::interval::Interval;
    use crate::ir::space::Direction;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: usize,
        key: Vec<IterationInterval>,
    }

    impl Prefixed for Item {
        fn itintervals(&self) -> Vec<IterationInterval> {
            self.key.clone()
        }
    }

    fn it(name: &str) -> IterationInterval {
        IterationInterval::new(Interval::new(Dimension::new(name), 0, 0), Direction::Forward)
    }

    fn items(keys: &[&[&str]]) -> Vec<Item> {
        keys.iter()
            .enumerate()
            .map(|(id, k)| Item { id, key: k.iter().map(|n| it(n)).collect() })
            .collect()
    }

    /// Records every callback invocation.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<(usize, Vec<usize>)>,
    }

    impl Queue for Recorder {
        type Element = Item;

        fn callback(
            &mut self,
            elements: Vec<Item>,
            prefix: &[IterationInterval],
        ) -> CompileResult<Vec<Item>> {
            self.calls.push((prefix.len(), elements.iter().map(|e| e.id).collect()));
            Ok(elements)
        }
    }

    struct Unimplemented;

    impl Queue for Unimplemented {
        type Element = Item;
    }

    #[test]
    fn test_group_runs_is_run_length() {
        let runs = group_runs(items(&[&["a"], &["a"], &["b"], &["b"], &["a"]]), 1);
        let ids: Vec<Vec<usize>> =
            runs.iter().map(|(_, r)| r.iter().map(|e| e.id).collect()).collect();
        assert_eq!(ids, vec![vec![0, 1], vec![2, 3], vec![4]]);
    }

    #[test]
    fn test_fdta_children_before_parent() {
        let mut q = Recorder::default();
        let out = q.process_fdta(items(&[&["a", "x"], &["a", "y"], &["b"]]), 1, &[]).unwrap();
        assert_eq!(out.iter().map(|e| e.id).collect::<Vec<_>>(), vec![0, 1, 2]);
        // Innermost prefixes first, the empty prefix last.
        assert_eq!(q.calls.last(), Some(&(0, vec![0, 1, 2])));
        assert_eq!(q.calls[0], (2, vec![0]));
        assert!(q.calls.iter().position(|c| c == &(1, vec![0, 1])).unwrap() > 1);
    }

    #[test]
    fn test_fatd_parent_before_children() {
        let mut q = Recorder::default();
        let out = q.process_fatd(items(&[&["a", "x"], &["a", "y"], &["b"]]), 1).unwrap();
        assert_eq!(out.iter().map(|e| e.id).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(q.calls[0], (1, vec![0, 1]));
        assert_eq!(q.calls[1], (2, vec![0]));
        assert_eq!(q.calls[2], (2, vec![1]));
        assert_eq!(q.calls[3], (1, vec![2]));
        assert_eq!(q.calls.len(), 4);
    }

    #[test]
    fn test_base_case_passes_through() {
        let mut q = Recorder::default();
        let out = q.process_fatd(items(&[&[]]), 1).unwrap();
        assert_eq!(out.len(), 1);
        assert!(q.calls.is_empty());
    }

    #[test]
    fn test_default_callback_fails() {
        let err = Unimplemented.process_fatd(items(&[&["a"]]), 1).unwrap_err();
        assert_eq!(err.internal_kind(), Some(InternalErrorKind::CallbackNotImplemented));
    }
}
