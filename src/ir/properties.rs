//! Per-dimension scheduling tags.
//!
//! Tags record what the front-end proved about each loop. Passes may
//! remove or narrow them but never promote a dimension to parallel.

use crate::ir::dimension::Dimension;
use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A scheduling tag attached to a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Property {
    /// Iterations may run concurrently
    Parallel,
    /// Parallel, with no dependence component along this dimension at all
    ParallelIndep,
    /// Iterations must run in order
    Sequential,
    /// Candidate for blocking
    Tilable,
}

impl Property {
    pub fn is_parallel(self) -> bool {
        matches!(self, Property::Parallel | Property::ParallelIndep)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Property::Parallel => "PARALLEL",
            Property::ParallelIndep => "PARALLEL_INDEP",
            Property::Sequential => "SEQUENTIAL",
            Property::Tilable => "TILABLE",
        };
        f.write_str(s)
    }
}

/// Tags of every dimension of a Cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
    #[serde(with = "crate::utils::serde_pairs")]
    tags: BTreeMap<Dimension, BTreeSet<Property>>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add `props` to `dim`.
    pub fn with(mut self, dim: &Dimension, props: impl IntoIterator<Item = Property>) -> Self {
        self.tags.entry(dim.clone()).or_default().extend(props);
        self
    }

    pub fn get(&self, dim: &Dimension) -> Option<&BTreeSet<Property>> {
        self.tags.get(dim)
    }

    pub fn has(&self, dim: &Dimension, prop: Property) -> bool {
        self.tags.get(dim).map_or(false, |s| s.contains(&prop))
    }

    pub fn is_parallel(&self, dim: &Dimension) -> bool {
        self.tags.get(dim).map_or(false, |s| s.iter().any(|p| p.is_parallel()))
    }

    pub fn is_parallel_indep(&self, dim: &Dimension) -> bool {
        self.has(dim, Property::ParallelIndep)
    }

    pub fn is_sequential(&self, dim: &Dimension) -> bool {
        self.has(dim, Property::Sequential)
    }

    pub fn is_tilable(&self, dim: &Dimension) -> bool {
        self.has(dim, Property::Tilable)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Dimension, &BTreeSet<Property>)> {
        self.tags.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Remove every tag of `dim`.
    pub fn drop(&self, dim: &Dimension) -> Self {
        let mut tags = self.tags.clone();
        tags.remove(dim);
        Self { tags }
    }

    /// Remove a single tag of `dim`.
    pub fn remove(&self, dim: &Dimension, prop: Property) -> Self {
        let mut tags = self.tags.clone();
        if let Some(set) = tags.get_mut(dim) {
            set.remove(&prop);
        }
        Self { tags }
    }

    /// `dim` now carries a dependence: it turns sequential.
    pub fn sequentialize(&self, dim: &Dimension) -> Self {
        self.remove(dim, Property::Parallel)
            .remove(dim, Property::ParallelIndep)
            .with(dim, [Property::Sequential])
    }

    /// A dependence has a component along `dim` without being carried by
    /// it: `dim` stays parallel but is no longer independent.
    pub fn affect(&self, dim: &Dimension) -> Self {
        if !self.is_parallel_indep(dim) {
            return self.clone();
        }
        self.remove(dim, Property::ParallelIndep).with(dim, [Property::Parallel])
    }

    /// Keep only the dimensions `keep` accepts.
    pub fn retain(&self, keep: impl Fn(&Dimension) -> bool) -> Self {
        let tags = self
            .tags
            .iter()
            .filter(|(d, _)| keep(d))
            .map(|(d, s)| (d.clone(), s.clone()))
            .collect();
        Self { tags }
    }

    /// Combine the tags of two Clusters that now share a loop nest.
    ///
    /// A dimension sequential on either side ends up sequential and
    /// loses any parallel tag; otherwise only the tags both sides agree
    /// on survive. Dimensions known to one side only keep their tags.
    pub fn merge(&self, other: &Properties) -> Self {
        let mut tags = self.tags.clone();
        for (d, theirs) in &other.tags {
            let merged = match self.tags.get(d) {
                None => theirs.clone(),
                Some(ours) => {
                    let mut common: BTreeSet<Property> =
                        ours.intersection(theirs).copied().collect();
                    let sequential = Property::Sequential;
                    if ours.contains(&sequential) || theirs.contains(&sequential) {
                        common.retain(|p| !p.is_parallel());
                        common.insert(Property::Sequential);
                    }
                    common
                }
            };
            tags.insert(d.clone(), merged);
        }
        Self { tags }
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .tags
            .iter()
            .map(|(d, s)| {
                let props: Vec<String> = s.iter().map(|p| p.to_string()).collect();
                format!("{}: {{{}}}", d, props.join(", "))
            })
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}
