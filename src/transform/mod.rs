//! Cluster transformations.

pub mod toposort;
pub mod fusion;
pub mod blocking;
pub mod interchange;
pub mod remainder;
pub mod pipeline;

pub use toposort::Toposort;
pub use fusion::Fusion;
pub use blocking::Blocking;
pub use interchange::Interchange;
pub use remainder::{left_remainder, right_remainder, Remainder};
pub use pipeline::{OptimizationResult, PassMode, Pipeline, PipelineConfig};

use crate::ir::Cluster;
use crate::utils::errors::CompileResult;

/// Transformation pass trait.
///
/// A pass takes ownership of the Cluster list and returns the rewritten
/// one; it never mutates Clusters in place.
pub trait Transform {
    /// Apply the transformation.
    fn apply(&mut self, clusters: Vec<Cluster>) -> CompileResult<Vec<Cluster>>;

    /// Get transformation name.
    fn name(&self) -> &str;
}
