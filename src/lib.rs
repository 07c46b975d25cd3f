//! # StencilOpt - Cluster Scheduling for Stencil Compilers
//!
//! The middle of a stencil compiler: lowered equations grouped into
//! Clusters (equations sharing an iteration space) are rewritten by a
//! pipeline of passes and finally flattened into a loop-nest tree:
//! - Iteration and data spaces built from symbolic intervals
//! - A divide-and-conquer `Queue` engine over iteration prefixes
//! - Loop transformations (toposort, fusion, blocking, interchange,
//!   remainder splitting)
//! - Iteration/Expression Tree construction with OpenMP annotations
//!
//! ## Architecture
//!
//! ```text
//! Clusters (JSON) → Pipeline [toposort → fuse → blocking → interchange] → IET → Output
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use stencilopt::prelude::*;
//!
//! let clusters: Vec<Cluster> = serde_json::from_str(&input)?;
//! let config = PipelineConfig::default().with_block_shape(vec![8, 8]);
//! let result = stencilopt::optimize(clusters, &config)?;
//! println!("{}", stencilopt::iet::render(&result.clusters)?);
//! ```

#![warn(clippy::all)]

pub mod symbolic;
pub mod ir;
pub mod transform;
pub mod iet;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::symbolic::{compare_bound, BoundOrdering, SymExpr, Substitute};
    pub use crate::ir::{
        Access, Cluster, ClusterGroup, DataSpace, Dimension, Direction, Expr, Interval,
        IntervalGroup, IterationInterval, IterationSpace, LoweredEq, Properties, Property, Queue,
        QueueCG,
    };
    pub use crate::transform::{OptimizationResult, PassMode, Pipeline, PipelineConfig, Transform};
    pub use crate::iet::{Node, Visitor};
    pub use crate::utils::errors::*;
    pub use crate::utils::pretty::PrettyPrint;
    pub use crate::utils::intern::Symbol;
}

use ir::Cluster;
use transform::{OptimizationResult, Pipeline, PipelineConfig};
use utils::errors::CompileResult;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the pass pipeline selected by `config` over `clusters`.
pub fn optimize(
    clusters: Vec<Cluster>,
    config: &PipelineConfig,
) -> CompileResult<OptimizationResult> {
    Pipeline::new(config.clone()).run(clusters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_optimize_empty() {
        let result = optimize(Vec::new(), &PipelineConfig::default()).unwrap();
        assert!(result.clusters.is_empty());
        assert!(!result.modified);
    }
}
