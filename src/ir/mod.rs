//! Cluster-level intermediate representation.
//!
//! This module defines the values every pass works on:
//! - Dimensions, including block and sub-dimensions created by passes
//! - Intervals and interval groups (symbolic loop bounds plus nesting relations)
//! - Iteration and data spaces
//! - Lowered equations, Clusters and Cluster groups
//! - Uniform dependence distances between Clusters
//! - The `Queue` divide-and-conquer engine

pub mod dimension;
pub mod interval;
pub mod space;
pub mod properties;
pub mod equation;
pub mod cluster;
pub mod dependence;
pub mod queue;

pub use dimension::{Dimension, DimensionKind, SubRegion};
pub use interval::{GenerateOp, Interval, IntervalGroup};
pub use space::{DataSpace, Direction, IterationInterval, IterationSpace};
pub use properties::{Properties, Property};
pub use equation::{Access, AccessDistance, Expr, LoweredEq};
pub use cluster::{clusterize, Cluster, ClusterGroup};
pub use dependence::{dependences, narrow, Distance};
pub use queue::{group_runs, Prefixed, Queue, QueueCG};
