//! Pass pipeline over Cluster lists.
//!
//! This module provides the configuration surface of the compiler core
//! and the driver applying the selected passes in order. The whole
//! configuration is validated before the first pass runs.

use crate::ir::{Cluster, Dimension};
use crate::transform::{Blocking, Fusion, Interchange, Remainder, Toposort, Transform};
use crate::utils::errors::{CompileError, CompileResult, ConfigErrorKind};
use log::{debug, info, warn};
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Every pass name the pipeline answers to.
pub const KNOWN_PASSES: &[&str] =
    &["toposort", "fuse", "topofuse", "blocking", "interchange", "remainder"];

/// Passes run in `advanced` mode, in order.
pub const ADVANCED_PASSES: &[&str] = &["toposort", "fuse", "blocking", "interchange"];

/// Deepest block hierarchy accepted.
pub const MAX_BLOCK_LEVELS: usize = 8;

/// Which passes to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PassMode {
    /// No passes
    Noop,
    /// The default optimization sequence
    Advanced,
    /// An explicit, ordered list of pass names
    Custom(Vec<String>),
}

impl PassMode {
    /// Pass names, in execution order.
    pub fn passes(&self) -> Vec<String> {
        match self {
            PassMode::Noop => Vec::new(),
            PassMode::Advanced => ADVANCED_PASSES.iter().map(|s| s.to_string()).collect(),
            PassMode::Custom(passes) => passes.clone(),
        }
    }
}

impl FromStr for PassMode {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(CompileError::config(ConfigErrorKind::InvalidMode, "empty pass mode")),
            "noop" => Ok(PassMode::Noop),
            "advanced" => Ok(PassMode::Advanced),
            list => {
                let passes: Vec<String> = list.split(',').map(|p| p.trim().to_string()).collect();
                if passes.iter().any(|p| p.is_empty()) {
                    return Err(CompileError::config(
                        ConfigErrorKind::InvalidMode,
                        format!("empty pass name in `{}`", list),
                    ));
                }
                Ok(PassMode::Custom(passes))
            }
        }
    }
}

impl TryFrom<String> for PassMode {
    type Error = CompileError;

    fn try_from(s: String) -> CompileResult<Self> {
        s.parse()
    }
}

impl From<PassMode> for String {
    fn from(mode: PassMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for PassMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassMode::Noop => write!(f, "noop"),
            PassMode::Advanced => write!(f, "advanced"),
            PassMode::Custom(passes) => write!(f, "{}", passes.join(",")),
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Passes to run
    pub mode: PassMode,
    /// Block levels per blocked dimension
    pub block_levels: usize,
    /// Whether the innermost dimension may be blocked
    pub block_inner: bool,
    /// Block size per blocked dimension, outermost first
    pub block_shape: Option<Vec<i64>>,
    /// Grid extent per dimension, for block-shape checks
    pub grid_shape: Option<Vec<i64>>,
    /// Require every block size to divide its grid extent
    pub exact_blocks: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: PassMode::Advanced,
            block_levels: 1,
            block_inner: false,
            block_shape: None,
            grid_shape: None,
            exact_blocks: false,
        }
    }
}

impl PipelineConfig {
    /// Configuration running no passes at all.
    pub fn noop() -> Self {
        Self { mode: PassMode::Noop, ..Default::default() }
    }

    /// Configuration favouring cache locality: everything blocked.
    pub fn for_locality() -> Self {
        Self { block_inner: true, ..Default::default() }
    }

    /// Configuration favouring outer parallelism, without blocking.
    pub fn for_parallelism() -> Self {
        Self {
            mode: PassMode::Custom(vec!["topofuse".to_string(), "interchange".to_string()]),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: PassMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_block_levels(mut self, levels: usize) -> Self {
        self.block_levels = levels;
        self
    }

    pub fn with_block_inner(mut self, inner: bool) -> Self {
        self.block_inner = inner;
        self
    }

    pub fn with_block_shape(mut self, shape: Vec<i64>) -> Self {
        self.block_shape = Some(shape);
        self
    }

    pub fn with_grid_shape(mut self, shape: Vec<i64>) -> Self {
        self.grid_shape = Some(shape);
        self
    }

    pub fn with_exact_blocks(mut self, exact: bool) -> Self {
        self.exact_blocks = exact;
        self
    }

    /// Check the configuration; any error here is fatal.
    pub fn validate(&self) -> CompileResult<()> {
        for pass in self.mode.passes() {
            if !KNOWN_PASSES.contains(&pass.as_str()) {
                return Err(CompileError::config(
                    ConfigErrorKind::UnknownPass,
                    format!("unknown pass `{}` (known: {})", pass, KNOWN_PASSES.join(", ")),
                ));
            }
        }

        if self.block_levels > MAX_BLOCK_LEVELS {
            return Err(CompileError::config(
                ConfigErrorKind::InvalidBlockLevels,
                format!(
                    "{} block levels requested, at most {} supported",
                    self.block_levels, MAX_BLOCK_LEVELS
                ),
            ));
        }

        let Some(shape) = &self.block_shape else {
            return Ok(());
        };
        if let Some(bad) = shape.iter().find(|&&b| b <= 0) {
            return Err(CompileError::config(
                ConfigErrorKind::InvalidBlockShape,
                format!("block size {} is not positive", bad),
            ));
        }
        match &self.grid_shape {
            Some(grid) if grid.len() != shape.len() => Err(CompileError::config(
                ConfigErrorKind::InvalidBlockShape,
                format!("block shape {:?} does not match grid shape {:?}", shape, grid),
            )),
            Some(grid) if self.exact_blocks => {
                match shape.iter().zip(grid).find(|(b, g)| *g % *b != 0) {
                    Some((b, g)) => Err(CompileError::config(
                        ConfigErrorKind::InvalidBlockShape,
                        format!("block size {} does not divide grid extent {}", b, g),
                    )),
                    None => Ok(()),
                }
            }
            None if self.exact_blocks => Err(CompileError::config(
                ConfigErrorKind::InvalidBlockShape,
                "exact blocks requested without a grid shape",
            )),
            _ => Ok(()),
        }
    }
}

/// Result of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    /// The transformed Clusters, in execution order
    pub clusters: Vec<Cluster>,
    /// Passes that were run
    pub applied_passes: Vec<String>,
    /// Whether any pass changed the Cluster list
    pub modified: bool,
    /// Block dimensions created by blocking
    pub block_dimensions: Vec<Dimension>,
    /// Runtime block-size arguments, e.g. `x0_blk0_size = 8`
    pub runtime_args: BTreeMap<String, i64>,
}

/// Pass pipeline.
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Create a pipeline with default configuration.
    pub fn default_pipeline() -> Self {
        Self::new(PipelineConfig::default())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate the configuration, then run every selected pass in order.
    pub fn run(&self, clusters: Vec<Cluster>) -> CompileResult<OptimizationResult> {
        self.config.validate()?;

        let mut result = OptimizationResult {
            clusters,
            applied_passes: Vec::new(),
            modified: false,
            block_dimensions: Vec::new(),
            runtime_args: BTreeMap::new(),
        };

        for name in self.config.mode.passes() {
            let start = Instant::now();
            info!("Running pass `{}` on {} clusters", name, result.clusters.len());

            let input = result.clusters.clone();
            let output = self.run_pass(&name, input, &mut result).map_err(|e| e.in_pass(&name))?;
            if output != result.clusters {
                result.modified = true;
            }
            result.clusters = output;
            result.applied_passes.push(name.clone());

            debug!(
                "Pass `{}` done in {:?}: {} clusters",
                name,
                start.elapsed(),
                result.clusters.len()
            );
        }

        result.runtime_args = self.runtime_args(&result.block_dimensions);
        Ok(result)
    }

    fn run_pass(
        &self,
        name: &str,
        clusters: Vec<Cluster>,
        result: &mut OptimizationResult,
    ) -> CompileResult<Vec<Cluster>> {
        match name {
            "toposort" => Toposort::new().apply(clusters),
            "fuse" => Fusion::new().apply(clusters),
            "topofuse" => {
                let sorted = Toposort::new().apply(clusters)?;
                Fusion::new().apply(sorted)
            }
            "blocking" => {
                let mut blocking = Blocking::new(self.config.block_levels)
                    .with_inner(self.config.block_inner);
                let out = blocking.apply(clusters)?;
                result.block_dimensions.extend(blocking.block_dimensions().iter().cloned());
                Ok(out)
            }
            "interchange" => Interchange::new().apply(clusters),
            "remainder" => Remainder::new().apply(clusters),
            other => Err(CompileError::config(
                ConfigErrorKind::UnknownPass,
                format!("unknown pass `{}`", other),
            )),
        }
    }

    /// Assign the configured block sizes to the block dimensions' size
    /// parameters. Sizes go to the blocked dimensions in the order they
    /// were first blocked; every level of a dimension gets the same size.
    fn runtime_args(&self, block_dims: &[Dimension]) -> BTreeMap<String, i64> {
        let mut args = BTreeMap::new();
        let Some(shape) = &self.config.block_shape else {
            return args;
        };

        let mut roots: Vec<&Dimension> = Vec::new();
        for bd in block_dims {
            let root = bd.root();
            let idx = match roots.iter().position(|r| *r == root) {
                Some(idx) => idx,
                None => {
                    roots.push(root);
                    roots.len() - 1
                }
            };
            let Some(param) = bd.size_parameter() else {
                continue;
            };
            match shape.get(idx) {
                Some(&size) => {
                    args.insert(param.as_string(), size);
                }
                None => warn!("no block size given for `{}`", param),
            }
        }
        args
    }
}

/// Run the default pipeline.
pub fn quick_optimize(clusters: Vec<Cluster>) -> CompileResult<OptimizationResult> {
    Pipeline::default_pipeline().run(clusters)
}
