//! StencilOpt Command Line Interface
//!
//! Usage:
//!   stencilopt [OPTIONS] <input-file>
//!   stencilopt --help
//!
//! Examples:
//!   stencilopt clusters.json                       # Advanced pipeline, JSON out
//!   stencilopt --mode=noop clusters.json           # Pass-through
//!   stencilopt --block-shape=8,8 --emit=tree clusters.json
//!   stencilopt --mode=toposort,fuse --emit=text clusters.json

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, error, info};
use stencilopt::ir::Cluster;
use stencilopt::transform::{PassMode, PipelineConfig};
use stencilopt::utils::pretty::PrettyPrint;
use std::fs;
use std::path::PathBuf;

/// StencilOpt - Cluster scheduling and loop transformations for stencils
#[derive(Parser, Debug)]
#[command(name = "stencilopt")]
#[command(author = "StencilOpt Contributors")]
#[command(version)]
#[command(about = "Cluster-level loop transformations for stencil compilers", long_about = None)]
struct Cli {
    /// Input file: a JSON list of Clusters
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Pass selection: `noop`, `advanced` or a comma-separated pass list
    #[arg(long)]
    mode: Option<String>,

    /// Number of blocking levels
    #[arg(long)]
    block_levels: Option<usize>,

    /// Also block the innermost dimension
    #[arg(long)]
    block_inner: bool,

    /// Block sizes (comma-separated), one per blocked dimension
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    block_shape: Option<Vec<i64>>,

    /// Pipeline configuration file (JSON); flags override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// What to emit
    #[arg(long, default_value = "json")]
    emit: EmitKind,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitKind {
    /// Transformed Clusters and runtime arguments (JSON)
    Json,
    /// Human-readable Cluster dump
    Text,
    /// Loop nest built from the transformed Clusters
    Tree,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("StencilOpt v{}", stencilopt::VERSION);
    debug!("Input file: {:?}", cli.input);

    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read input file: {:?}", cli.input))?;
    let clusters: Vec<Cluster> = serde_json::from_str(&source)
        .with_context(|| format!("Failed to parse Clusters from {:?}", cli.input))?;
    info!("Loaded {} clusters", clusters.len());

    let config = build_config(&cli)?;
    debug!("Pipeline config: {:?}", config);

    let result = match stencilopt::optimize(clusters, &config) {
        Ok(result) => result,
        Err(e) => {
            error!("Optimization failed: {}", e);
            return Err(e.into());
        }
    };
    info!(
        "Applied passes [{}], {} clusters out",
        result.applied_passes.join(", "),
        result.clusters.len()
    );

    let output = match cli.emit {
        EmitKind::Json => serde_json::to_string_pretty(&result)
            .context("Failed to serialize the result")?,
        EmitKind::Text => {
            let mut text = result.clusters.as_slice().pretty();
            for (name, value) in &result.runtime_args {
                text.push_str(&format!("\n{} = {}", name, value));
            }
            text
        }
        EmitKind::Tree => stencilopt::iet::render(&result.clusters)
            .context("Failed to build the loop nest")?,
    };
    write_output(&cli.output, &output)
}

fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid config file: {:?}", path))?
        }
        None => PipelineConfig::default(),
    };

    // Override with CLI flags
    if let Some(ref mode) = cli.mode {
        let mode: PassMode = mode.parse().context("Invalid --mode")?;
        config = config.with_mode(mode);
    }
    if let Some(levels) = cli.block_levels {
        config = config.with_block_levels(levels);
    }
    if cli.block_inner {
        config = config.with_block_inner(true);
    }
    if let Some(ref shape) = cli.block_shape {
        config = config.with_block_shape(shape.clone());
    }

    config.validate().context("Invalid pipeline configuration")?;
    Ok(config)
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content)
                .with_context(|| format!("Failed to write output file: {:?}", p))?;
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
