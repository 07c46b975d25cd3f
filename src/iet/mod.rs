//! Iteration/Expression Tree.
//!
//! The final Cluster list is flattened into a loop-nest tree: Clusters
//! that share an iteration prefix share the enclosing `Iteration` nodes,
//! and Cluster order is execution order. A shared loop is split where a
//! later Cluster would touch an element before an earlier one, and loses
//! its parallel tags where it carries a dependence between them. The
//! tree is a closed sum type walked by `Visitor`s.

pub mod nodes;
pub mod visitor;

pub use nodes::{Call, Callable, ExpressionBundle, Iteration, Node};
pub use visitor::{FindIterations, Renderer, Visitor};

use crate::ir::{dependences, group_runs, narrow, Cluster, Distance, IterationInterval, Properties};
use crate::utils::errors::{CompileError, CompileResult, InternalErrorKind};
use crate::utils::intern::Symbol;
use log::debug;
use std::collections::BTreeSet;

/// Name of the generated routine.
pub const KERNEL_NAME: &str = "Kernel";

/// Build the tree for `clusters`, rooted at a `Callable`.
pub fn build(clusters: &[Cluster]) -> CompileResult<Node> {
    let body = nest(clusters.to_vec(), 0)?;
    let parameters = parameters(&body);
    debug!(
        "built IET with {} top-level nodes and {} parameters",
        body.len(),
        parameters.len()
    );
    Ok(Node::Callable(Callable { name: KERNEL_NAME.to_string(), parameters, body }))
}

/// Build the tree for `clusters` and print it as a C-like loop nest.
pub fn render(clusters: &[Cluster]) -> CompileResult<String> {
    Ok(Renderer::new().render(&build(clusters)?))
}

/// Render an already built tree.
pub fn render_node(node: &Node) -> String {
    Renderer::new().render(node)
}

fn nest(clusters: Vec<Cluster>, depth: usize) -> CompileResult<Vec<Node>> {
    let mut out = Vec::new();
    for (key, run) in group_runs(clusters, depth + 1) {
        let Some(it) = key.get(depth) else {
            for c in run {
                out.push(Node::ExpressionBundle(ExpressionBundle { exprs: c.exprs }));
            }
            continue;
        };
        for (part, deps) in share(run, &key) {
            let properties = part
                .iter()
                .map(|c| &c.properties)
                .fold(Properties::new(), |acc, p| acc.merge(p));
            let properties = narrow(&properties, std::slice::from_ref(it.dim()), &deps);
            let body = nest(part, depth + 1)?;
            out.push(Node::Iteration(iteration(it.clone(), &properties, body)?));
        }
    }
    Ok(out)
}

/// Split a run of Clusters sharing `loops` wherever a later Cluster
/// depends on an earlier one against the loop order. Each part comes with
/// the dependences its Clusters have across the shared loops.
fn share(run: Vec<Cluster>, loops: &[IterationInterval]) -> Vec<(Vec<Cluster>, Vec<Distance>)> {
    let mut parts: Vec<(Vec<Cluster>, Vec<Distance>)> = Vec::new();
    for c in run {
        if let Some((part, deps)) = parts.last_mut() {
            let found: Vec<Distance> =
                part.iter().flat_map(|earlier| dependences(earlier, &c, loops)).collect();
            if !found.iter().any(Distance::is_reversed) {
                deps.extend(found);
                part.push(c);
                continue;
            }
            if let Some(l) = loops.last() {
                debug!("IET: split `{}` loop at a reversed dependence", l.dim());
            }
        }
        parts.push((vec![c], Vec::new()));
    }
    parts
}

fn iteration(
    it: IterationInterval,
    properties: &Properties,
    body: Vec<Node>,
) -> CompileResult<Iteration> {
    let (lower, upper) = it.interval.extent().ok_or_else(|| {
        CompileError::internal(
            InternalErrorKind::MissingInterval,
            format!("no iteration range for `{}`", it.dim()),
        )
    })?;
    let dim = it.dim().clone();
    Ok(Iteration {
        step: dim.step(),
        properties: properties.get(&dim).cloned().unwrap_or_default(),
        direction: it.direction,
        dim,
        lower,
        upper,
        body,
    })
}

/// Free symbols of the loop bounds that are not loop indices themselves.
fn parameters(body: &[Node]) -> Vec<Symbol> {
    let list = Node::List(body.to_vec());
    let iterations = FindIterations::new().find(&list);
    let indices: BTreeSet<Symbol> = iterations.iter().map(|i| i.dim.name).collect();
    iterations
        .iter()
        .flat_map(|i| {
            i.lower
                .free_symbols()
                .into_iter()
                .chain(i.upper.free_symbols())
                .chain(i.step.free_symbols())
        })
        .filter(|s| !indices.contains(s))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
