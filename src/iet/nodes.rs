//! Iteration/Expression Tree nodes.

use crate::ir::{Dimension, Direction, LoweredEq, Property};
use crate::symbolic::SymExpr;
use crate::utils::intern::Symbol;
use std::collections::BTreeSet;

/// A node in the Iteration/Expression Tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A loop
    Iteration(Iteration),
    /// Straight-line equations executed at one iteration point
    ExpressionBundle(ExpressionBundle),
    /// A call to another routine
    Call(Call),
    /// A sequence of nodes
    List(Vec<Node>),
    /// A routine with parameters and a body
    Callable(Callable),
}

/// A loop over one dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Iteration {
    pub dim: Dimension,
    /// First iteration point (inclusive)
    pub lower: SymExpr,
    /// Last iteration point (inclusive)
    pub upper: SymExpr,
    pub step: SymExpr,
    pub direction: Direction,
    /// Tags shared by every Cluster nested in this loop
    pub properties: BTreeSet<Property>,
    pub body: Vec<Node>,
}

impl Iteration {
    pub fn is_parallel(&self) -> bool {
        self.properties.iter().any(|p| p.is_parallel())
    }

    pub fn is_sequential(&self) -> bool {
        self.properties.contains(&Property::Sequential)
    }
}

/// Equations run back to back.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionBundle {
    pub exprs: Vec<LoweredEq>,
}

/// A call statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<SymExpr>,
}

/// A routine.
#[derive(Debug, Clone, PartialEq)]
pub struct Callable {
    pub name: String,
    /// Runtime parameters (loop bounds, block sizes), sorted by name
    pub parameters: Vec<Symbol>,
    pub body: Vec<Node>,
}

impl Callable {
    /// A call to this routine passing every parameter through.
    pub fn call(&self) -> Call {
        Call {
            name: self.name.clone(),
            args: self.parameters.iter().map(|p| SymExpr::symbol(*p)).collect(),
        }
    }
}
