//! Iteration dimensions.
//!
//! Besides the basic dimensions handed over by the front-end, passes create
//! derived dimensions:
//! - block dimensions (tiling), each iterating in steps of its own size
//!   inside the range of its parent
//! - sub-dimensions (boundary splitting), each covering a left, middle or
//!   right slab of its parent
//!
//! A derived dimension keeps its parent, so `root` and `defines` can be
//! answered without any external table.

use crate::symbolic::SymExpr;
use crate::utils::intern::Symbol;
use serde::{Serialize, Deserialize};
use std::collections::BTreeSet;
use std::fmt;

/// A named iteration dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dimension {
    /// Iteration variable name
    pub name: Symbol,
    /// What kind of dimension this is
    #[serde(default)]
    pub kind: DimensionKind,
}

/// The kinds of dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DimensionKind {
    /// A dimension spanning `[<name>_m, <name>_M]`
    #[default]
    Basic,
    /// A block dimension: iterates `[min, max]` in steps of `step`
    Block {
        /// Dimension this one subdivides
        parent: Box<Dimension>,
        /// First iteration point
        min: SymExpr,
        /// Last iteration point
        max: SymExpr,
        /// Iteration step
        step: SymExpr,
    },
    /// A slab of the parent dimension
    Sub {
        /// Dimension this one is carved out of
        parent: Box<Dimension>,
        /// Which slab
        region: SubRegion,
    },
}

/// Region covered by a sub-dimension, relative to its parent's bounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubRegion {
    /// `[p_min, p_min + thickness - 1]`
    Left { thickness: SymExpr },
    /// `[p_min + thickness_left, p_max - thickness_right]`
    Middle { thickness_left: SymExpr, thickness_right: SymExpr },
    /// `[p_max - thickness + 1, p_max]`
    Right { thickness: SymExpr },
}

impl Dimension {
    /// Create a basic dimension.
    pub fn new(name: impl Into<Symbol>) -> Self {
        Self { name: name.into(), kind: DimensionKind::Basic }
    }

    /// Create a block dimension with explicit bounds and step.
    pub fn incr(
        name: impl Into<Symbol>,
        parent: &Dimension,
        min: SymExpr,
        max: SymExpr,
        step: SymExpr,
    ) -> Self {
        Self {
            name: name.into(),
            kind: DimensionKind::Block { parent: Box::new(parent.clone()), min, max, step },
        }
    }

    /// Outermost block over `parent`: spans all of `parent` in steps of
    /// the runtime parameter `<name>_size`.
    pub fn block(name: &str, parent: &Dimension) -> Self {
        Self::incr(
            name,
            parent,
            parent.symbolic_min(),
            parent.symbolic_max(),
            SymExpr::symbol(format!("{}_size", name).as_str()),
        )
    }

    /// Block nested inside the block dimension `outer`: spans one step of
    /// `outer`. With `step = None` it gets its own `<name>_size` parameter.
    pub fn block_within(name: &str, outer: &Dimension, step: Option<SymExpr>) -> Self {
        let start = SymExpr::symbol(outer.name);
        let end = start.clone() + outer.step() - 1;
        let step = step.unwrap_or_else(|| SymExpr::symbol(format!("{}_size", name).as_str()));
        Self::incr(name, outer, start, end, step)
    }

    /// Left slab of `parent` of the given thickness.
    pub fn left(name: &str, parent: &Dimension, thickness: SymExpr) -> Self {
        Self::sub(name, parent, SubRegion::Left { thickness })
    }

    /// Right slab of `parent` of the given thickness.
    pub fn right(name: &str, parent: &Dimension, thickness: SymExpr) -> Self {
        Self::sub(name, parent, SubRegion::Right { thickness })
    }

    /// Middle slab of `parent`, trimmed by the two thicknesses.
    pub fn middle(
        name: &str,
        parent: &Dimension,
        thickness_left: SymExpr,
        thickness_right: SymExpr,
    ) -> Self {
        Self::sub(name, parent, SubRegion::Middle { thickness_left, thickness_right })
    }

    fn sub(name: &str, parent: &Dimension, region: SubRegion) -> Self {
        Self {
            name: Symbol::new(name),
            kind: DimensionKind::Sub { parent: Box::new(parent.clone()), region },
        }
    }

    /// The iteration variable as an expression.
    pub fn symbol(&self) -> SymExpr {
        SymExpr::symbol(self.name)
    }

    pub fn is_block(&self) -> bool {
        matches!(self.kind, DimensionKind::Block { .. })
    }

    /// The dimension this one was derived from, if any.
    pub fn parent(&self) -> Option<&Dimension> {
        match &self.kind {
            DimensionKind::Basic => None,
            DimensionKind::Block { parent, .. } | DimensionKind::Sub { parent, .. } => Some(parent),
        }
    }

    /// The basic dimension at the end of the parent chain.
    pub fn root(&self) -> &Dimension {
        let mut d = self;
        while let Some(p) = d.parent() {
            d = p;
        }
        d
    }

    /// This dimension plus everything up its parent chain.
    pub fn defines(&self) -> BTreeSet<Dimension> {
        let mut out = BTreeSet::new();
        let mut d = Some(self);
        while let Some(dim) = d {
            out.insert(dim.clone());
            d = dim.parent();
        }
        out
    }

    /// Whether `self` and `other` derive from a common dimension.
    pub fn shares_root(&self, other: &Dimension) -> bool {
        self.root() == other.root()
    }

    /// Iteration step.
    pub fn step(&self) -> SymExpr {
        match &self.kind {
            DimensionKind::Block { step, .. } => step.clone(),
            _ => SymExpr::int(1),
        }
    }

    /// First iteration point, symbolically.
    pub fn symbolic_min(&self) -> SymExpr {
        match &self.kind {
            DimensionKind::Basic => SymExpr::symbol(format!("{}_m", self.name).as_str()),
            DimensionKind::Block { min, .. } => min.clone(),
            DimensionKind::Sub { parent, region } => match region {
                SubRegion::Left { .. } => parent.symbolic_min(),
                SubRegion::Middle { thickness_left, .. } => {
                    parent.symbolic_min() + thickness_left.clone()
                }
                SubRegion::Right { thickness } => {
                    parent.symbolic_max() - thickness.clone() + 1
                }
            },
        }
    }

    /// Last iteration point, symbolically.
    pub fn symbolic_max(&self) -> SymExpr {
        match &self.kind {
            DimensionKind::Basic => SymExpr::symbol(format!("{}_M", self.name).as_str()),
            DimensionKind::Block { max, .. } => max.clone(),
            DimensionKind::Sub { parent, region } => match region {
                SubRegion::Left { thickness } => {
                    parent.symbolic_min() + thickness.clone() - 1
                }
                SubRegion::Middle { thickness_right, .. } => {
                    parent.symbolic_max() - thickness_right.clone()
                }
                SubRegion::Right { .. } => parent.symbolic_max(),
            },
        }
    }

    /// Runtime block-size parameter, for block dimensions that have one.
    pub fn size_parameter(&self) -> Option<Symbol> {
        match &self.kind {
            DimensionKind::Block { step, .. } if !step.is_literal() => {
                step.terms.keys().next().copied()
            }
            _ => None,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_hierarchy() {
        let x = Dimension::new("x");
        let b0 = Dimension::block("x0_blk0", &x);
        let inner = Dimension::block_within("x", &b0, Some(SymExpr::int(1)));

        assert_eq!(b0.root(), &x);
        assert_eq!(inner.root(), &x);
        assert_eq!(b0.defines().len(), 2);
        assert_eq!(inner.defines().len(), 3);
        assert_ne!(inner, x);
        assert_eq!(b0.size_parameter(), Some(Symbol::new("x0_blk0_size")));
        assert_eq!(inner.size_parameter(), None);
        assert_eq!(inner.symbolic_min(), SymExpr::symbol("x0_blk0"));
    }

    #[test]
    fn test_sub_bounds() {
        let x = Dimension::new("x");
        let left = Dimension::left("x_lr0", &x, SymExpr::int(2));
        assert_eq!(left.symbolic_min(), SymExpr::symbol("x_m"));
        assert_eq!(left.symbolic_max(), SymExpr::symbol("x_m") + 1);

        let right = Dimension::right("x_rr0", &x, SymExpr::int(2));
        assert_eq!(right.symbolic_min(), SymExpr::symbol("x_M") - 1);

        let mid = Dimension::middle("x_mr0", &x, SymExpr::int(2), SymExpr::int(3));
        assert_eq!(mid.symbolic_min(), SymExpr::symbol("x_m") + 2);
        assert_eq!(mid.symbolic_max(), SymExpr::symbol("x_M") - 3);
        assert!(mid.shares_root(&left));
    }
}
