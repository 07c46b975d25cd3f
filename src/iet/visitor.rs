//! Visitors over the Iteration/Expression Tree.

use crate::iet::nodes::{Call, Callable, ExpressionBundle, Iteration, Node};
use crate::ir::Direction;
use crate::utils::pretty::{format_list, CodeFormatter};

/// Visitor trait for traversing the tree.
///
/// Every method defaults to visiting the children, so a visitor only
/// overrides the node kinds it cares about.
pub trait Visitor<'a> {
    /// Dispatch on the node kind.
    fn visit(&mut self, node: &'a Node) {
        match node {
            Node::Iteration(i) => self.visit_iteration(i),
            Node::ExpressionBundle(b) => self.visit_expression_bundle(b),
            Node::Call(c) => self.visit_call(c),
            Node::List(nodes) => self.visit_list(nodes),
            Node::Callable(c) => self.visit_callable(c),
        }
    }

    fn visit_iteration(&mut self, iteration: &'a Iteration) {
        for node in &iteration.body {
            self.visit(node);
        }
    }

    fn visit_expression_bundle(&mut self, _bundle: &'a ExpressionBundle) {}

    fn visit_call(&mut self, _call: &'a Call) {}

    fn visit_list(&mut self, nodes: &'a [Node]) {
        for node in nodes {
            self.visit(node);
        }
    }

    fn visit_callable(&mut self, callable: &'a Callable) {
        for node in &callable.body {
            self.visit(node);
        }
    }
}

/// Collect every `Iteration`, outermost first.
#[derive(Debug, Default)]
pub struct FindIterations<'a> {
    pub found: Vec<&'a Iteration>,
}

impl<'a> FindIterations<'a> {
    pub fn new() -> Self {
        Self { found: Vec::new() }
    }

    /// Run over `node` and return what was found.
    pub fn find(mut self, node: &'a Node) -> Vec<&'a Iteration> {
        self.visit(node);
        self.found
    }
}

impl<'a> Visitor<'a> for FindIterations<'a> {
    fn visit_iteration(&mut self, iteration: &'a Iteration) {
        self.found.push(iteration);
        for node in &iteration.body {
            self.visit(node);
        }
    }
}

/// Print the tree as a C-like loop nest.
///
/// The outermost parallel loop of each nest gets an OpenMP pragma.
pub struct Renderer {
    out: CodeFormatter,
    parallel_depth: usize,
}

impl Renderer {
    pub fn new() -> Self {
        Self { out: CodeFormatter::default_indent(), parallel_depth: 0 }
    }

    pub fn render(mut self, node: &Node) -> String {
        self.visit(node);
        self.out.finish()
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Visitor<'a> for Renderer {
    fn visit_iteration(&mut self, it: &'a Iteration) {
        let parallel = it.is_parallel() && self.parallel_depth == 0;
        if parallel {
            self.out.writeln("#pragma omp parallel for");
        }
        let d = &it.dim;
        let header = match it.direction {
            Direction::Forward => format!(
                "for (int {d} = {}; {d} <= {}; {d} += {})",
                it.lower, it.upper, it.step
            ),
            Direction::Backward => format!(
                "for (int {d} = {}; {d} >= {}; {d} -= {})",
                it.upper, it.lower, it.step
            ),
        };
        self.out.write(&header);
        self.out.writeln(" {");
        self.out.indent();
        if parallel {
            self.parallel_depth += 1;
        }
        for node in &it.body {
            self.visit(node);
        }
        if parallel {
            self.parallel_depth -= 1;
        }
        self.out.dedent();
        self.out.writeln("}");
    }

    fn visit_expression_bundle(&mut self, bundle: &'a ExpressionBundle) {
        for eq in &bundle.exprs {
            self.out.writeln(&format!("{};", eq));
        }
    }

    fn visit_call(&mut self, call: &'a Call) {
        self.out.writeln(&format!("{}({});", call.name, format_list(&call.args, ", ")));
    }

    fn visit_callable(&mut self, callable: &'a Callable) {
        let params: Vec<String> =
            callable.parameters.iter().map(|p| format!("const int {}", p)).collect();
        self.out.write(&format!("void {}({})", callable.name, params.join(", ")));
        self.out.writeln(" {");
        self.out.indent();
        for node in &callable.body {
            self.visit(node);
        }
        self.out.dedent();
        self.out.writeln("}");
    }
}
