//! Pretty printing utilities for Clusters and generated loop nests.

use crate::ir::{Cluster, Properties};
use pretty::{BoxAllocator, DocAllocator, DocBuilder};
use std::fmt;

/// Default line width for pretty printing.
pub const DEFAULT_WIDTH: usize = 80;

/// A pretty-printable value.
pub trait PrettyPrint {
    /// Convert to a pretty document.
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D>;

    /// Pretty print to a string with the given width.
    fn pretty_print(&self, width: usize) -> String {
        let allocator = BoxAllocator;
        let doc = self.to_doc(&allocator);
        let mut output = String::new();
        doc.render_fmt(width, &mut output).map(|_| output).unwrap_or_default()
    }

    /// Pretty print with default width.
    fn pretty(&self) -> String {
        self.pretty_print(DEFAULT_WIDTH)
    }
}

/// `{a: {..}, b: {..}}`, broken one entry per line when too wide.
fn properties_doc<'a, D: DocAllocator<'a>>(
    props: &Properties,
    allocator: &'a D,
) -> DocBuilder<'a, D> {
    let entries = props.iter().enumerate().fold(allocator.nil(), |acc, (i, (d, tags))| {
        let tags: Vec<String> = tags.iter().map(|p| p.to_string()).collect();
        let entry = allocator.text(format!("{}: {{{}}}", d, tags.join(", ")));
        if i == 0 {
            acc.append(entry)
        } else {
            acc.append(allocator.text(",")).append(allocator.line()).append(entry)
        }
    });
    allocator
        .text("{")
        .append(allocator.line_().append(entries).nest(2))
        .append(allocator.line_())
        .append(allocator.text("}"))
        .group()
}

impl PrettyPrint for Cluster {
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D> {
        let body = self.exprs.iter().fold(allocator.nil(), |acc, e| {
            acc.append(allocator.hardline()).append(allocator.text(e.to_string()))
        });
        let props = allocator
            .hardline()
            .append(allocator.text("properties "))
            .append(properties_doc(&self.properties, allocator));
        allocator
            .text(format!("Cluster {}", self.ispace))
            .append(props.append(body).nest(2))
    }
}

impl PrettyPrint for [Cluster] {
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D> {
        self.iter().enumerate().fold(allocator.nil(), |acc, (i, c)| {
            let sep = if i == 0 {
                allocator.nil()
            } else {
                allocator.hardline().append(allocator.hardline())
            };
            acc.append(sep).append(c.to_doc(allocator))
        })
    }
}

/// A simple code formatter for generated code.
#[derive(Debug)]
pub struct CodeFormatter {
    output: String,
    indent_level: usize,
    indent_str: String,
    at_line_start: bool,
}

impl CodeFormatter {
    /// Create a new formatter with the given indent string.
    pub fn new(indent_str: &str) -> Self {
        Self {
            output: String::new(),
            indent_level: 0,
            indent_str: indent_str.to_string(),
            at_line_start: true,
        }
    }

    /// Create a formatter with default settings (2 spaces).
    pub fn default_indent() -> Self {
        Self::new("  ")
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }

    /// Write text, indenting at the start of each line.
    pub fn write(&mut self, s: &str) {
        for c in s.chars() {
            if c == '\n' {
                self.output.push('\n');
                self.at_line_start = true;
            } else {
                if self.at_line_start {
                    for _ in 0..self.indent_level {
                        self.output.push_str(&self.indent_str);
                    }
                    self.at_line_start = false;
                }
                self.output.push(c);
            }
        }
    }

    pub fn writeln(&mut self, s: &str) {
        self.write(s);
        self.write("\n");
    }

    /// Get the formatted output.
    pub fn finish(self) -> String {
        self.output
    }
}

/// Format a list with separators.
pub fn format_list<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        Access, DataSpace, Dimension, Expr, Interval, IntervalGroup, IterationSpace, LoweredEq,
        Property,
    };
    use crate::symbolic::SymExpr;

    fn sample() -> Cluster {
        let ig = IntervalGroup::from_intervals(vec![
            Interval::new(Dimension::new("t"), 0, 0),
            Interval::new(Dimension::new("x"), -1, 1),
        ]);
        let eq = LoweredEq::new(
            Access::new("v", vec![SymExpr::symbol("x")]),
            Expr::Access(Access::new("u", vec![SymExpr::symbol("x") + 1])),
            IterationSpace::from_intervals(ig),
            DataSpace::default(),
        );
        let props = Properties::new()
            .with(&Dimension::new("t"), [Property::Sequential])
            .with(&Dimension::new("x"), [Property::Parallel, Property::Tilable]);
        Cluster::from_eq(eq, props)
    }

    #[test]
    fn test_cluster_pretty() {
        let text = sample().pretty();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Cluster ["));
        assert!(lines[1].starts_with("  properties {t: {SEQUENTIAL}, x: {"));
        assert_eq!(lines[2], "  v[x] = u[x + 1]");
    }

    #[test]
    fn test_narrow_width_breaks_properties() {
        let text = sample().pretty_print(20);
        assert!(text.lines().any(|l| l.trim() == "t: {SEQUENTIAL},"));
    }

    #[test]
    fn test_cluster_list_separated_by_blank_line() {
        let clusters = vec![sample(), sample()];
        let text = clusters.as_slice().pretty();
        assert_eq!(text.matches("Cluster [").count(), 2);
        assert!(text.contains("\n\nCluster ["));
    }

    #[test]
    fn test_code_formatter() {
        let mut fmt = CodeFormatter::default_indent();
        fmt.writeln("int main() {");
        fmt.indent();
        fmt.writeln("printf(\"Hello\");");
        fmt.writeln("return 0;");
        fmt.dedent();
        fmt.writeln("}");

        let output = fmt.finish();
        assert!(output.contains("  printf"));
        assert!(output.contains("  return"));
    }

    #[test]
    fn test_format_list() {
        assert_eq!(format_list(&[1, 2, 3], ", "), "1, 2, 3");
    }
}
