//! Applies the edits collected during discovery.
//!
//! Edits are byte ranges over the original source. They form a containment
//! tree: an edit nested inside another one is only emitted where the outer
//! replacement embeds that source range through [`Expr::Source`], so nested
//! rewrites compose no matter which one was discovered first.

use super::synth::{print_expr, Expr, Style};
use crate::parser::line_indent;
use crate::{Diagnostic, Location};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::Range;
use tree_sitter::Node;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum Replacement {
    Expr(Expr),
    Text(String),
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub range: Range<usize>,
    pub replacement: Replacement,
    /// Catalog rule (or pass) that produced the edit
    pub rule: &'static str,
}

impl Edit {
    fn is_insert(&self) -> bool {
        self.range.is_empty()
    }
}

/// Text produced by applying an [`EditSet`]
#[derive(Debug, Default)]
pub struct Applied {
    pub output: String,
    /// Count of emitted edits per rule
    pub rewrites: BTreeMap<String, usize>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Edits collected for one file, in discovery order
#[derive(Debug, Default)]
pub struct EditSet {
    edits: Vec<Edit>,
}

impl EditSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    pub fn replace(&mut self, node: Node, expr: Expr, rule: &'static str) {
        self.push(Edit {
            range: node.start_byte()..node.end_byte(),
            replacement: Replacement::Expr(expr),
            rule,
        });
    }

    pub fn replace_text(&mut self, range: Range<usize>, text: impl Into<String>, rule: &'static str) {
        self.push(Edit {
            range,
            replacement: Replacement::Text(text.into()),
            rule,
        });
    }

    pub fn insert(&mut self, at: usize, text: impl Into<String>, rule: &'static str) {
        self.replace_text(at..at, text, rule);
    }

    pub fn delete(&mut self, range: Range<usize>, rule: &'static str) {
        self.push(Edit {
            range,
            replacement: Replacement::Delete,
            rule,
        });
    }

    /// Delete a statement, taking its whole line when it stands alone
    pub fn delete_statement(&mut self, node: Node, source: &str, rule: &'static str) {
        self.delete(statement_range(node, source), rule);
    }

    /// True if some non-empty edit already covers `range`
    pub fn covers(&self, range: &Range<usize>) -> bool {
        self.edits
            .iter()
            .any(|e| !e.is_insert() && e.range.start <= range.start && range.end <= e.range.end)
    }

    /// Apply every edit to `source`.
    ///
    /// Partially overlapping edits conflict; the one discovered later is
    /// dropped and reported.
    pub fn apply(mut self, source: &str, style: &Style) -> Applied {
        self.separate_blank_overlaps(source);
        let mut order: Vec<usize> = (0..self.edits.len()).collect();
        order.sort_by_key(|&i| {
            let e = &self.edits[i];
            (
                e.range.start,
                !e.is_insert(),
                std::cmp::Reverse(e.range.end),
                i,
            )
        });

        let mut diagnostics = Vec::new();
        let mut roots = Vec::new();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.edits.len()];
        let mut stack: Vec<usize> = Vec::new();

        for i in order {
            let edit = &self.edits[i];
            while let Some(&top) = stack.last() {
                let open = &self.edits[top].range;
                let inside = if edit.is_insert() {
                    open.start < edit.range.start && edit.range.start < open.end
                } else {
                    edit.range.start < open.end
                };
                if inside {
                    break;
                }
                stack.pop();
            }

            match stack.last() {
                Some(&top) if !edit.is_insert() && edit.range.end > self.edits[top].range.end => {
                    let location = location_at(source, edit.range.start);
                    debug!(rule = edit.rule, ?location, "dropping overlapping edit");
                    diagnostics.push(Diagnostic::warning(
                        format!(
                            "rewrite '{}' overlaps rewrite '{}'; left unchanged",
                            edit.rule, self.edits[top].rule
                        ),
                        location,
                    ));
                    continue;
                }
                Some(&top) => children[top].push(i),
                None => roots.push(i),
            }
            if !edit.is_insert() {
                stack.push(i);
            }
        }

        let renderer = Renderer {
            source,
            style,
            edits: &self.edits,
            children: &children,
            emitted: RefCell::new(vec![false; self.edits.len()]),
        };
        let output = renderer.render_range(0..source.len(), &roots);

        let mut rewrites = BTreeMap::new();
        for (edit, emitted) in self.edits.iter().zip(renderer.emitted.into_inner()) {
            if emitted {
                *rewrites.entry(edit.rule.to_string()).or_insert(0) += 1;
            }
        }

        Applied {
            output,
            rewrites,
            diagnostics,
        }
    }
}

impl EditSet {
    /// Neighbouring statement deletions may both claim the blanks between
    /// them; the earlier one gives them up
    fn separate_blank_overlaps(&mut self, source: &str) {
        let mut deletions: Vec<usize> = (0..self.edits.len())
            .filter(|&i| self.edits[i].replacement == Replacement::Delete)
            .collect();
        deletions.sort_by_key(|&i| self.edits[i].range.start);
        for pair in deletions.windows(2) {
            let next = self.edits[pair[1]].range.clone();
            let previous = self.edits[pair[0]].range.clone();
            let shared = previous.start < next.start
                && next.start < previous.end
                && previous.end < next.end
                && source[next.start..previous.end].trim().is_empty();
            if !shared {
                continue;
            }
            let mut start = previous.start;
            // `x(); a(); b();` losing both tail statements keeps `x();`
            let kept = source[..start].trim_end_matches([' ', '\t']).len();
            let free = !self
                .edits
                .iter()
                .any(|e| e.range.start < start && kept < e.range.end);
            let mid_line = kept > 0 && !source[..kept].ends_with('\n');
            if line_ends_at(source, next.end) && mid_line && free {
                start = kept;
            }
            self.edits[pair[0]].range = start..next.start;
        }
    }
}

struct Renderer<'a> {
    source: &'a str,
    style: &'a Style,
    edits: &'a [Edit],
    children: &'a [Vec<usize>],
    emitted: RefCell<Vec<bool>>,
}

impl Renderer<'_> {
    /// Copy `range` from the source, splicing in the given edits
    fn render_range(&self, range: Range<usize>, edits: &[usize]) -> String {
        let mut out = String::with_capacity(range.len());
        let mut pos = range.start;
        for &i in edits {
            let edit = &self.edits[i];
            let inside = range.start <= edit.range.start && edit.range.end <= range.end;
            if !inside || edit.range.start < pos {
                continue;
            }
            out.push_str(&self.source[pos..edit.range.start]);
            out.push_str(&self.render_edit(i));
            pos = edit.range.end;
        }
        out.push_str(&self.source[pos..range.end]);
        out
    }

    fn render_edit(&self, i: usize) -> String {
        self.emitted.borrow_mut()[i] = true;
        let edit = &self.edits[i];
        match &edit.replacement {
            Replacement::Delete => String::new(),
            Replacement::Text(text) => text.clone(),
            Replacement::Expr(expr) => {
                let nested = &self.children[i];
                let indent = line_indent(self.source, edit.range.start);
                print_expr(expr, self.style, indent, &|r| self.render_range(r, nested))
            }
        }
    }
}

/// Byte range deleted for a statement: its whole line when nothing else
/// shares it, otherwise the statement plus the blanks separating it from its
/// neighbours on the line
pub fn statement_range(node: Node, source: &str) -> Range<usize> {
    blank_range(node.start_byte(), node.end_byte(), source)
}

fn blank_range(start: usize, end: usize, source: &str) -> Range<usize> {
    let line_start = source[..start].rfind('\n').map_or(0, |i| i + 1);
    let rest = &source[end..];
    let after = end + (rest.len() - rest.trim_start_matches([' ', '\t']).len());
    let tail = &source[after..];
    let line_ends = line_ends_at(source, after);

    let before = &source[line_start..start];
    if !before.trim().is_empty() {
        // `a(); b();` keeps `a();`, `{ b(); }` keeps `{ }`
        let blank_start = line_start + before.trim_end_matches([' ', '\t']).len();
        return if line_ends { blank_start..after } else { start..after };
    }
    if tail.starts_with("\r\n") {
        line_start..after + 2
    } else if tail.starts_with('\n') {
        line_start..after + 1
    } else if tail.is_empty() {
        line_start..after
    } else {
        start..after
    }
}

fn line_ends_at(source: &str, offset: usize) -> bool {
    let tail = &source[offset..];
    tail.is_empty() || tail.starts_with('\n') || tail.starts_with("\r\n")
}

/// 1-indexed location of a byte offset
pub fn location_at(source: &str, byte: usize) -> Location {
    let byte = byte.min(source.len());
    let before = &source[..byte];
    let line = before.matches('\n').count() + 1;
    let column = byte - before.rfind('\n').map_or(0, |i| i + 1) + 1;
    Location::new(line, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn source_expr(range: Range<usize>) -> Expr {
        Expr::Source { range, prec: 20 }
    }

    #[test]
    fn applies_disjoint_edits_in_any_order() {
        let source = "aaa bbb ccc";
        let mut edits = EditSet::new();
        edits.replace_text(8..11, "C", "c");
        edits.replace_text(0..3, "A", "a");
        let applied = edits.apply(source, &Style::default());
        assert_eq!(applied.output, "A bbb C");
        assert_eq!(applied.rewrites.len(), 2);
    }

    #[test]
    fn nested_edit_renders_inside_embedded_source() {
        // outer: f(x.y) -> g(<x.y>), inner: x.y -> z
        let source = "f(x.y);";
        let mut edits = EditSet::new();
        edits.push(Edit {
            range: 2..5,
            replacement: Replacement::Text("z".into()),
            rule: "inner",
        });
        edits.push(Edit {
            range: 0..6,
            replacement: Replacement::Expr(Expr::call("g", vec![source_expr(2..5)])),
            rule: "outer",
        });
        let applied = edits.apply(source, &Style::default());
        assert_eq!(applied.output, "g(z);");
        assert_eq!(applied.rewrites.get("inner"), Some(&1));
    }

    #[test]
    fn nested_edit_outside_embedded_source_is_dropped() {
        let source = "f(x, y);";
        let mut edits = EditSet::new();
        edits.replace_text(5..6, "Y", "inner");
        edits.push(Edit {
            range: 0..7,
            replacement: Replacement::Expr(Expr::call("g", vec![source_expr(2..3)])),
            rule: "outer",
        });
        let applied = edits.apply(source, &Style::default());
        assert_eq!(applied.output, "g(x);");
        assert!(!applied.rewrites.contains_key("inner"));
    }

    #[test]
    fn partial_overlap_drops_later_edit() {
        let source = "abcdef";
        let mut edits = EditSet::new();
        edits.replace_text(0..4, "X", "first");
        edits.replace_text(2..6, "Y", "second");
        let applied = edits.apply(source, &Style::default());
        assert_eq!(applied.output, "Xef");
        assert_eq!(applied.diagnostics.len(), 1);
    }

    #[test]
    fn insert_precedes_deletion_at_same_offset() {
        let source = "import a from 'a';\nrest();\n";
        let mut edits = EditSet::new();
        edits.delete(0..19, "remove");
        edits.insert(0, "import b from 'b';\n", "insert");
        let applied = edits.apply(source, &Style::default());
        assert_eq!(applied.output, "import b from 'b';\nrest();\n");
    }

    #[test]
    fn mid_line_deletion_leaves_no_stray_blanks() {
        let cut = |source: &str, needle: &str| {
            let start = source.find(needle).unwrap();
            let range = blank_range(start, start + needle.len(), source);
            format!("{}{}", &source[..range.start], &source[range.end..])
        };
        assert_eq!(cut("{ a(); }", "a();"), "{ }");
        assert_eq!(cut("a(); b();\nc();", "b();"), "a();\nc();");
        assert_eq!(cut("  a();\nb();", "a();"), "b();");
    }

    #[test]
    fn neighbouring_deletions_share_blanks_without_conflict() {
        let source = "x(); a(); b();\n";
        let mut edits = EditSet::new();
        let a = source.find("a();").unwrap();
        let b = source.find("b();").unwrap();
        edits.delete(blank_range(a, a + 4, source), "first");
        edits.delete(blank_range(b, b + 4, source), "second");
        let applied = edits.apply(source, &Style::default());
        assert_eq!(applied.output, "x();\n");
        assert!(applied.diagnostics.is_empty());
    }

    #[test]
    fn location_is_one_indexed() {
        let loc = location_at("ab\ncd", 4);
        assert_eq!((loc.line, loc.column), (2, 2));
    }
}
