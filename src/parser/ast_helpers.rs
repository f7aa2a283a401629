//! Shared AST helpers for the rewriter.
//!
//! Small read-only queries over tree-sitter nodes so rules and passes don't
//! re-implement text extraction, literal decoding or registration detection.

use crate::Location;
use tree_sitter::Node;

/// Names that register a test case
pub const TEST_CASE_NAMES: &[&str] = &["it", "test", "specify", "xit", "xspecify", "xtest"];

/// Names that register a suite
pub const SUITE_NAMES: &[&str] = &["describe", "context", "suite", "xdescribe", "xcontext"];

/// Lifecycle hooks shared by mocha and node:test
pub const HOOK_NAMES: &[&str] = &["before", "after", "beforeEach", "afterEach"];

/// Source text of a node (empty on invalid UTF-8 boundaries)
pub fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// Convert a tree-sitter Node to Location.
pub fn node_to_location(node: Node) -> Location {
    Location::new(
        node.start_position().row + 1,
        node.start_position().column + 1,
    )
    .with_end(node.end_position().row + 1, node.end_position().column + 1)
}

/// Value of a string literal or a template literal without substitutions.
///
/// Escape sequences are kept as written.
pub fn string_literal_value(node: Node, source: &str) -> Option<String> {
    match node.kind() {
        "string" => {
            let text = node_text(node, source);
            (text.len() >= 2).then(|| text[1..text.len() - 1].to_string())
        }
        "template_string" => {
            let mut cursor = node.walk();
            let has_substitution = node
                .named_children(&mut cursor)
                .any(|c| c.kind() == "template_substitution");
            if has_substitution {
                return None;
            }
            let text = node_text(node, source);
            (text.len() >= 2).then(|| text[1..text.len() - 1].to_string())
        }
        _ => None,
    }
}

/// Strip any number of wrapping parentheses
pub fn unwrap_parens(mut node: Node) -> Node {
    while node.kind() == "parenthesized_expression" {
        let mut cursor = node.walk();
        let inner = node
            .named_children(&mut cursor)
            .find(|c| c.kind() != "comment");
        match inner {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// Named, non-comment children of an `arguments` node
pub fn argument_nodes(arguments: Node) -> Vec<Node> {
    let mut cursor = arguments.walk();
    arguments
        .named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

/// Arguments of a call expression (empty for tagged templates)
pub fn call_arguments(call: Node) -> Vec<Node> {
    match call.child_by_field_name("arguments") {
        Some(args) if args.kind() == "arguments" => argument_nodes(args),
        _ => Vec::new(),
    }
}

/// Registration callee of a call: `it(...)` -> ("it", None), `it.only(...)` -> ("it", Some("only")).
pub fn registration_callee<'a>(call: Node, source: &'a str) -> Option<(&'a str, Option<&'a str>)> {
    if call.kind() != "call_expression" {
        return None;
    }
    let function = call.child_by_field_name("function")?;
    let (base, modifier) = match function.kind() {
        "identifier" => (node_text(function, source), None),
        "member_expression" => {
            let object = function.child_by_field_name("object")?;
            let property = function.child_by_field_name("property")?;
            if object.kind() != "identifier" {
                return None;
            }
            let modifier = node_text(property, source);
            if !matches!(modifier, "only" | "skip" | "todo") {
                return None;
            }
            (node_text(object, source), Some(modifier))
        }
        _ => return None,
    };
    let known = TEST_CASE_NAMES.contains(&base)
        || SUITE_NAMES.contains(&base)
        || HOOK_NAMES.contains(&base);
    known.then_some((base, modifier))
}

/// True if the node is a function literal (arrow or `function` expression)
pub fn is_function_literal(node: Node) -> bool {
    matches!(
        node.kind(),
        "arrow_function" | "function_expression" | "function"
    )
}

/// Parameter nodes of a function literal.
///
/// A bare arrow parameter (`done => ...`) is returned as its single parameter.
pub fn function_parameters(function: Node) -> Vec<Node> {
    if let Some(single) = function.child_by_field_name("parameter") {
        return vec![single];
    }
    match function.child_by_field_name("parameters") {
        Some(params) => {
            let mut cursor = params.walk();
            params
                .named_children(&mut cursor)
                .filter(|c| c.kind() != "comment")
                .collect()
        }
        None => Vec::new(),
    }
}

/// Name bound by a parameter node (`done`, `done: Function`, ...)
pub fn parameter_name<'a>(param: Node, source: &'a str) -> Option<&'a str> {
    match param.kind() {
        "identifier" => Some(node_text(param, source)),
        "required_parameter" | "optional_parameter" => {
            let pattern = param.child_by_field_name("pattern")?;
            (pattern.kind() == "identifier").then(|| node_text(pattern, source))
        }
        _ => None,
    }
}

/// Statement nodes directly inside a function body (empty for expression bodies)
pub fn body_statements(function: Node) -> Vec<Node> {
    match function.child_by_field_name("body") {
        Some(body) if body.kind() == "statement_block" => {
            let mut cursor = body.walk();
            body.named_children(&mut cursor)
                .filter(|c| c.kind() != "comment")
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Walk every named descendant in pre-order
pub fn visit_named<'t>(node: Node<'t>, f: &mut dyn FnMut(Node<'t>)) {
    f(node);
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        visit_named(child, f);
    }
}

/// Whitespace prefix of the line containing `byte`
pub fn line_indent(source: &str, byte: usize) -> &str {
    let byte = byte.min(source.len());
    let line_start = source[..byte].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let rest = &source[line_start..];
    let width = rest
        .find(|c: char| c != ' ' && c != '\t')
        .unwrap_or(rest.len());
    &rest[..width]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::TypeScriptParser;

    #[test]
    fn decodes_string_and_plain_template() {
        let source = "f('a b', `c`, `d${e}`);";
        let mut parser = TypeScriptParser::new().unwrap();
        let tree = parser.parse(source).unwrap();
        let mut call = None;
        visit_named(tree.root_node(), &mut |n| {
            if call.is_none() && n.kind() == "call_expression" {
                call = Some(n);
            }
        });
        let args = call_arguments(call.unwrap());
        assert_eq!(string_literal_value(args[0], source).as_deref(), Some("a b"));
        assert_eq!(string_literal_value(args[1], source).as_deref(), Some("c"));
        assert_eq!(string_literal_value(args[2], source), None);
    }

    #[test]
    fn recognizes_focused_registration() {
        let source = "it.only('works', () => {});";
        let mut parser = TypeScriptParser::new().unwrap();
        let tree = parser.parse(source).unwrap();
        let mut callee = None;
        visit_named(tree.root_node(), &mut |n| {
            if callee.is_none() {
                callee = registration_callee(n, source);
            }
        });
        assert_eq!(callee, Some(("it", Some("only"))));
    }

    #[test]
    fn line_indent_reads_leading_whitespace() {
        let source = "a\n    b();\n";
        assert_eq!(line_indent(source, 6), "    ");
        assert_eq!(line_indent(source, 0), "");
    }
}
