//! Chain walker: flattens member/call chains into ordered steps.
//!
//! `expect(x).to.not.equal(5)` becomes subject `expect(x)` with steps
//! `to`, `not`, `equal(5)`. The walker only reads nodes.

use crate::parser::{argument_nodes, node_text};
use tree_sitter::Node;

/// One link of a chain: a property access or a method call
#[derive(Debug, Clone)]
pub struct Step<'t> {
    pub name: String,
    /// `None` for a plain property access, `Some` for a call
    pub arguments: Option<Vec<Node<'t>>>,
    /// The member expression (property access) or call expression (call)
    pub site: Node<'t>,
}

impl<'t> Step<'t> {
    pub fn is_call(&self) -> bool {
        self.arguments.is_some()
    }

    pub fn args(&self) -> &[Node<'t>] {
        self.arguments.as_deref().unwrap_or(&[])
    }
}

/// A flattened chain in source order
#[derive(Debug, Clone)]
pub struct Chain<'t> {
    pub steps: Vec<Step<'t>>,
    /// Innermost node that is not itself a step
    pub subject: Node<'t>,
    /// Outermost node the chain was walked from
    pub root: Node<'t>,
}

impl<'t> Chain<'t> {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name.as_str())
    }

    pub fn last(&self) -> Option<&Step<'t>> {
        self.steps.last()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    /// True if the subject is the identifier `name`
    pub fn subject_is(&self, name: &str, source: &str) -> bool {
        self.subject.kind() == "identifier" && node_text(self.subject, source) == name
    }
}

/// Flatten the chain ending at `node`.
///
/// A node without chain structure yields a chain with no steps whose subject
/// is the node itself.
pub fn walk<'t>(node: Node<'t>, source: &str) -> Chain<'t> {
    let mut steps = Vec::new();
    let mut current = node;
    loop {
        match current.kind() {
            "call_expression" => {
                let Some(function) = current.child_by_field_name("function") else {
                    break;
                };
                if function.kind() != "member_expression" {
                    break;
                }
                let Some(property) = function.child_by_field_name("property") else {
                    break;
                };
                let Some(object) = function.child_by_field_name("object") else {
                    break;
                };
                let arguments = match current.child_by_field_name("arguments") {
                    Some(args) if args.kind() == "arguments" => argument_nodes(args),
                    _ => break,
                };
                steps.push(Step {
                    name: node_text(property, source).to_string(),
                    arguments: Some(arguments),
                    site: current,
                });
                current = object;
            }
            "member_expression" => {
                let (Some(property), Some(object)) = (
                    current.child_by_field_name("property"),
                    current.child_by_field_name("object"),
                ) else {
                    break;
                };
                steps.push(Step {
                    name: node_text(property, source).to_string(),
                    arguments: None,
                    site: current,
                });
                current = object;
            }
            _ => break,
        }
    }
    steps.reverse();
    Chain {
        steps,
        subject: current,
        root: node,
    }
}

/// True if `parent` continues the chain that `child` belongs to
fn extends_chain(parent: Node, child: Node) -> bool {
    match parent.kind() {
        "member_expression" => parent
            .child_by_field_name("object")
            .is_some_and(|o| o.id() == child.id()),
        "call_expression" => {
            child.kind() == "member_expression"
                && parent
                    .child_by_field_name("function")
                    .is_some_and(|f| f.id() == child.id())
        }
        _ => false,
    }
}

/// Climb to the outermost node of the chain containing `node`
pub fn outermost(node: Node) -> Node {
    let mut current = node;
    while let Some(parent) = current.parent() {
        if !extends_chain(parent, current) {
            break;
        }
        current = parent;
    }
    current
}

/// Walk the full chain `node` belongs to
pub fn walk_from<'t>(node: Node<'t>, source: &str) -> Chain<'t> {
    walk(outermost(node), source)
}

/// True if nothing above `node` continues its chain
pub fn is_chain_root(node: Node) -> bool {
    match node.parent() {
        Some(parent) => !extends_chain(parent, node),
        None => true,
    }
}
