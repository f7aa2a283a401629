//! Scope/key resolution for stub configurations.
//!
//! Configurations merge only when they target the same member of the same
//! object inside the same test case. Hooks carry no name and pass through to
//! the enclosing suite.

use crate::parser::{
    call_arguments, registration_callee, string_literal_value, SUITE_NAMES, TEST_CASE_NAMES,
};
use std::fmt;
use std::ops::Range;
use tree_sitter::Node;

/// Grouping key for stub configuration chains
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    /// Mocked object text (`api`) or stub variable name
    pub subject: String,
    /// Mocked member name; empty for anonymous fakes
    pub member: String,
    /// Name of the enclosing test case or suite; empty at module scope
    pub test_name: String,
    /// Start byte of the enclosing registration call (0 at module scope)
    pub anchor: usize,
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.member.is_empty() {
            write!(f, "{}", self.subject)?;
        } else {
            write!(f, "{}.{}", self.subject, self.member)?;
        }
        if self.test_name.is_empty() {
            write!(f, " (module scope)")
        } else {
            write!(f, " in '{}'", self.test_name)
        }
    }
}

/// Nearest enclosing named registration call of `node`, with its name
pub fn enclosing_registration<'t>(node: Node<'t>, source: &str) -> Option<(Node<'t>, String)> {
    let mut current = node.parent();
    while let Some(candidate) = current {
        if let Some((base, _)) = registration_callee(candidate, source) {
            let named = TEST_CASE_NAMES.contains(&base) || SUITE_NAMES.contains(&base);
            let title = call_arguments(candidate)
                .first()
                .and_then(|first| string_literal_value(*first, source));
            if let (true, Some(title)) = (named, title) {
                return Some((candidate, title));
            }
        }
        current = candidate.parent();
    }
    None
}

/// Key for a configuration chain at `node`. Recomputed per occurrence.
pub fn resolve_key(node: Node, subject: &str, member: &str, source: &str) -> ScopeKey {
    let (test_name, anchor) = match enclosing_registration(node, source) {
        Some((call, title)) => (title, call.start_byte()),
        None => (String::new(), 0),
    };
    ScopeKey {
        subject: subject.to_string(),
        member: member.to_string(),
        test_name,
        anchor,
    }
}

/// Byte range of the registration call a key at `node` belongs to; the whole
/// file at module scope
pub fn scope_range(node: Node, source: &str) -> Range<usize> {
    enclosing_registration(node, source)
        .map_or(0..source.len(), |(call, _)| call.start_byte()..call.end_byte())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{node_text, visit_named, TypeScriptParser};

    fn keys_for(source: &str, needle: &str) -> Vec<ScopeKey> {
        let mut parser = TypeScriptParser::new().unwrap();
        let tree = parser.parse(source).unwrap();
        let mut keys = Vec::new();
        visit_named(tree.root_node(), &mut |n| {
            if n.kind() == "call_expression" && node_text(n, source) == needle {
                keys.push(resolve_key(n, "api", "get", source));
            }
        });
        keys
    }

    #[test]
    fn same_member_in_different_tests_gets_different_keys() {
        let source = r#"
describe('client', function () {
  it('a', function () { stub(); });
  it('b', function () { stub(); });
});
"#;
        let keys = keys_for(source, "stub()");
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].test_name, "a");
        assert_eq!(keys[1].test_name, "b");
        assert_ne!(keys[0], keys[1]);
    }

    #[test]
    fn hooks_pass_through_to_suite() {
        let source = "describe('client', () => { beforeEach(() => { stub(); }); });";
        let keys = keys_for(source, "stub()");
        assert_eq!(keys[0].test_name, "client");
    }

    #[test]
    fn module_scope_has_empty_name() {
        let keys = keys_for("stub();", "stub()");
        assert_eq!(keys[0].test_name, "");
        assert_eq!(keys[0].anchor, 0);
        assert_eq!(keys[0].to_string(), "api.get (module scope)");
    }

    #[test]
    fn duplicate_titles_do_not_share_a_key() {
        let source = "it('x', () => { stub(); });\nit('x', () => { stub(); });";
        let keys = keys_for(source, "stub()");
        assert_ne!(keys[0], keys[1]);
    }
}
