//! Pattern catalog: ordered rules per migration.
//!
//! Rules are tried in registration order and the first whose `matches`
//! accepts a chain wins, so more specific shapes are registered before
//! general ones.

use super::chain::Chain;
use super::imports::ModuleKind;
use super::rules;
use super::stubs::StubConfig;
use super::synth::Expr;
use crate::Migration;
use std::collections::{HashMap, HashSet};
use tree_sitter::Node;

/// What a rule wants done with the chain it matched
#[derive(Debug)]
pub enum Synthesis<'t> {
    /// Replace `target` (usually the chain root) with a synthesized expression
    Replace { target: Node<'t>, expr: Expr },
    /// Delete a whole statement
    RemoveStatement(Node<'t>),
    /// Delete an assertion-library setup statement, but only if no legacy
    /// assertion is left in the file
    RemoveSetup(Node<'t>),
    /// Delete a declaration once every other use of `binding` is rewritten
    RemoveDeclaration { statement: Node<'t>, binding: String },
    /// Hand a stub configuration chain to the aggregator
    Configure(StubConfig<'t>),
    /// Recognized but not convertible; reported as a diagnostic
    Skip(String),
}

/// Trait for catalog rules
pub trait PatternRule: Send + Sync {
    /// Name of the rule (used in reports)
    fn name(&self) -> &'static str;

    /// Whether the chain has the shape this rule handles
    fn matches(&self, chain: &Chain<'_>, ctx: &RuleContext) -> bool;

    /// Whether the matched chain is a negated form
    fn negated(&self, _chain: &Chain<'_>, _ctx: &RuleContext) -> bool {
        false
    }

    /// Build the replacement. Only called after `matches` returned true.
    fn build<'t>(&self, chain: &Chain<'t>, ctx: &RuleContext) -> Synthesis<'t>;

    /// Target modules the replacement refers to
    fn requires(&self) -> &'static [ModuleKind] {
        &[]
    }
}

/// Local names the rewritten code must use, resolved from the file's imports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Names {
    pub assert: String,
    /// The assert binding comes from `node:assert/strict`, where `equal` is
    /// strict too
    pub assert_strict: bool,
    pub mock: String,
    pub util: String,
    pub sinon: String,
    pub chai: String,
    pub should: String,
    pub expect: String,
}

impl Default for Names {
    fn default() -> Self {
        Self {
            assert: "assert".to_string(),
            assert_strict: false,
            mock: "mock".to_string(),
            util: "isDeepStrictEqual".to_string(),
            sinon: "sinon".to_string(),
            chai: "chai".to_string(),
            should: "should".to_string(),
            expect: "expect".to_string(),
        }
    }
}

/// What a variable bound to a sinon creation refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBinding {
    /// `sinon.stub(obj, 'm')` / `sinon.spy(obj, 'm')`
    Method { object: String, member: String },
    /// `sinon.stub()`, `sinon.spy()`, `sinon.fake()`
    Anonymous,
}

/// Sinon names bound in a file, collected before discovery
#[derive(Debug, Clone, Default)]
pub struct MockBindings {
    /// Sandbox variables (`const sandbox = sinon.createSandbox()`)
    pub sandboxes: HashSet<String>,
    /// Stub and spy variables
    pub stubs: HashMap<String, MockBinding>,
    /// `obj.m` texts of members replaced by a method stub or spy
    pub stubbed_members: HashSet<String>,
}

impl MockBindings {
    /// True if `name` is `sinon` itself or a sandbox
    pub fn is_factory(&self, name: &str, names: &Names) -> bool {
        name == names.sinon || self.sandboxes.contains(name)
    }
}

/// Read-only state shared by every rule for one file
pub struct RuleContext<'a> {
    pub source: &'a str,
    pub names: &'a Names,
    pub mocks: &'a MockBindings,
}

impl<'a> RuleContext<'a> {
    pub fn text(&self, node: Node) -> &'a str {
        crate::parser::node_text(node, self.source)
    }

    /// Embed an original node in a synthesized expression
    pub fn embed(&self, node: Node) -> Expr {
        Expr::source(node, self.source)
    }
}

/// Ordered rules for one migration
pub struct Catalog {
    migration: Migration,
    rules: Vec<Box<dyn PatternRule>>,
}

impl Catalog {
    pub fn for_migration(migration: Migration) -> Self {
        let rules = match migration {
            Migration::Assertions => rules::assertion::catalog(),
            Migration::Mocks => rules::mocks::catalog(),
            Migration::Registration => rules::registration::catalog(),
        };
        Self { migration, rules }
    }

    pub fn migration(&self) -> Migration {
        self.migration
    }

    pub fn rules(&self) -> impl Iterator<Item = &dyn PatternRule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    /// First rule accepting the chain; chains without steps match nothing
    pub fn find_rule(&self, chain: &Chain<'_>, ctx: &RuleContext) -> Option<&dyn PatternRule> {
        if chain.is_empty() {
            return None;
        }
        self.rules().find(|rule| rule.matches(chain, ctx))
    }
}
