//! Stub configuration aggregator.
//!
//! sinon lets one stub be configured by many statements:
//!
//! ```js
//! const get = sinon.stub(api, 'get');
//! get.withArgs(1).returns('one');
//! get.returns('other');
//! ```
//!
//! `node:test` takes a single implementation, so every configuration for one
//! [`ScopeKey`] is collected in source order and merged into one function
//! with a branch per argument matcher and a fallback:
//!
//! ```js
//! const get = mock.method(api, 'get', (...args) => {
//!   if (args.length >= 1 && args[0] === 1) {
//!     return 'one';
//!   }
//!   return 'other';
//! });
//! ```
//!
//! Plans are only turned into edits once discovery has seen the whole file.

use super::applier::{location_at, EditSet};
use super::catalog::RuleContext;
use super::chain::{walk, Step};
use super::imports::ModuleKind;
use super::scope::{resolve_key, scope_range, ScopeKey};
use super::synth::{Expr, Stmt};
use crate::parser::node_text;
use crate::{Diagnostic, Location};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::ops::Range;
use tracing::{debug, warn};
use tree_sitter::Node;

/// Steps that set what a stub does when called
pub const APPLY_STEPS: &[&str] = &[
    "returns",
    "resolves",
    "rejects",
    "throws",
    "callsFake",
    "returnsArg",
];

/// A configuration chain handed over by the mock catalog
#[derive(Debug, Clone)]
pub struct StubConfig<'t> {
    /// Mocked object text, or the variable name for anonymous fakes
    pub subject: String,
    /// Mocked member name; empty for anonymous fakes
    pub member: String,
    /// Mocked object node (creation chains only)
    pub object: Option<Node<'t>>,
    /// Variable the chain is rooted at, if any
    pub binding: Option<String>,
    /// True when the chain starts with `sinon.stub(obj, 'm')` or with a
    /// bound `sinon.stub()`
    pub creation: bool,
    /// Configuration steps after the creation call or the variable
    pub tail: Vec<Step<'t>>,
    /// Outermost node of the chain
    pub root: Node<'t>,
}

/// What a configured stub does
#[derive(Debug, Clone, Copy)]
pub enum StubResult<'t> {
    Returns(Option<Node<'t>>),
    Resolves(Option<Node<'t>>),
    Rejects(Option<Node<'t>>),
    Throws(Option<Node<'t>>),
    CallsFake(Node<'t>),
    ReturnsArg(Node<'t>),
}

impl<'t> StubResult<'t> {
    pub fn parse(step: &Step<'t>) -> Option<Self> {
        if !step.is_call() {
            return None;
        }
        let first = step.args().first().copied();
        let result = match (step.name.as_str(), step.args().len()) {
            ("returns", 0..=1) => StubResult::Returns(first),
            ("resolves", 0..=1) => StubResult::Resolves(first),
            ("rejects", 0..=1) => StubResult::Rejects(first),
            ("throws", 0..=1) => StubResult::Throws(first),
            ("callsFake", 1) => StubResult::CallsFake(first?),
            ("returnsArg", 1) => StubResult::ReturnsArg(first?),
            _ => return None,
        };
        Some(result)
    }

    fn value_or_undefined(node: Option<Node>, ctx: &RuleContext) -> Expr {
        node.map(|n| ctx.embed(n))
            .unwrap_or_else(|| Expr::lit("undefined"))
    }

    fn error(node: Option<Node>, ctx: &RuleContext) -> Expr {
        match node {
            // sinon treats a string as the error name
            Some(n) if n.kind() == "string" => Expr::call(
                "Object.assign",
                vec![
                    Expr::New(Box::new(Expr::ident("Error")), vec![]),
                    Expr::Object(vec![("name".to_string(), ctx.embed(n))]),
                ],
            ),
            Some(n) => ctx.embed(n),
            None => Expr::New(Box::new(Expr::ident("Error")), vec![]),
        }
    }

    /// Value expression for results that can be written as an arrow body
    fn returned(&self, ctx: &RuleContext) -> Option<Expr> {
        Some(match *self {
            StubResult::Returns(v) => Self::value_or_undefined(v, ctx),
            StubResult::Resolves(v) => {
                Expr::call("Promise.resolve", vec![Self::value_or_undefined(v, ctx)])
            }
            StubResult::Rejects(e) => Expr::call("Promise.reject", vec![Self::error(e, ctx)]),
            StubResult::ReturnsArg(n) => Expr::ident("args").index(ctx.embed(n)),
            StubResult::CallsFake(f) => ctx
                .embed(f)
                .invoke(vec![Expr::unary("...", Expr::ident("args"))]),
            StubResult::Throws(_) => return None,
        })
    }

    /// Statement ending a branch of the merged implementation
    pub fn statement(&self, ctx: &RuleContext) -> Stmt {
        match *self {
            StubResult::Throws(e) => Stmt::Throw(Self::error(e, ctx)),
            _ => Stmt::Return(self.returned(ctx)),
        }
    }

    /// Implementation function for a stub with this single behaviour
    pub fn function(&self, ctx: &RuleContext) -> Expr {
        match (*self, self.returned(ctx)) {
            (StubResult::CallsFake(f), _) => ctx.embed(f),
            (StubResult::ReturnsArg(_), Some(body)) => Expr::arrow(&["...args"], body),
            (_, Some(body)) => Expr::arrow(&[], body),
            (_, None) => Expr::ArrowBlock(Vec::new(), vec![self.statement(ctx)]),
        }
    }
}

/// Expected value at one argument position of `withArgs`
#[derive(Debug, Clone, Copy)]
pub enum Matcher<'t> {
    /// `sinon.match.any`
    Any,
    /// Primitive literal compared with `===`
    Strict(Node<'t>),
    /// Anything else compared with `isDeepStrictEqual`
    Deep(Node<'t>),
}

const PRIMITIVE_KINDS: &[&str] = &[
    "string",
    "template_string",
    "number",
    "true",
    "false",
    "null",
    "undefined",
];

impl<'t> Matcher<'t> {
    fn parse(node: Node<'t>, ctx: &RuleContext) -> Result<Self, String> {
        let chain = walk(node, ctx.source);
        if chain.subject_is(&ctx.names.sinon, ctx.source) && chain.position("match") == Some(0) {
            let names: Vec<&str> = chain.names().collect();
            return if names == ["match", "any"] {
                Ok(Matcher::Any)
            } else {
                Err(format!("unsupported matcher `{}`", ctx.text(node)))
            };
        }
        let negative_number = node.kind() == "unary_expression"
            && node
                .child_by_field_name("argument")
                .is_some_and(|a| a.kind() == "number");
        if PRIMITIVE_KINDS.contains(&node.kind()) || negative_number {
            Ok(Matcher::Strict(node))
        } else {
            Ok(Matcher::Deep(node))
        }
    }
}

/// One configuration chain, reduced
#[derive(Debug, Clone)]
pub struct Entry<'t> {
    /// `None` for an unconditional configuration
    pub matchers: Option<Vec<Matcher<'t>>>,
    pub result: StubResult<'t>,
}

impl<'t> Entry<'t> {
    /// Split a configuration tail at its apply step.
    ///
    /// `Ok(None)` for an empty tail (a bare creation).
    pub fn parse(tail: &[Step<'t>], ctx: &RuleContext) -> Result<Option<Self>, String> {
        let (with_args, apply) = match tail {
            [] => return Ok(None),
            [with_args] if with_args.name == "withArgs" => {
                return Err("withArgs(...) without a result".to_string())
            }
            [apply] => (None, apply),
            [with_args, apply] if with_args.name == "withArgs" && with_args.is_call() => {
                (Some(with_args), apply)
            }
            _ => {
                let names: Vec<&str> = tail.iter().map(|s| s.name.as_str()).collect();
                return Err(format!("unrecognized configuration `.{}`", names.join(".")));
            }
        };
        let result = StubResult::parse(apply)
            .ok_or_else(|| format!("unrecognized configuration `.{}()`", apply.name))?;
        let matchers = match with_args {
            Some(step) if !step.args().is_empty() => Some(
                step.args()
                    .iter()
                    .map(|arg| Matcher::parse(*arg, ctx))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            _ => None,
        };
        Ok(Some(Entry { matchers, result }))
    }

    /// Source text of the argument matchers; `None` for the default entry
    fn condition_text(&self, source: &str) -> Option<Vec<String>> {
        self.matchers.as_ref().map(|matchers| {
            matchers
                .iter()
                .map(|m| match m {
                    Matcher::Any => "sinon.match.any".to_string(),
                    Matcher::Strict(node) | Matcher::Deep(node) => {
                        node_text(*node, source).to_string()
                    }
                })
                .collect()
        })
    }

    /// `args.length >= n && args[0] === a && ...`
    fn condition(matchers: &[Matcher], ctx: &RuleContext) -> Expr {
        let args = Expr::ident("args");
        let mut condition = args
            .clone()
            .member("length")
            .binary(">=", Expr::lit(matchers.len().to_string()));
        for (i, matcher) in matchers.iter().enumerate() {
            let actual = args.clone().index(Expr::lit(i.to_string()));
            let check = match matcher {
                Matcher::Any => continue,
                Matcher::Strict(node) => actual.binary("===", ctx.embed(*node)),
                Matcher::Deep(node) => {
                    Expr::call(ctx.names.util.as_str(), vec![actual, ctx.embed(*node)])
                }
            };
            condition = condition.binary("&&", check);
        }
        condition
    }
}

/// Merged implementation for a list of entries in source order.
///
/// First matching branch wins; the unconditional entry is the fallback. The
/// aggregator never lets two entries share a condition.
pub fn implementation(entries: &[Entry], ctx: &RuleContext) -> Expr {
    let fallback = entries.iter().find(|e| e.matchers.is_none());
    let conditional: Vec<&Entry> = entries.iter().filter(|e| e.matchers.is_some()).collect();

    if conditional.is_empty() {
        return match fallback {
            Some(entry) => entry.result.function(ctx),
            None => Expr::arrow(&[], Expr::lit("undefined")),
        };
    }

    let mut body: Vec<Stmt> = conditional
        .iter()
        .filter_map(|entry| {
            let matchers = entry.matchers.as_deref()?;
            Some(Stmt::If(
                Entry::condition(matchers, ctx),
                vec![entry.result.statement(ctx)],
            ))
        })
        .collect();
    body.push(match fallback {
        Some(entry) => entry.result.statement(ctx),
        None => Stmt::Return(Some(Expr::lit("undefined"))),
    });
    Expr::ArrowBlock(vec!["...args".to_string()], body)
}

/// Parents under which a configuration statement runs unconditionally once
/// its scope is entered
const FUNCTION_KINDS: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function_declaration",
    "generator_function",
    "generator_function_declaration",
    "method_definition",
];

/// `stub.returns(1);` directly in a function body or at the top level. Not
/// the body of an `if`/loop, and not inside a nested block.
fn is_unconditional_statement(root: Node) -> bool {
    let Some(statement) = root.parent().filter(|p| p.kind() == "expression_statement") else {
        return false;
    };
    match statement.parent() {
        Some(list) if list.kind() == "program" => true,
        Some(list) if list.kind() == "statement_block" => list
            .parent()
            .is_some_and(|f| FUNCTION_KINDS.contains(&f.kind())),
        _ => false,
    }
}

#[derive(Debug)]
struct Plan<'t> {
    /// Creation chain replaced by the merged `mock.method(...)`
    install: Option<Node<'t>>,
    object: Option<Node<'t>>,
    binding: Option<String>,
    entries: Vec<Entry<'t>>,
    /// Roots of configuration chains on a stub variable, in source order
    contributions: Vec<Node<'t>>,
    /// Byte range of the registration call the key belongs to
    scope: Range<usize>,
    skipped: Option<(String, Location)>,
}

impl<'t> Plan<'t> {
    fn new(scope: Range<usize>) -> Self {
        Self {
            install: None,
            object: None,
            binding: None,
            entries: Vec::new(),
            contributions: Vec::new(),
            scope,
            skipped: None,
        }
    }

    /// Reason `entry` cannot join the plan: its condition is already taken
    fn conflict(&self, entry: &Entry, source: &str) -> Option<String> {
        let condition = entry.condition_text(source);
        if !self.entries.iter().any(|e| e.condition_text(source) == condition) {
            return None;
        }
        Some(match condition {
            None => "default behaviour configured more than once".to_string(),
            Some(args) => format!("withArgs({}) configured more than once", args.join(", ")),
        })
    }

    fn encloses(&self, other: &Plan) -> bool {
        self.scope.start <= other.scope.start && other.scope.end <= self.scope.end
    }

    fn skip(&mut self, reason: String, at: Node, source: &str) {
        if self.skipped.is_none() {
            self.skipped = Some((reason, location_at(source, at.start_byte())));
        }
    }

    fn uses_deep_matchers(&self) -> bool {
        self.entries.iter().any(|e| {
            e.matchers
                .iter()
                .flatten()
                .any(|m| matches!(m, Matcher::Deep(_)))
        })
    }
}

/// Result of turning the collected plans into edits
#[derive(Debug, Default)]
pub struct AggregateOutcome {
    pub diagnostics: Vec<Diagnostic>,
    pub requires: BTreeSet<ModuleKind>,
    /// Number of keys that produced an install edit
    pub installed: usize,
}

/// Collects configuration chains per [`ScopeKey`] in insertion order
#[derive(Debug, Default)]
pub struct Aggregator<'t> {
    plans: IndexMap<ScopeKey, Plan<'t>>,
}

impl<'t> Aggregator<'t> {
    pub fn new() -> Self {
        Self {
            plans: IndexMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ScopeKey> {
        self.plans.keys()
    }

    /// Record one configuration chain; chains must arrive in source order
    pub fn add(&mut self, config: StubConfig<'t>, ctx: &RuleContext) {
        let key = resolve_key(config.root, &config.subject, &config.member, ctx.source);
        let plan = self
            .plans
            .entry(key)
            .or_insert_with(|| Plan::new(scope_range(config.root, ctx.source)));
        if plan.skipped.is_some() {
            return;
        }

        let entry = match Entry::parse(&config.tail, ctx) {
            Ok(entry) => entry,
            Err(reason) => {
                plan.skip(reason, config.root, ctx.source);
                return;
            }
        };
        if let Some(reason) = entry.as_ref().and_then(|e| plan.conflict(e, ctx.source)) {
            plan.skip(reason, config.root, ctx.source);
            return;
        }

        if config.creation {
            if plan.install.is_some() {
                plan.skip(
                    "stubbed more than once in the same scope".to_string(),
                    config.root,
                    ctx.source,
                );
                return;
            }
            plan.install = Some(config.root);
            plan.object = config.object;
            if plan.binding.is_none() {
                plan.binding = config.binding;
            }
        } else {
            if !is_unconditional_statement(config.root) {
                plan.skip(
                    "configuration is conditional or not a standalone statement".to_string(),
                    config.root,
                    ctx.source,
                );
                return;
            }
            plan.contributions.push(config.root);
            if plan.binding.is_none() {
                plan.binding = config.binding;
            }
        }
        plan.entries.extend(entry);
    }

    /// Emit install and deletion edits for every plan that was not skipped
    pub fn finish(mut self, ctx: &RuleContext, edits: &mut EditSet) -> AggregateOutcome {
        let mut outcome = AggregateOutcome::default();

        // a mockImplementation in an inner scope would discard what an
        // enclosing hook or suite configured for the same stub
        let overridden: Vec<(usize, String)> = self
            .plans
            .iter()
            .enumerate()
            .filter(|(_, (_, plan))| plan.install.is_none() && plan.skipped.is_none())
            .filter_map(|(i, (key, plan))| {
                let (outer, _) = self.plans.iter().find(|(other, outer)| {
                    *other != key
                        && other.subject == key.subject
                        && other.member == key.member
                        && outer.skipped.is_none()
                        && !outer.entries.is_empty()
                        && outer.encloses(plan)
                })?;
                Some((i, format!("would replace the configuration made for {}", outer)))
            })
            .collect();
        for (i, reason) in overridden {
            if let Some((_, plan)) = self.plans.get_index_mut(i) {
                if let Some(first) = plan.contributions.first().copied() {
                    plan.skip(reason, first, ctx.source);
                }
            }
        }

        for (key, plan) in self.plans {
            if let Some((reason, location)) = &plan.skipped {
                warn!(%key, %reason, "skipping stub configuration");
                outcome.diagnostics.push(
                    Diagnostic::warning(
                        format!("stub configuration for {} left unchanged: {}", key, reason),
                        location.clone(),
                    )
                    .with_key(key.to_string()),
                );
                continue;
            }

            let function = implementation(&plan.entries, ctx);
            let mut deletions = plan.contributions.iter();
            match (plan.install, plan.object) {
                (Some(install), Some(object)) => {
                    let installed = Expr::call(
                        format!("{}.method", ctx.names.mock),
                        vec![ctx.embed(object), Expr::string(key.member.as_str()), function],
                    );
                    edits.replace(install, installed, "stub-configuration");
                    outcome.requires.insert(ModuleKind::Mock);
                }
                (Some(install), None) => {
                    let installed = Expr::call(format!("{}.fn", ctx.names.mock), vec![function]);
                    edits.replace(install, installed, "stub-configuration");
                    outcome.requires.insert(ModuleKind::Mock);
                }
                (None, _) => {
                    let (Some(binding), Some(first)) = (plan.binding.as_deref(), deletions.next())
                    else {
                        continue;
                    };
                    let installed = Expr::ident(binding)
                        .member("mock")
                        .method("mockImplementation", vec![function]);
                    edits.replace(*first, installed, "stub-configuration");
                }
            }
            for root in deletions {
                if let Some(statement) = root.parent() {
                    edits.delete_statement(statement, ctx.source, "stub-configuration-merged");
                }
            }
            if plan.uses_deep_matchers() {
                outcome.requires.insert(ModuleKind::Util);
            }
            debug!(%key, entries = plan.entries.len(), "merged stub configuration");
            outcome.installed += 1;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{node_text, visit_named, TypeScriptParser};
    use crate::rewriter::catalog::{MockBindings, Names};
    use crate::rewriter::chain::is_chain_root;
    use crate::rewriter::synth::{print_expr, Style};
    use pretty_assertions::assert_eq;

    /// Parse `source` and hand every outermost call chain to `check`
    fn with_chains(source: &str, check: impl FnOnce(&RuleContext, Vec<Node>)) {
        let mut parser = TypeScriptParser::new().unwrap();
        let tree = parser.parse(source).unwrap();
        let mut roots = Vec::new();
        visit_named(tree.root_node(), &mut |n| {
            if n.kind() == "call_expression" && is_chain_root(n) {
                roots.push(n);
            }
        });
        let names = Names::default();
        let mocks = MockBindings::default();
        let ctx = RuleContext {
            source,
            names: &names,
            mocks: &mocks,
        };
        check(&ctx, roots);
    }

    fn print(expr: &Expr, source: &str) -> String {
        print_expr(expr, &Style::default(), "", &|r| source[r].to_string())
    }

    #[test]
    fn mixed_matchers_build_one_guarded_branch() {
        let source = "s.withArgs(1, { a: 1 }).returns(2);";
        with_chains(source, |ctx, roots| {
            let chain = walk(roots[0], source);
            let entry = Entry::parse(&chain.steps, ctx).unwrap().unwrap();
            assert!(matches!(
                entry.matchers.as_deref(),
                Some([Matcher::Strict(_), Matcher::Deep(_)])
            ));
            assert_eq!(
                print(&implementation(&[entry], ctx), source),
                "(...args) => {\n  if (args.length >= 2 && args[0] === 1 && isDeepStrictEqual(args[1], { a: 1 })) {\n    return 2;\n  }\n  return undefined;\n}"
            );
        });
    }

    #[test]
    fn incomplete_and_unknown_tails_are_rejected() {
        let source = "s.withArgs(1);\ns.onFirstCall().returns(1);";
        with_chains(source, |ctx, roots| {
            let dangling = walk(roots[0], source);
            let err = Entry::parse(&dangling.steps, ctx).unwrap_err();
            assert!(err.contains("without a result"));
            let unknown = walk(roots[1], source);
            let err = Entry::parse(&unknown.steps, ctx).unwrap_err();
            assert_eq!(err, "unrecognized configuration `.onFirstCall.returns`");
        });
    }

    #[test]
    fn string_error_becomes_named_error() {
        let source = "s.throws('TypeError');";
        with_chains(source, |ctx, roots| {
            let chain = walk(roots[0], source);
            let result = StubResult::parse(&chain.steps[0]).unwrap();
            assert_eq!(
                print(&result.function(ctx), source),
                "() => {\n  throw Object.assign(new Error(), { name: 'TypeError' });\n}"
            );
        });
    }

    #[test]
    fn fallback_follows_the_argument_branches() {
        let source = "s.returns(3);\ns.withArgs('a').resolves(2);";
        with_chains(source, |ctx, roots| {
            let entries: Vec<Entry> = roots
                .iter()
                .map(|root| {
                    let chain = walk(*root, source);
                    Entry::parse(&chain.steps, ctx).unwrap().unwrap()
                })
                .collect();
            let printed = print(&implementation(&entries, ctx), source);
            assert!(printed.contains("return Promise.resolve(2);"));
            assert!(printed.ends_with("  }\n  return 3;\n}"));
        });
    }

    #[test]
    fn creations_in_different_tests_are_planned_separately() {
        let source = "it('a', () => { sinon.stub(api, 'get').returns(1); });\nit('b', () => { sinon.stub(api, 'get').returns(2); });";
        with_chains(source, |ctx, roots| {
            let mut aggregator = Aggregator::new();
            assert!(aggregator.is_empty());
            for root in roots.into_iter().filter(|r| node_text(*r, source).starts_with("sinon")) {
                let chain = walk(root, source);
                aggregator.add(
                    StubConfig {
                        subject: "api".to_string(),
                        member: "get".to_string(),
                        object: chain.steps[0].args().first().copied(),
                        binding: None,
                        creation: true,
                        tail: chain.steps[1..].to_vec(),
                        root,
                    },
                    ctx,
                );
            }
            let keys: Vec<String> = aggregator.keys().map(|k| k.to_string()).collect();
            assert_eq!(keys, ["api.get in 'a'", "api.get in 'b'"]);

            let mut edits = EditSet::new();
            let outcome = aggregator.finish(ctx, &mut edits);
            assert_eq!(outcome.installed, 2);
            assert!(outcome.diagnostics.is_empty());
            let output = edits.apply(source, &Style::default()).output;
            assert!(output.contains("mock.method(api, 'get', () => 1);"));
            assert!(output.contains("mock.method(api, 'get', () => 2);"));
        });
    }
}
