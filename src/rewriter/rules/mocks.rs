//! sinon -> `node:test` mock
//!
//! Sandboxes disappear (the `mock` tracker plays their role), anonymous fakes
//! become `mock.fn`, method stubs become `mock.method` through the
//! aggregator, and call inspection goes through the `.mock` context.

use crate::parser::{node_text, string_literal_value, unwrap_parens, visit_named};
use crate::rewriter::catalog::{
    MockBinding, MockBindings, Names, PatternRule, RuleContext, Synthesis,
};
use crate::rewriter::chain::{walk, Chain, Step};
use crate::rewriter::imports::ModuleKind;
use crate::rewriter::rules::assertion::{assert_call, predicate};
use crate::rewriter::stubs::{StubConfig, StubResult, APPLY_STEPS};
use crate::rewriter::synth::Expr;
use tree_sitter::Node;

const CREATION_STEPS: &[&str] = &["stub", "spy", "fake"];

/// Configuration steps other than the supported ones; chains using them are
/// still routed to the aggregator so the whole key gets skipped
const UNSUPPORTED_CONFIG: &[&str] = &[
    "onCall",
    "onFirstCall",
    "onSecondCall",
    "onThirdCall",
    "callThrough",
    "returnsThis",
    "yields",
    "yieldsTo",
    "callsArg",
    "callsArgWith",
    "resolvesArg",
];

/// `sinon.createSandbox()` / `sinon.sandbox.create()`
fn is_sandbox_creation(chain: &Chain<'_>, source: &str, names: &Names) -> bool {
    if !chain.subject_is(&names.sinon, source) {
        return false;
    }
    let steps: Vec<(&str, bool)> = chain
        .steps
        .iter()
        .map(|s| (s.name.as_str(), s.is_call()))
        .collect();
    matches!(
        steps.as_slice(),
        [("createSandbox", true)] | [("sandbox", false), ("create", true)]
    )
}

/// Target of a method creation call `factory.stub(obj, 'm')`
fn method_target<'t>(step: &Step<'t>, source: &str) -> Option<(Node<'t>, String)> {
    match step.args() {
        [object, name] => Some((*object, string_literal_value(*name, source)?)),
        _ => None,
    }
}

/// Collect sandbox and stub variables before discovery
pub fn scan_bindings(root: Node, source: &str, names: &Names) -> MockBindings {
    let mut bindings = MockBindings::default();
    let mut assignments = Vec::new();
    visit_named(root, &mut |node| {
        let (name, value) = match node.kind() {
            "variable_declarator" => (
                node.child_by_field_name("name"),
                node.child_by_field_name("value"),
            ),
            "assignment_expression" => (
                node.child_by_field_name("left"),
                node.child_by_field_name("right"),
            ),
            "call_expression" => {
                assignments.push((None, node));
                return;
            }
            _ => return,
        };
        if let (Some(name), Some(value)) = (name, value) {
            if name.kind() == "identifier" {
                assignments.push((Some(name), unwrap_parens(value)));
            }
        }
    });

    // sandboxes first so `sandbox.stub(...)` below is recognized
    for (name, value) in &assignments {
        if let Some(name) = name {
            let chain = walk(*value, source);
            if is_sandbox_creation(&chain, source, names) {
                bindings.sandboxes.insert(node_text(*name, source).to_string());
            }
        }
    }

    for (name, value) in &assignments {
        let chain = walk(*value, source);
        let Some(first) = chain.steps.first() else {
            continue;
        };
        let factory = chain.subject.kind() == "identifier"
            && bindings.is_factory(node_text(chain.subject, source), names);
        if !factory || !CREATION_STEPS.contains(&first.name.as_str()) {
            continue;
        }
        let target = method_target(first, source);
        if let Some((object, member)) = &target {
            bindings
                .stubbed_members
                .insert(format!("{}.{}", node_text(*object, source), member));
        }
        if let Some(name) = name {
            let binding = match target {
                Some((object, member)) => MockBinding::Method {
                    object: node_text(object, source).to_string(),
                    member,
                },
                None => MockBinding::Anonymous,
            };
            bindings
                .stubs
                .insert(node_text(*name, source).to_string(), binding);
        }
    }
    bindings
}

/// Mock catalog in specificity order
pub fn catalog() -> Vec<Box<dyn PatternRule>> {
    vec![
        Box::new(SandboxCreationRule),
        Box::new(RestoreAllRule),
        Box::new(MockAssertRule),
        Box::new(MockAssertArgumentsRule),
        Box::new(StubConfigurationRule),
        Box::new(MethodSpyRule),
        Box::new(AnonymousFakeRule),
        Box::new(CallArgumentsRule),
        Box::new(StubInspectionRule),
    ]
}

fn factory_subject(chain: &Chain<'_>, ctx: &RuleContext) -> bool {
    chain.subject.kind() == "identifier" && ctx.mocks.is_factory(ctx.text(chain.subject), ctx.names)
}

/// `const sandbox = sinon.createSandbox()`, removed once every use of the
/// sandbox has been rewritten
pub struct SandboxCreationRule;

impl SandboxCreationRule {
    fn declaration<'t>(chain: &Chain<'t>, ctx: &RuleContext) -> Option<(Node<'t>, String)> {
        let parent = chain.root.parent()?;
        match parent.kind() {
            "variable_declarator" => {
                let name = parent.child_by_field_name("name")?;
                let statement = parent.parent()?;
                let mut cursor = statement.walk();
                let declarators = statement
                    .named_children(&mut cursor)
                    .filter(|c| c.kind() == "variable_declarator")
                    .count();
                (name.kind() == "identifier" && declarators == 1)
                    .then(|| (statement, ctx.text(name).to_string()))
            }
            "assignment_expression" => {
                let left = parent.child_by_field_name("left")?;
                let statement = parent.parent()?;
                (left.kind() == "identifier" && statement.kind() == "expression_statement")
                    .then(|| (statement, ctx.text(left).to_string()))
            }
            _ => None,
        }
    }
}

impl PatternRule for SandboxCreationRule {
    fn name(&self) -> &'static str {
        "sandbox-creation"
    }

    fn matches(&self, chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        is_sandbox_creation(chain, ctx.source, ctx.names) && Self::declaration(chain, ctx).is_some()
    }

    fn build<'t>(&self, chain: &Chain<'t>, ctx: &RuleContext) -> Synthesis<'t> {
        match Self::declaration(chain, ctx) {
            Some((statement, binding)) => Synthesis::RemoveDeclaration { statement, binding },
            None => Synthesis::Skip("sandbox is not bound to a variable".to_string()),
        }
    }
}

/// `sinon.restore()`, `sandbox.restore()` -> `mock.restoreAll()`
pub struct RestoreAllRule;

impl PatternRule for RestoreAllRule {
    fn name(&self) -> &'static str {
        "restore-all"
    }

    fn matches(&self, chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        factory_subject(chain, ctx)
            && matches!(chain.steps.as_slice(), [step] if step.name == "restore" && step.is_call() && step.args().is_empty())
    }

    fn build<'t>(&self, chain: &Chain<'t>, ctx: &RuleContext) -> Synthesis<'t> {
        Synthesis::Replace {
            target: chain.root,
            expr: Expr::call(format!("{}.restoreAll", ctx.names.mock), vec![]),
        }
    }

    fn requires(&self) -> &'static [ModuleKind] {
        &[ModuleKind::Mock]
    }
}

/// `fn.mock.callCount()`
fn call_count(function: Expr) -> Expr {
    function.member("mock").method("callCount", vec![])
}

/// `sinon.assert.<check>(fn, ...)` steps, if the chain has that shape
fn sinon_assert<'c, 't>(chain: &'c Chain<'t>, ctx: &RuleContext) -> Option<&'c Step<'t>> {
    if !chain.subject_is(&ctx.names.sinon, ctx.source) {
        return None;
    }
    match chain.steps.as_slice() {
        [assert, check] if assert.name == "assert" && !assert.is_call() && check.is_call() => {
            Some(check)
        }
        _ => None,
    }
}

/// `sinon.assert.called(fn)` and call-count checks
pub struct MockAssertRule;

impl MockAssertRule {
    fn expr(chain: &Chain<'_>, ctx: &RuleContext) -> Option<Expr> {
        let check = sinon_assert(chain, ctx)?;
        let (function, rest) = check.args().split_first()?;
        let count = call_count(ctx.embed(*function));
        let expected = match (check.name.as_str(), rest) {
            ("called", []) => {
                return Some(predicate(ctx, count.binary(">", Expr::lit("0")), false))
            }
            ("notCalled", []) => Expr::lit("0"),
            ("calledOnce", []) => Expr::lit("1"),
            ("calledTwice", []) => Expr::lit("2"),
            ("calledThrice", []) => Expr::lit("3"),
            ("callCount", [n]) => ctx.embed(*n),
            _ => return None,
        };
        Some(assert_call(ctx, "strictEqual", vec![count, expected]))
    }
}

impl PatternRule for MockAssertRule {
    fn name(&self) -> &'static str {
        "mock-assert"
    }

    fn matches(&self, chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        Self::expr(chain, ctx).is_some()
    }

    fn build<'t>(&self, chain: &Chain<'t>, ctx: &RuleContext) -> Synthesis<'t> {
        match Self::expr(chain, ctx) {
            Some(expr) => Synthesis::Replace {
                target: chain.root,
                expr,
            },
            None => Synthesis::Skip("unsupported sinon.assert call".to_string()),
        }
    }

    fn requires(&self) -> &'static [ModuleKind] {
        &[ModuleKind::Assert]
    }
}

/// `fn.mock.calls.some((call) => isDeepStrictEqual(call.arguments..., [a, b]))`
fn called_with(function: Expr, args: &[Node], exactly: bool, ctx: &RuleContext) -> Expr {
    let call_args = Expr::ident("call").member("arguments");
    let actual = if exactly {
        call_args
    } else {
        call_args.method(
            "slice",
            vec![Expr::lit("0"), Expr::lit(args.len().to_string())],
        )
    };
    let expected = Expr::Array(args.iter().map(|a| ctx.embed(*a)).collect());
    let matches = Expr::call(ctx.names.util.as_str(), vec![actual, expected]);
    function
        .member("mock")
        .member("calls")
        .method("some", vec![Expr::arrow(&["call"], matches)])
}

/// `sinon.assert.calledWith(fn, ...)` / `calledWithExactly`
pub struct MockAssertArgumentsRule;

impl MockAssertArgumentsRule {
    fn expr(chain: &Chain<'_>, ctx: &RuleContext) -> Option<Expr> {
        let check = sinon_assert(chain, ctx)?;
        let (function, expected) = check.args().split_first()?;
        let exactly = match check.name.as_str() {
            "calledWith" => false,
            "calledWithExactly" => true,
            _ => return None,
        };
        let pred = called_with(ctx.embed(*function), expected, exactly, ctx);
        Some(predicate(ctx, pred, false))
    }
}

impl PatternRule for MockAssertArgumentsRule {
    fn name(&self) -> &'static str {
        "mock-assert-arguments"
    }

    fn matches(&self, chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        Self::expr(chain, ctx).is_some()
    }

    fn build<'t>(&self, chain: &Chain<'t>, ctx: &RuleContext) -> Synthesis<'t> {
        match Self::expr(chain, ctx) {
            Some(expr) => Synthesis::Replace {
                target: chain.root,
                expr,
            },
            None => Synthesis::Skip("unsupported sinon.assert call".to_string()),
        }
    }

    fn requires(&self) -> &'static [ModuleKind] {
        &[ModuleKind::Assert, ModuleKind::Util]
    }
}

/// Variable a chain is stored in: `const s = <chain>` or `s = <chain>`
fn bound_variable(root: Node, ctx: &RuleContext) -> Option<String> {
    let parent = root.parent()?;
    let name = match parent.kind() {
        "variable_declarator" => parent.child_by_field_name("name")?,
        "assignment_expression" => parent.child_by_field_name("left")?,
        _ => return None,
    };
    (name.kind() == "identifier").then(|| ctx.text(name).to_string())
}

/// Method stubs, configured anonymous stubs and configuration of stub
/// variables, deferred to the aggregator
pub struct StubConfigurationRule;

impl StubConfigurationRule {
    fn is_method_creation(chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        factory_subject(chain, ctx)
            && chain
                .steps
                .first()
                .is_some_and(|s| s.name == "stub" && s.is_call() && s.args().len() == 2)
    }

    /// `const s = sinon.stub().returns(1)`: later `s.withArgs(...)` chains
    /// must merge with the inline default
    fn is_anonymous_creation(chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        factory_subject(chain, ctx)
            && chain.steps.len() > 1
            && chain.steps[0].name == "stub"
            && chain.steps[0].is_call()
            && chain.steps[0].args().is_empty()
            && bound_variable(chain.root, ctx).is_some()
    }

    fn is_variable_configuration(chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        chain.subject.kind() == "identifier"
            && ctx.mocks.stubs.contains_key(ctx.text(chain.subject))
            && chain.steps.first().is_some_and(|s| {
                s.is_call()
                    && (s.name == "withArgs"
                        || APPLY_STEPS.contains(&s.name.as_str())
                        || UNSUPPORTED_CONFIG.contains(&s.name.as_str()))
            })
    }
}

impl PatternRule for StubConfigurationRule {
    fn name(&self) -> &'static str {
        "stub-configuration"
    }

    fn matches(&self, chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        Self::is_method_creation(chain, ctx)
            || Self::is_anonymous_creation(chain, ctx)
            || Self::is_variable_configuration(chain, ctx)
    }

    fn build<'t>(&self, chain: &Chain<'t>, ctx: &RuleContext) -> Synthesis<'t> {
        if Self::is_method_creation(chain, ctx) {
            let creation = &chain.steps[0];
            let Some((object, member)) = method_target(creation, ctx.source) else {
                return Synthesis::Skip("stubbed member name is not a string literal".to_string());
            };
            return Synthesis::Configure(StubConfig {
                subject: ctx.text(object).to_string(),
                member,
                object: Some(object),
                binding: bound_variable(chain.root, ctx),
                creation: true,
                tail: chain.steps[1..].to_vec(),
                root: chain.root,
            });
        }

        if Self::is_anonymous_creation(chain, ctx) {
            let Some(variable) = bound_variable(chain.root, ctx) else {
                return Synthesis::Skip("anonymous stub is not bound to a variable".to_string());
            };
            return Synthesis::Configure(StubConfig {
                subject: variable.clone(),
                member: String::new(),
                object: None,
                binding: Some(variable),
                creation: true,
                tail: chain.steps[1..].to_vec(),
                root: chain.root,
            });
        }

        let variable = ctx.text(chain.subject).to_string();
        let (subject, member) = match ctx.mocks.stubs.get(&variable) {
            Some(MockBinding::Method { object, member }) => (object.clone(), member.clone()),
            _ => (variable.clone(), String::new()),
        };
        Synthesis::Configure(StubConfig {
            subject,
            member,
            object: None,
            binding: Some(variable),
            creation: false,
            tail: chain.steps.clone(),
            root: chain.root,
        })
    }

    fn requires(&self) -> &'static [ModuleKind] {
        &[ModuleKind::Mock]
    }
}

/// `sinon.spy(obj, 'm')` -> `mock.method(obj, 'm')`
pub struct MethodSpyRule;

impl PatternRule for MethodSpyRule {
    fn name(&self) -> &'static str {
        "method-spy"
    }

    fn matches(&self, chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        factory_subject(chain, ctx)
            && matches!(chain.steps.as_slice(), [spy] if spy.name == "spy" && spy.args().len() == 2)
    }

    fn build<'t>(&self, chain: &Chain<'t>, ctx: &RuleContext) -> Synthesis<'t> {
        let args = chain.steps[0].args().iter().map(|a| ctx.embed(*a)).collect();
        Synthesis::Replace {
            target: chain.root,
            expr: Expr::call(format!("{}.method", ctx.names.mock), args),
        }
    }

    fn requires(&self) -> &'static [ModuleKind] {
        &[ModuleKind::Mock]
    }
}

/// `sinon.stub()`, `sinon.spy(fn)`, `sinon.fake.returns(v)`, unbound
/// `sinon.stub().resolves(v)` -> `mock.fn(...)`
pub struct AnonymousFakeRule;

impl AnonymousFakeRule {
    fn implementation(chain: &Chain<'_>, ctx: &RuleContext) -> Option<Option<Expr>> {
        if !factory_subject(chain, ctx) {
            return None;
        }
        match chain.steps.as_slice() {
            [create] if create.is_call() && CREATION_STEPS.contains(&create.name.as_str()) => {
                match (create.name.as_str(), create.args()) {
                    (_, []) => Some(None),
                    ("spy" | "fake", [function]) => Some(Some(ctx.embed(*function))),
                    _ => None,
                }
            }
            [create, apply]
                if (create.name == "fake" && !create.is_call())
                    || (create.name == "stub" && create.is_call() && create.args().is_empty()) =>
            {
                StubResult::parse(apply).map(|result| Some(result.function(ctx)))
            }
            _ => None,
        }
    }
}

impl PatternRule for AnonymousFakeRule {
    fn name(&self) -> &'static str {
        "anonymous-fake"
    }

    fn matches(&self, chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        Self::implementation(chain, ctx).is_some()
    }

    fn build<'t>(&self, chain: &Chain<'t>, ctx: &RuleContext) -> Synthesis<'t> {
        let args = Self::implementation(chain, ctx).flatten().into_iter().collect();
        Synthesis::Replace {
            target: chain.root,
            expr: Expr::call(format!("{}.fn", ctx.names.mock), args),
        }
    }

    fn requires(&self) -> &'static [ModuleKind] {
        &[ModuleKind::Mock]
    }
}

/// Split an inspection chain into the mocked function and the inspection
/// steps: `spy.callCount` or `api.get.callCount` when `api.get` was stubbed
fn inspected<'c, 't>(chain: &'c Chain<'t>, ctx: &RuleContext) -> Option<(Expr, &'c [Step<'t>])> {
    if chain.subject.kind() != "identifier" {
        return None;
    }
    let subject = ctx.text(chain.subject);
    if ctx.mocks.stubs.contains_key(subject) {
        return Some((ctx.embed(chain.subject), &chain.steps));
    }
    let first = chain.steps.first().filter(|s| !s.is_call())?;
    let member = format!("{}.{}", subject, first.name);
    ctx.mocks
        .stubbed_members
        .contains(&member)
        .then(|| (ctx.embed(first.site), &chain.steps[1..]))
}

/// `spy.calledWith(a)` / `spy.calledWithExactly(a)`
pub struct CallArgumentsRule;

impl CallArgumentsRule {
    fn expr(chain: &Chain<'_>, ctx: &RuleContext) -> Option<Expr> {
        let (function, steps) = inspected(chain, ctx)?;
        let [check] = steps else {
            return None;
        };
        let exactly = match (check.name.as_str(), check.is_call()) {
            ("calledWith", true) => false,
            ("calledWithExactly", true) => true,
            _ => return None,
        };
        Some(called_with(function, check.args(), exactly, ctx))
    }
}

impl PatternRule for CallArgumentsRule {
    fn name(&self) -> &'static str {
        "call-arguments"
    }

    fn matches(&self, chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        Self::expr(chain, ctx).is_some()
    }

    fn build<'t>(&self, chain: &Chain<'t>, ctx: &RuleContext) -> Synthesis<'t> {
        match Self::expr(chain, ctx) {
            Some(expr) => Synthesis::Replace {
                target: chain.root,
                expr,
            },
            None => Synthesis::Skip("unsupported call inspection".to_string()),
        }
    }

    fn requires(&self) -> &'static [ModuleKind] {
        &[ModuleKind::Util]
    }
}

/// Call counts, recorded arguments, history reset and restore on a stub
pub struct StubInspectionRule;

impl StubInspectionRule {
    fn expr(chain: &Chain<'_>, ctx: &RuleContext) -> Option<Expr> {
        let (function, steps) = inspected(chain, ctx)?;
        let context = function.clone().member("mock");
        let count = call_count(function);
        let shape: Vec<(&str, bool)> = steps.iter().map(|s| (s.name.as_str(), s.is_call())).collect();
        let expr = match shape.as_slice() {
            [("callCount", false)] => count,
            [("called", false)] => count.binary(">", Expr::lit("0")),
            [("notCalled", false)] => count.binary("===", Expr::lit("0")),
            [("calledOnce", false)] => count.binary("===", Expr::lit("1")),
            [("calledTwice", false)] => count.binary("===", Expr::lit("2")),
            [("calledThrice", false)] => count.binary("===", Expr::lit("3")),
            [(nth, false), ("args", false)] => {
                let calls = context.member("calls");
                let call = match *nth {
                    "firstCall" => calls.index(Expr::lit("0")),
                    "secondCall" => calls.index(Expr::lit("1")),
                    "thirdCall" => calls.index(Expr::lit("2")),
                    "lastCall" => calls.method("at", vec![Expr::lit("-1")]),
                    _ => return None,
                };
                call.member("arguments")
            }
            [("getCall", true), ("args", false)] => {
                let [n] = steps[0].args() else {
                    return None;
                };
                context
                    .member("calls")
                    .index(ctx.embed(*n))
                    .member("arguments")
            }
            [("args", false)] => context.member("calls").method(
                "map",
                vec![Expr::arrow(
                    &["call"],
                    Expr::ident("call").member("arguments"),
                )],
            ),
            [("resetHistory" | "resetCalls", true)] => context.method("resetCalls", vec![]),
            [("restore", true)] => context.method("restore", vec![]),
            _ => return None,
        };
        Some(expr)
    }
}

impl PatternRule for StubInspectionRule {
    fn name(&self) -> &'static str {
        "stub-inspection"
    }

    fn matches(&self, chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        Self::expr(chain, ctx).is_some()
    }

    fn build<'t>(&self, chain: &Chain<'t>, ctx: &RuleContext) -> Synthesis<'t> {
        match Self::expr(chain, ctx) {
            Some(expr) => Synthesis::Replace {
                target: chain.root,
                expr,
            },
            None => Synthesis::Skip("unsupported stub inspection".to_string()),
        }
    }
}
