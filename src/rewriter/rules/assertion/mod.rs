//! should.js / chai assertion chains -> `node:assert`
//!
//! Every assertion form is first normalized into an [`AssertionView`]: the
//! asserted value, the meaningful words of the chain and its flags. Rule
//! families then match on the words only, so `x.should.not.equal(1)`,
//! `expect(x).to.not.equal(1)` and `should(x).not.equal(1)` share one rule.

pub mod boolean;
pub mod equality;
pub mod existence;
pub mod membership;
pub mod promise;
pub mod setup;
pub mod throws;

use crate::parser::unwrap_parens;
use crate::rewriter::catalog::{PatternRule, RuleContext, Synthesis};
use crate::rewriter::chain::{Chain, Step};
use crate::rewriter::imports::ModuleKind;
use crate::rewriter::synth::Expr;
use tree_sitter::Node;

/// Language-chain words that carry no meaning when accessed as properties
const FILLERS: &[&str] = &[
    "to", "be", "been", "is", "that", "which", "and", "has", "have", "with", "at", "of", "same",
    "but", "does", "a", "an", "the", "still", "also",
];

/// Normalized view of an assertion chain
#[derive(Debug, Clone)]
pub struct AssertionView<'t> {
    /// The value under test
    pub value: Expr,
    /// Meaningful steps in source order (flags and fillers removed)
    pub words: Vec<Step<'t>>,
    pub negated: bool,
    pub deep: bool,
    pub eventually: bool,
    pub nested: bool,
    pub own: bool,
}

impl<'t> AssertionView<'t> {
    /// Recognize any supported subject form; `None` for other chains
    pub fn from_chain(chain: &Chain<'t>, ctx: &RuleContext) -> Option<Self> {
        let (value, rest) = split_subject(chain, ctx)?;
        let mut view = AssertionView {
            value: ctx.embed(value),
            words: Vec::new(),
            negated: false,
            deep: false,
            eventually: false,
            nested: false,
            own: false,
        };
        for step in rest {
            if step.is_call() {
                view.words.push(step);
                continue;
            }
            match step.name.as_str() {
                "not" => view.negated = !view.negated,
                "deep" => view.deep = true,
                "eventually" | "finally" => view.eventually = true,
                "nested" => view.nested = true,
                "own" => view.own = true,
                word if FILLERS.contains(&word) => {}
                _ => view.words.push(step),
            }
        }
        (!view.words.is_empty()).then_some(view)
    }

    /// The only word, if the chain has exactly one
    pub fn single(&self) -> Option<&Step<'t>> {
        match self.words.as_slice() {
            [word] => Some(word),
            _ => None,
        }
    }

    /// The only word, if it is one of `names` with no arguments
    /// (`.empty` and `.empty()` are the same assertion)
    pub fn bare(&self, names: &[&str]) -> Option<&Step<'t>> {
        self.single()
            .filter(|w| names.contains(&w.name.as_str()) && w.args().is_empty())
    }

    /// The only word, if it is a call to one of `names` with an argument
    /// count inside `arity`
    pub fn called(
        &self,
        names: &[&str],
        arity: std::ops::RangeInclusive<usize>,
    ) -> Option<&Step<'t>> {
        self.single().filter(|w| {
            w.is_call() && names.contains(&w.name.as_str()) && arity.contains(&w.args().len())
        })
    }

    /// The same chain without its negation
    pub fn positive(&self) -> AssertionView<'t> {
        AssertionView {
            negated: false,
            ..self.clone()
        }
    }

    /// Same assertion applied to a derived value (`.length`, `.property('p')`)
    pub fn shifted(&self, value: Expr, skip: usize) -> AssertionView<'t> {
        AssertionView {
            value,
            words: self.words[skip..].to_vec(),
            ..self.clone()
        }
    }
}

/// Find the asserted value and the steps that make up the assertion
fn split_subject<'t>(chain: &Chain<'t>, ctx: &RuleContext) -> Option<(Node<'t>, Vec<Step<'t>>)> {
    let names = ctx.names;

    // value.should...
    if let Some(i) = chain
        .steps
        .iter()
        .position(|s| s.name == "should" && !s.is_call())
    {
        let object = chain.steps[i].site.child_by_field_name("object")?;
        return Some((unwrap_parens(object), chain.steps[i + 1..].to_vec()));
    }

    let subject = chain.subject;
    if subject.kind() == "call_expression" {
        // expect(value)... / should(value)...
        let function = subject.child_by_field_name("function")?;
        let callee = ctx.text(function);
        if function.kind() == "identifier" && (callee == names.expect || callee == names.should) {
            let args = crate::parser::call_arguments(subject);
            if (1..=2).contains(&args.len()) {
                return Some((args[0], chain.steps.clone()));
            }
        }
        return None;
    }

    // chai.expect(value)...
    if chain.subject_is(&names.chai, ctx.source) {
        let first = chain.steps.first()?;
        if first.name == "expect" && (1..=2).contains(&first.args().len()) {
            return Some((first.args()[0], chain.steps[1..].to_vec()));
        }
        return None;
    }

    // should.exist(value), should.not.exist(value), should.equal(a, b)
    if chain.subject_is(&names.should, ctx.source) {
        let mut steps = chain.steps.clone();
        let last = steps.last_mut()?;
        let args = last.arguments.as_mut()?;
        if args.is_empty() {
            return None;
        }
        let value = args.remove(0);
        return Some((value, steps));
    }

    None
}

/// One family of assertion rewrites over an [`AssertionView`]
pub trait AssertionRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Build the replacement, or `None` if the view is not this family's shape
    fn build(&self, view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr>;

    /// Whether the family understands `eventually` chains
    fn handles_eventually(&self) -> bool {
        false
    }
}

/// Adapter from an assertion family to a catalog rule
pub struct Assertion<R>(pub R);

impl<R: AssertionRule> Assertion<R> {
    fn view<'t>(&self, chain: &Chain<'t>, ctx: &RuleContext) -> Option<AssertionView<'t>> {
        AssertionView::from_chain(chain, ctx)
            .filter(|view| !view.eventually || self.0.handles_eventually())
    }
}

impl<R: AssertionRule> PatternRule for Assertion<R> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Negated chains whose positive form the family handles are claimed
    /// too, so they are reported instead of falling through to later families
    fn matches(&self, chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        self.view(chain, ctx).is_some_and(|view| {
            self.0.build(&view, ctx).is_some()
                || (view.negated && self.0.build(&view.positive(), ctx).is_some())
        })
    }

    fn negated(&self, chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        self.view(chain, ctx).is_some_and(|view| view.negated)
    }

    fn build<'t>(&self, chain: &Chain<'t>, ctx: &RuleContext) -> Synthesis<'t> {
        match self.view(chain, ctx).and_then(|view| self.0.build(&view, ctx)) {
            Some(expr) => Synthesis::Replace {
                target: chain.root,
                expr,
            },
            None if self.negated(chain, ctx) => Synthesis::Skip(format!(
                "negated form `{}` has no node:assert counterpart",
                excerpt_words(chain)
            )),
            None => Synthesis::Skip(format!("unsupported {} assertion", self.0.name())),
        }
    }

    fn requires(&self) -> &'static [ModuleKind] {
        &[ModuleKind::Assert]
    }
}

/// `not.throw(TypeError)` style summary of the steps after the subject
fn excerpt_words(chain: &Chain<'_>) -> String {
    chain
        .steps
        .iter()
        .filter(|s| s.name != "should" && !FILLERS.contains(&s.name.as_str()))
        .map(|s| {
            if s.is_call() {
                format!("{}(...)", s.name)
            } else {
                s.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Assertion catalog in specificity order
pub fn catalog() -> Vec<Box<dyn PatternRule>> {
    vec![
        Box::new(setup::SetupRule),
        Box::new(Assertion(promise::PromiseRule)),
        Box::new(Assertion(throws::ThrowRule)),
        Box::new(Assertion(equality::DeepEqualityRule)),
        Box::new(Assertion(equality::StrictEqualityRule)),
        Box::new(Assertion(existence::ExistenceRule)),
        Box::new(Assertion(boolean::BooleanRule)),
        Box::new(Assertion(membership::MembershipRule)),
    ]
}

/// Build a synchronous assertion for a view whose value was derived from the
/// original subject (`.length`, `.property('p')`)
pub fn build_sync(view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
    let families: [&dyn AssertionRule; 5] = [
        &equality::DeepEqualityRule,
        &equality::StrictEqualityRule,
        &existence::ExistenceRule,
        &boolean::BooleanRule,
        &membership::MembershipRule,
    ];
    families.iter().find_map(|family| family.build(view, ctx))
}

/// `assert.<method>(args...)` with the file's assert binding
pub fn assert_call(ctx: &RuleContext, method: &str, args: Vec<Expr>) -> Expr {
    Expr::call(format!("{}.{}", ctx.names.assert, method), args)
}

/// `assert.ok(pred)`, or `assert.strictEqual(pred, false)` when negated
pub fn predicate(ctx: &RuleContext, pred: Expr, negated: bool) -> Expr {
    if negated {
        assert_call(ctx, "strictEqual", vec![pred, Expr::lit("false")])
    } else {
        assert_call(ctx, "ok", vec![pred])
    }
}

/// Pick the positive or negated target method
pub fn pick(negated: bool, positive: &'static str, negative: &'static str) -> &'static str {
    if negated {
        negative
    } else {
        positive
    }
}

/// Expected value plus the optional trailing message argument
pub fn expected_with_message(step: &Step<'_>, ctx: &RuleContext) -> Vec<Expr> {
    step.args().iter().map(|arg| ctx.embed(*arg)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{visit_named, TypeScriptParser};
    use crate::rewriter::catalog::{MockBindings, Names};
    use crate::rewriter::chain::walk;

    fn with_view(source: &str, check: impl Fn(Option<AssertionView>)) {
        let mut parser = TypeScriptParser::new().unwrap();
        let tree = parser.parse(source).unwrap();
        let mut root = None;
        visit_named(tree.root_node(), &mut |n| {
            if root.is_none() && n.kind() == "expression_statement" {
                root = n.named_child(0);
            }
        });
        let names = Names::default();
        let mocks = MockBindings::default();
        let ctx = RuleContext {
            source,
            names: &names,
            mocks: &mocks,
        };
        check(AssertionView::from_chain(&walk(root.unwrap(), source), &ctx));
    }

    #[test]
    fn should_property_view_collects_flags() {
        with_view("(a + b).should.not.be.deep.equal(c);", |view| {
            let view = view.unwrap();
            assert!(view.negated);
            assert!(view.deep);
            assert_eq!(view.words.len(), 1);
            assert_eq!(view.words[0].name, "equal");
        });
    }

    #[test]
    fn double_negation_cancels() {
        with_view("expect(x).not.to.not.be.ok;", |view| {
            assert!(!view.unwrap().negated);
        });
    }

    #[test]
    fn static_should_takes_value_from_arguments() {
        with_view("should.not.exist(err);", |view| {
            let view = view.unwrap();
            assert!(view.negated);
            assert!(view.bare(&["exist"]).is_some());
        });
    }

    #[test]
    fn unrelated_chain_has_no_view() {
        with_view("console.log(x);", |view| assert!(view.is_none()));
        with_view("chai.use(plugin);", |view| assert!(view.is_none()));
    }
}
