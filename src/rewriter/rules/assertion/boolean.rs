//! Boolean literal checks and truthiness

use super::{assert_call, pick, AssertionRule, AssertionView};
use crate::rewriter::catalog::RuleContext;
use crate::rewriter::synth::Expr;

pub struct BooleanRule;

impl AssertionRule for BooleanRule {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn build(&self, view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
        let word = view.bare(&["true", "false", "ok"])?;
        let value = view.value.clone();
        match word.name.as_str() {
            // assert.ok has no negated twin that keeps chai's falsy semantics
            "ok" if view.negated => None,
            "ok" => Some(assert_call(ctx, "ok", vec![value])),
            literal => Some(assert_call(
                ctx,
                pick(view.negated, "strictEqual", "notStrictEqual"),
                vec![value, Expr::lit(literal)],
            )),
        }
    }
}
