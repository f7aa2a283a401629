//! Existence and emptiness checks.
//!
//! `exist` keeps chai's loose semantics: `null` and `undefined` both count as
//! missing, so it maps to `assert.notEqual(x, undefined)`. Under
//! `node:assert/strict` `notEqual` is strict, so the loose comparison is
//! spelled out as `assert.ok(x != null)` instead.

use super::{assert_call, pick, predicate, AssertionRule, AssertionView};
use crate::rewriter::catalog::RuleContext;
use crate::rewriter::synth::Expr;

pub struct ExistenceRule;

impl AssertionRule for ExistenceRule {
    fn name(&self) -> &'static str {
        "existence"
    }

    fn build(&self, view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
        let word = view.bare(&["exist", "exists", "null", "undefined", "empty", "NaN"])?;
        let value = view.value.clone();
        let negated = view.negated;
        let expr = match word.name.as_str() {
            "exist" | "exists" if ctx.names.assert_strict => {
                predicate(ctx, value.binary("!=", Expr::lit("null")), negated)
            }
            "exist" | "exists" => assert_call(
                ctx,
                pick(negated, "notEqual", "equal"),
                vec![value, Expr::lit("undefined")],
            ),
            "null" | "undefined" => assert_call(
                ctx,
                pick(negated, "strictEqual", "notStrictEqual"),
                vec![value, Expr::lit(word.name.as_str())],
            ),
            "empty" => assert_call(
                ctx,
                pick(negated, "equal", "notEqual"),
                vec![value.member("length"), Expr::lit("0")],
            ),
            _ => predicate(ctx, Expr::call("Number.isNaN", vec![value]), negated),
        };
        Some(expr)
    }
}
