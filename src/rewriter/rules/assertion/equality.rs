//! Equality assertions -> `assert.strictEqual` / `assert.deepStrictEqual`

use super::{assert_call, expected_with_message, pick, AssertionRule, AssertionView};
use crate::rewriter::catalog::RuleContext;
use crate::rewriter::synth::Expr;

const STRICT_WORDS: &[&str] = &["equal", "equals", "eq", "exactly", "strictEqual"];
const DEEP_WORDS: &[&str] = &["eql", "eqls", "deepEqual"];

/// `eql`, `deepEqual` and `deep.equal`
pub struct DeepEqualityRule;

impl AssertionRule for DeepEqualityRule {
    fn name(&self) -> &'static str {
        "deep-equality"
    }

    fn build(&self, view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
        let word = view.called(DEEP_WORDS, 1..=2).or_else(|| {
            view.called(&["equal", "equals", "eq"], 1..=2)
                .filter(|_| view.deep)
        })?;
        let mut args = vec![view.value.clone()];
        args.extend(expected_with_message(word, ctx));
        let method = pick(view.negated, "deepStrictEqual", "notDeepStrictEqual");
        Some(assert_call(ctx, method, args))
    }
}

/// `equal`, `exactly` and friends without the `deep` flag
pub struct StrictEqualityRule;

impl AssertionRule for StrictEqualityRule {
    fn name(&self) -> &'static str {
        "strict-equality"
    }

    fn build(&self, view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
        if view.deep {
            return None;
        }
        let word = view.called(STRICT_WORDS, 1..=2)?;
        let mut args = vec![view.value.clone()];
        args.extend(expected_with_message(word, ctx));
        let method = pick(view.negated, "strictEqual", "notStrictEqual");
        Some(assert_call(ctx, method, args))
    }
}
