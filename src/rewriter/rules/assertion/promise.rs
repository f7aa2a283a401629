//! chai-as-promised / should.js promise assertions.
//!
//! Settlement checks map onto `assert.rejects`/`assert.doesNotReject`; checks
//! on the resolved value become a `.then` callback so the result stays a
//! promise the test can return or await.

use super::throws::error_matcher;
use super::{assert_call, pick, AssertionRule, AssertionView};
use crate::rewriter::catalog::RuleContext;
use crate::rewriter::synth::Expr;

const STRICT_WORDS: &[&str] = &["equal", "equals", "eq"];
const DEEP_WORDS: &[&str] = &["eql", "eqls", "deepEqual"];

pub struct PromiseRule;

impl PromiseRule {
    /// `p.then((actual) => assert.<method>(actual, expected))`
    fn on_resolved(view: &AssertionView<'_>, ctx: &RuleContext, method: &str, expected: Expr) -> Expr {
        let check = assert_call(ctx, method, vec![Expr::ident("actual"), expected]);
        view.value
            .clone()
            .method("then", vec![Expr::arrow(&["actual"], check)])
    }
}

impl AssertionRule for PromiseRule {
    fn name(&self) -> &'static str {
        "promise"
    }

    fn handles_eventually(&self) -> bool {
        true
    }

    fn build(&self, view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
        let value = view.value.clone();
        let negated = view.negated;

        if view.bare(&["fulfilled", "resolved"]).is_some() {
            let method = pick(negated, "doesNotReject", "rejects");
            return Some(assert_call(ctx, method, vec![value]));
        }
        if view.bare(&["rejected"]).is_some() {
            let method = pick(negated, "rejects", "doesNotReject");
            return Some(assert_call(ctx, method, vec![value]));
        }
        if let Some(word) = view.called(&["rejectedWith"], 1..=2) {
            if negated {
                return None;
            }
            let mut args = vec![value];
            args.extend(error_matcher(word.args(), ctx)?);
            return Some(assert_call(ctx, "rejects", args));
        }

        let (word, deep) = if let Some(word) = view.called(&["fulfilledWith"], 1..=1) {
            (word, false)
        } else if let Some(word) = view.called(&["become"], 1..=1) {
            (word, true)
        } else if !view.eventually {
            return None;
        } else if let Some(word) = view.called(STRICT_WORDS, 1..=1) {
            (word, view.deep)
        } else if let Some(word) = view.called(DEEP_WORDS, 1..=1) {
            (word, true)
        } else {
            return None;
        };

        let method = match (deep, negated) {
            (false, false) => "strictEqual",
            (false, true) => "notStrictEqual",
            (true, false) => "deepStrictEqual",
            (true, true) => "notDeepStrictEqual",
        };
        Some(Self::on_resolved(view, ctx, method, ctx.embed(word.args()[0])))
    }
}
