//! `throw()` family -> `assert.throws` / `assert.doesNotThrow`

use super::{assert_call, AssertionRule, AssertionView};
use crate::rewriter::catalog::RuleContext;
use crate::rewriter::synth::Expr;
use tree_sitter::Node;

const THROW_WORDS: &[&str] = &["throw", "throws", "throwError", "Throw"];

pub struct ThrowRule;

impl AssertionRule for ThrowRule {
    fn name(&self) -> &'static str {
        "throws"
    }

    fn build(&self, view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
        let word = view.single().filter(|w| THROW_WORDS.contains(&w.name.as_str()))?;
        let args = word.args();
        if view.negated {
            // not.throw(SomeError) passes on other errors; doesNotThrow does not
            return args
                .is_empty()
                .then(|| assert_call(ctx, "doesNotThrow", vec![view.value.clone()]));
        }
        let mut call_args = vec![view.value.clone()];
        call_args.extend(error_matcher(args, ctx)?);
        Some(assert_call(ctx, "throws", call_args))
    }
}

/// Second argument of `assert.throws`/`assert.rejects` for an expected-error
/// argument list. `None` when the arguments have no equivalent.
pub fn error_matcher(args: &[Node], ctx: &RuleContext) -> Option<Option<Expr>> {
    match args {
        [] => Some(None),
        [only] => Some(Some(match only.kind() {
            "string" | "template_string" => message_object(*only, ctx),
            _ => ctx.embed(*only),
        })),
        [class, message] => {
            let err = Expr::ident("err");
            let is_instance = err.clone().binary("instanceof", ctx.embed(*class));
            let message_check = match message.kind() {
                "string" | "template_string" => err
                    .member("message")
                    .binary("===", ctx.embed(*message)),
                "regex" => ctx
                    .embed(*message)
                    .method("test", vec![err.member("message")]),
                _ => return None,
            };
            Some(Some(Expr::arrow(
                &["err"],
                is_instance.binary("&&", message_check),
            )))
        }
        _ => None,
    }
}

fn message_object(message: Node, ctx: &RuleContext) -> Expr {
    Expr::Object(vec![("message".to_string(), ctx.embed(message))])
}
