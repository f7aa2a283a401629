//! Legacy assertion-library setup statements.
//!
//! `chai.use(plugin)`, `chai.should()` and `should.extend(...)` have no
//! counterpart once assertions go through `node:assert`; the statements are
//! dropped.

use crate::rewriter::catalog::{PatternRule, RuleContext, Synthesis};
use crate::rewriter::chain::Chain;

pub struct SetupRule;

impl SetupRule {
    fn is_setup(chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        let [step] = chain.steps.as_slice() else {
            return false;
        };
        if !step.is_call() {
            return false;
        }
        let names = ctx.names;
        let on_chai = chain.subject_is(&names.chai, ctx.source)
            && matches!(step.name.as_str(), "use" | "should");
        let on_should = chain.subject_is(&names.should, ctx.source) && step.name == "extend";
        on_chai || on_should
    }
}

impl PatternRule for SetupRule {
    fn name(&self) -> &'static str {
        "assertion-setup"
    }

    fn matches(&self, chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        Self::is_setup(chain, ctx)
            && chain
                .root
                .parent()
                .is_some_and(|p| p.kind() == "expression_statement")
    }

    fn build<'t>(&self, chain: &Chain<'t>, _ctx: &RuleContext) -> Synthesis<'t> {
        match chain.root.parent() {
            Some(statement) => Synthesis::RemoveSetup(statement),
            None => Synthesis::Skip("setup call outside a statement".to_string()),
        }
    }
}
