//! mocha registration globals -> `node:test`
//!
//! Most of the work is structural rather than chain-shaped, so besides the
//! catalog rules there is a [`RegistrationPass`] over every registration
//! call: renames of mocha-only aliases, a context parameter in front of
//! `done`, and `this.timeout(n)` turned into a `{ timeout: n }` option.

use crate::parser::{
    body_statements, call_arguments, function_parameters, is_function_literal, node_text,
    node_to_location, parameter_name, registration_callee, HOOK_NAMES, SUITE_NAMES,
    TEST_CASE_NAMES,
};
use crate::rewriter::applier::EditSet;
use crate::rewriter::catalog::{PatternRule, RuleContext, Synthesis};
use crate::rewriter::chain::Chain;
use crate::rewriter::synth::Expr;
use crate::Diagnostic;
use std::collections::BTreeSet;
use tracing::debug;
use tree_sitter::Node;

/// Registration catalog
pub fn catalog() -> Vec<Box<dyn PatternRule>> {
    vec![Box::new(AliasModifierRule), Box::new(SlowRule)]
}

fn alias_target(base: &str) -> Option<&'static str> {
    match base {
        "context" => Some("describe"),
        "specify" => Some("it"),
        _ => None,
    }
}

/// `context.only(...)`, `specify.skip(...)` -> `describe.only(...)`, `it.skip(...)`
pub struct AliasModifierRule;

impl PatternRule for AliasModifierRule {
    fn name(&self) -> &'static str {
        "registration-alias"
    }

    fn matches(&self, chain: &Chain<'_>, ctx: &RuleContext) -> bool {
        let base = ctx.text(chain.subject);
        chain.subject.kind() == "identifier"
            && alias_target(base).is_some()
            && matches!(chain.steps.as_slice(), [step] if step.is_call() && matches!(step.name.as_str(), "only" | "skip"))
    }

    fn build<'t>(&self, chain: &Chain<'t>, ctx: &RuleContext) -> Synthesis<'t> {
        let step = &chain.steps[0];
        let (Some(target), Some(callee)) = (
            alias_target(ctx.text(chain.subject)),
            step.site.child_by_field_name("function"),
        ) else {
            return Synthesis::Skip("unrecognized registration alias".to_string());
        };
        Synthesis::Replace {
            target: callee,
            expr: Expr::ident(format!("{}.{}", target, step.name)),
        }
    }
}

/// `this.slow(n)` has no counterpart; the statement is dropped
pub struct SlowRule;

impl PatternRule for SlowRule {
    fn name(&self) -> &'static str {
        "slow-threshold"
    }

    fn matches(&self, chain: &Chain<'_>, _ctx: &RuleContext) -> bool {
        chain.subject.kind() == "this"
            && matches!(chain.steps.as_slice(), [step] if step.name == "slow" && step.is_call())
            && chain
                .root
                .parent()
                .is_some_and(|p| p.kind() == "expression_statement")
    }

    fn build<'t>(&self, chain: &Chain<'t>, _ctx: &RuleContext) -> Synthesis<'t> {
        match chain.root.parent() {
            Some(statement) => Synthesis::RemoveStatement(statement),
            None => Synthesis::Skip("this.slow outside a statement".to_string()),
        }
    }
}

/// What the pass found, for import planning
#[derive(Debug, Default)]
pub struct RegistrationUsage {
    /// `node:test` names the file calls after migration
    pub names: BTreeSet<String>,
    /// Whether any registration call exists
    pub found: bool,
    /// Number of edits the pass produced
    pub edits: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    TestCase,
    Suite,
    Hook,
}

pub struct RegistrationPass<'a> {
    source: &'a str,
    usage: RegistrationUsage,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> RegistrationPass<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            usage: RegistrationUsage::default(),
            diagnostics: Vec::new(),
        }
    }

    /// Visit every registration call under `root`
    pub fn run(mut self, root: Node, edits: &mut EditSet) -> (RegistrationUsage, Vec<Diagnostic>) {
        let mut calls = Vec::new();
        crate::parser::visit_named(root, &mut |node| {
            if node.kind() == "call_expression" {
                calls.push(node);
            }
        });
        for call in calls {
            self.registration(call, edits);
        }
        (self.usage, self.diagnostics)
    }

    fn registration(&mut self, call: Node, edits: &mut EditSet) {
        let Some((base, modifier)) = registration_callee(call, self.source) else {
            return;
        };
        // already deleted, e.g. a hook that only created a sandbox
        if edits.covers(&(call.start_byte()..call.end_byte())) {
            return;
        }
        let kind = if TEST_CASE_NAMES.contains(&base) {
            Registration::TestCase
        } else if SUITE_NAMES.contains(&base) {
            Registration::Suite
        } else if HOOK_NAMES.contains(&base) {
            Registration::Hook
        } else {
            return;
        };
        self.usage.found = true;

        let renamed = match base {
            "context" => "describe",
            "specify" => "it",
            "xit" | "xspecify" => "it.skip",
            "xtest" => "test.skip",
            "xdescribe" | "xcontext" => "describe.skip",
            other => other,
        };
        if modifier.is_none() && renamed != base {
            if let Some(callee) = call.child_by_field_name("function") {
                edits.replace_text(
                    callee.start_byte()..callee.end_byte(),
                    renamed,
                    "registration-rename",
                );
                self.usage.edits += 1;
            }
        }
        let imported = renamed.split('.').next().unwrap_or(renamed);
        self.usage.names.insert(imported.to_string());

        let args = call_arguments(call);
        let Some(callback) = args.iter().rev().find(|a| is_function_literal(**a)).copied() else {
            return;
        };
        if kind != Registration::Suite {
            self.context_parameter(callback, edits);
        }
        let has_options = args.iter().any(|a| a.kind() == "object");
        self.timeout(kind, callback, has_options, edits);
    }

    /// `(done) => ...` -> `(t, done) => ...` so `done` stays the second argument
    fn context_parameter(&mut self, callback: Node, edits: &mut EditSet) {
        let params = function_parameters(callback);
        let [param] = params.as_slice() else {
            return;
        };
        let name = parameter_name(*param, self.source).unwrap_or("");
        let context = if name == "t" { "_t" } else { "t" };
        let bare = callback
            .child_by_field_name("parameter")
            .is_some_and(|p| p.id() == param.id());
        if bare {
            edits.replace_text(
                param.start_byte()..param.end_byte(),
                format!("({}, {})", context, node_text(*param, self.source)),
                "context-parameter",
            );
        } else {
            edits.insert(param.start_byte(), format!("{}, ", context), "context-parameter");
        }
        self.usage.edits += 1;
    }

    /// `this.timeout(n)` as the first statements of a `function` callback
    fn timeout(&mut self, kind: Registration, callback: Node, has_options: bool, edits: &mut EditSet) {
        if callback.kind() == "arrow_function" {
            return;
        }
        let mut applied = false;
        for statement in body_statements(callback) {
            let Some((method, args)) = this_call(statement, self.source) else {
                continue;
            };
            match method {
                "timeout" if !applied => {
                    let [value] = args.as_slice() else {
                        continue;
                    };
                    let value = node_text(*value, self.source);
                    edits.delete_statement(statement, self.source, "timeout-option");
                    applied = true;
                    self.usage.edits += 1;
                    if value == "0" || has_options {
                        continue;
                    }
                    let option = format!("{{ timeout: {} }}", value);
                    match kind {
                        Registration::Hook => edits.insert(
                            callback.end_byte(),
                            format!(", {}", option),
                            "timeout-option",
                        ),
                        _ => edits.insert(
                            callback.start_byte(),
                            format!("{}, ", option),
                            "timeout-option",
                        ),
                    }
                    debug!(timeout = value, "moved this.timeout into options");
                }
                "retries" => self.diagnostics.push(Diagnostic::warning(
                    "this.retries has no node:test equivalent; left unchanged",
                    node_to_location(statement),
                )),
                _ => {}
            }
        }
    }
}

/// `this.<method>(args)` as an expression statement
fn this_call<'t>(statement: Node<'t>, source: &'t str) -> Option<(&'t str, Vec<Node<'t>>)> {
    if statement.kind() != "expression_statement" {
        return None;
    }
    let call = statement.named_child(0)?;
    let function = call.child_by_field_name("function")?;
    if call.kind() != "call_expression" || function.kind() != "member_expression" {
        return None;
    }
    let object = function.child_by_field_name("object")?;
    let property = function.child_by_field_name("property")?;
    (object.kind() == "this").then(|| (node_text(property, source), call_arguments(call)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::TypeScriptParser;
    use crate::rewriter::synth::Style;
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> (String, RegistrationUsage) {
        let mut parser = TypeScriptParser::new().unwrap();
        let tree = parser.parse(source).unwrap();
        let mut edits = EditSet::new();
        let (usage, _) = RegistrationPass::new(source).run(tree.root_node(), &mut edits);
        (edits.apply(source, &Style::default()).output, usage)
    }

    #[test]
    fn renames_mocha_aliases() {
        let (output, usage) = run("context('a', () => { specify('b', () => {}); xit('c'); });");
        assert_eq!(
            output,
            "describe('a', () => { it('b', () => {}); it.skip('c'); });"
        );
        assert!(usage.names.contains("describe"));
        assert!(usage.names.contains("it"));
    }

    #[test]
    fn done_callback_gets_context_parameter() {
        let (output, _) = run("it('a', (done) => done());\nit('b', done => done());");
        assert_eq!(
            output,
            "it('a', (t, done) => done());\nit('b', (t, done) => done());"
        );
    }

    #[test]
    fn context_name_avoids_clash() {
        let (output, _) = run("it('a', function (t) { t(); });");
        assert_eq!(output, "it('a', function (_t, t) { t(); });");
    }

    #[test]
    fn timeout_moves_into_options() {
        let source = "it('slow', function () {\n  this.timeout(5000);\n  work();\n});\n";
        let (output, _) = run(source);
        assert_eq!(
            output,
            "it('slow', { timeout: 5000 }, function () {\n  work();\n});\n"
        );
    }

    #[test]
    fn hook_timeout_is_appended() {
        let source = "before(function () {\n  this.timeout(100);\n});\n";
        let (output, usage) = run(source);
        assert_eq!(output, "before(function () {\n}, { timeout: 100 });\n");
        assert!(usage.names.contains("before"));
    }

    #[test]
    fn zero_timeout_is_dropped() {
        let (output, _) = run("it('a', function () {\n  this.timeout(0);\n});\n");
        assert_eq!(output, "it('a', function () {\n});\n");
    }
}
