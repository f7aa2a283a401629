//! Membership, containment, ranges and type checks.
//!
//! Ordered from the most specific shape to the most general one. Checks
//! that reduce to a boolean predicate go through [`predicate`], so a negated
//! source becomes `assert.strictEqual(pred, false)`.

use super::{assert_call, build_sync, pick, predicate, AssertionRule, AssertionView};
use crate::parser::string_literal_value;
use crate::rewriter::catalog::RuleContext;
use crate::rewriter::chain::Step;
use crate::rewriter::synth::Expr;

pub struct MembershipRule;

impl AssertionRule for MembershipRule {
    fn name(&self) -> &'static str {
        "membership"
    }

    fn build(&self, view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
        nested_property(view, ctx)
            .or_else(|| own_property(view, ctx))
            .or_else(|| property(view, ctx))
            .or_else(|| length(view, ctx))
            .or_else(|| range(view, ctx))
            .or_else(|| affix(view, ctx))
            .or_else(|| include(view, ctx))
            .or_else(|| pattern(view, ctx))
            .or_else(|| instance(view, ctx))
            .or_else(|| type_check(view, ctx))
    }
}

fn literal(step: &Step<'_>, index: usize, ctx: &RuleContext) -> Option<String> {
    step.args()
        .get(index)
        .and_then(|arg| string_literal_value(*arg, ctx.source))
}

fn compare_value(view: &AssertionView<'_>, ctx: &RuleContext, actual: Expr, expected: Expr) -> Expr {
    let method = match (view.deep, view.negated) {
        (false, false) => "strictEqual",
        (false, true) => "notStrictEqual",
        (true, false) => "deepStrictEqual",
        (true, true) => "notDeepStrictEqual",
    };
    assert_call(ctx, method, vec![actual, expected])
}

/// `nested.property('a.b[0]')`, `propertyByPath('a', 'b')`
fn nested_property(view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
    let (segments, expected) = if let Some(word) = view
        .called(&["property"], 1..=2)
        .filter(|_| view.nested)
    {
        let path = literal(word, 0, ctx)?;
        let segments: Vec<String> = path
            .replace('[', ".")
            .replace(']', "")
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        (segments, word.args().get(1).map(|v| ctx.embed(*v)))
    } else if let Some(word) = view.called(&["propertyByPath"], 1..=usize::MAX) {
        let segments = (0..word.args().len())
            .map(|i| literal(word, i, ctx))
            .collect::<Option<Vec<_>>>()?;
        (segments, None)
    } else {
        return None;
    };
    if segments.is_empty() {
        return None;
    }

    let access = segments
        .iter()
        .fold(view.value.clone(), |acc, segment| acc.optional_property(segment));
    Some(match expected {
        Some(expected) => compare_value(view, ctx, access, expected),
        None => assert_call(
            ctx,
            pick(view.negated, "notStrictEqual", "strictEqual"),
            vec![access, Expr::lit("undefined")],
        ),
    })
}

/// `own.property('p')`, `ownProperty('p')`
fn own_property(view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
    let word = view
        .called(&["ownProperty", "haveOwnProperty"], 1..=1)
        .or_else(|| view.called(&["property"], 1..=1).filter(|_| view.own))?;
    let name = ctx.embed(word.args()[0]);
    let pred = Expr::call("Object.hasOwn", vec![view.value.clone(), name]);
    Some(predicate(ctx, pred, view.negated))
}

/// `property('p')`, `property('p', v)`, `property('p').that.equals(v)`
fn property(view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
    let word = view.words.first()?;
    if word.name != "property" || !word.is_call() || view.own || view.nested {
        return None;
    }
    let name = literal(word, 0, ctx)?;
    let access = view.value.clone().property(&name);
    match (word.args().len(), view.words.len()) {
        (1, 1) => {
            let pred = ctx.embed(word.args()[0]).binary("in", view.value.clone());
            Some(predicate(ctx, pred, view.negated))
        }
        (2, 1) => Some(compare_value(view, ctx, access, ctx.embed(word.args()[1]))),
        // chai switches the subject to the property value
        (1, _) => build_sync(&view.shifted(access, 1), ctx),
        _ => None,
    }
}

/// `length(n)`, `lengthOf(n)`, `length.above(n)`
fn length(view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
    let word = view.words.first()?;
    if !matches!(word.name.as_str(), "length" | "lengthOf") {
        return None;
    }
    let len = view.value.clone().member("length");
    match (word.is_call(), view.words.len()) {
        (false, n) if n > 1 => build_sync(&view.shifted(len, 1), ctx),
        (true, 1) if (1..=2).contains(&word.args().len()) => Some(assert_call(
            ctx,
            pick(view.negated, "strictEqual", "notStrictEqual"),
            vec![len, ctx.embed(word.args()[0])],
        )),
        _ => None,
    }
}

/// Numeric ranges; negation complements the operator
fn range(view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
    let value = view.value.clone();
    if let Some(word) = view.called(&["within"], 2..=2) {
        let (low, high) = (ctx.embed(word.args()[0]), ctx.embed(word.args()[1]));
        let pred = if view.negated {
            value
                .clone()
                .binary("<", low)
                .binary("||", value.binary(">", high))
        } else {
            value
                .clone()
                .binary(">=", low)
                .binary("&&", value.binary("<=", high))
        };
        return Some(assert_call(ctx, "ok", vec![pred]));
    }

    let word = view.single().filter(|w| w.args().len() == 1)?;
    let (op, complement) = match word.name.as_str() {
        "above" | "greaterThan" | "gt" => (">", "<="),
        "below" | "lessThan" | "lt" => ("<", ">="),
        "least" | "gte" | "aboveOrEqual" => (">=", "<"),
        "most" | "lte" | "belowOrEqual" => ("<=", ">"),
        _ => return None,
    };
    let op = pick(view.negated, op, complement);
    let pred = value.binary(op, ctx.embed(word.args()[0]));
    Some(assert_call(ctx, "ok", vec![pred]))
}

/// `startWith('a')`, `endWith('z')`
fn affix(view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
    let word = view.called(&["startWith", "startsWith", "endWith", "endsWith"], 1..=1)?;
    let method = if word.name.starts_with("start") {
        "startsWith"
    } else {
        "endsWith"
    };
    let pred = view
        .value
        .clone()
        .method(method, vec![ctx.embed(word.args()[0])]);
    Some(predicate(ctx, pred, view.negated))
}

/// `include(x)`, `contain(x)` on strings and arrays
fn include(view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
    let word = view.called(&["include", "includes", "contain", "contains"], 1..=1)?;
    let needle = word.args()[0];
    // object subsets and deep membership have no one-call equivalent
    if view.deep || matches!(needle.kind(), "object" | "array") {
        return None;
    }
    let pred = view
        .value
        .clone()
        .method("includes", vec![ctx.embed(needle)]);
    Some(predicate(ctx, pred, view.negated))
}

/// `match(/re/)` -> `assert.match` / `assert.doesNotMatch`
fn pattern(view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
    let word = view.called(&["match", "matches"], 1..=1)?;
    Some(assert_call(
        ctx,
        pick(view.negated, "match", "doesNotMatch"),
        vec![view.value.clone(), ctx.embed(word.args()[0])],
    ))
}

/// `instanceof(C)`, `instanceOf(C)`
fn instance(view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
    let word = view.called(&["instanceof", "instanceOf"], 1..=1)?;
    let pred = view
        .value
        .clone()
        .binary("instanceof", ctx.embed(word.args()[0]));
    Some(predicate(ctx, pred, view.negated))
}

/// `a('string')`, `an('array')`, `type('t')`, should.js `Array()`, `Number()`, ...
fn type_check(view: &AssertionView<'_>, ctx: &RuleContext) -> Option<Expr> {
    let value = view.value.clone();
    let type_name = if let Some(word) = view.called(&["a", "an", "type"], 1..=1) {
        literal(word, 0, ctx)?.to_ascii_lowercase()
    } else {
        let word = view.bare(&[
            "Array", "Object", "String", "Number", "Boolean", "Function", "Promise",
        ])?;
        word.name.to_ascii_lowercase()
    };
    let pred = match type_name.as_str() {
        "array" => Expr::call("Array.isArray", vec![value]),
        "promise" => value.binary("instanceof", Expr::ident("Promise")),
        "null" => value.binary("===", Expr::lit("null")),
        _ => Expr::unary("typeof ", value).binary("===", Expr::string(type_name.as_str())),
    };
    Some(predicate(ctx, pred, view.negated))
}
