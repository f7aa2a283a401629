//! Synthesized target code: a tiny expression/statement AST and its printer.
//!
//! Rules never format text by hand. They build [`Expr`] values that embed
//! original sub-expressions as [`Expr::Source`] ranges, and the printer adds
//! parentheses from operator precedence and lays out blocks with the file's
//! detected [`Style`].

use crate::parser::node_text;
use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;
use tree_sitter::Node;

/// Precedence of a primary expression (identifiers, calls, members, literals)
const PRIMARY: u8 = 20;
/// Precedence of member access and calls in callee/object position
const MEMBER: u8 = 19;
const UNARY: u8 = 15;
/// Lowest precedence allowed in argument position (excludes sequences)
const ASSIGNMENT: u8 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Original source range, re-emitted with any nested rewrites applied
    Source { range: Range<usize>, prec: u8 },
    /// Identifier or dotted path (`assert.strictEqual`)
    Ident(String),
    /// String literal; content is kept as written in the original source
    Str(String),
    /// Literal token (`0`, `true`, `undefined`, `null`)
    Lit(String),
    Member(Box<Expr>, String),
    OptionalMember(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    OptionalIndex(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    New(Box<Expr>, Vec<Expr>),
    /// Prefix operator including its spacing (`"typeof "`, `"!"`, `"..."`)
    Unary(&'static str, Box<Expr>),
    Binary(Box<Expr>, &'static str, Box<Expr>),
    Arrow(Vec<String>, Box<Expr>),
    ArrowBlock(Vec<String>, Vec<Stmt>),
    Object(Vec<(String, Expr)>),
    Array(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    If(Expr, Vec<Stmt>),
    Return(Option<Expr>),
    Throw(Expr),
    Expr(Expr),
}

impl Expr {
    /// Embed an original node, remembering how tightly it binds
    pub fn source(node: Node, source: &str) -> Expr {
        Expr::Source {
            range: node.start_byte()..node.end_byte(),
            prec: node_precedence(node, source),
        }
    }

    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::Ident(name.into())
    }

    pub fn lit(token: impl Into<String>) -> Expr {
        Expr::Lit(token.into())
    }

    pub fn string(content: impl Into<String>) -> Expr {
        Expr::Str(content.into())
    }

    /// `callee(args...)` where callee is a dotted path
    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call(Box::new(Expr::Ident(callee.into())), args)
    }

    pub fn invoke(self, args: Vec<Expr>) -> Expr {
        Expr::Call(Box::new(self), args)
    }

    pub fn member(self, property: impl Into<String>) -> Expr {
        Expr::Member(Box::new(self), property.into())
    }

    pub fn method(self, property: impl Into<String>, args: Vec<Expr>) -> Expr {
        self.member(property).invoke(args)
    }

    /// `obj.name` when `name` is a valid identifier, `obj['name']` otherwise
    pub fn property(self, name: &str) -> Expr {
        if is_identifier(name) {
            self.member(name)
        } else {
            self.index(Expr::string(name))
        }
    }

    /// `obj?.name` / `obj?.['name']`
    pub fn optional_property(self, name: &str) -> Expr {
        if is_identifier(name) {
            Expr::OptionalMember(Box::new(self), name.to_string())
        } else {
            Expr::OptionalIndex(Box::new(self), Box::new(Expr::string(name)))
        }
    }

    pub fn index(self, index: Expr) -> Expr {
        Expr::Index(Box::new(self), Box::new(index))
    }

    pub fn binary(self, op: &'static str, right: Expr) -> Expr {
        Expr::Binary(Box::new(self), op, Box::new(right))
    }

    pub fn unary(op: &'static str, operand: Expr) -> Expr {
        Expr::Unary(op, Box::new(operand))
    }

    pub fn arrow(params: &[&str], body: Expr) -> Expr {
        Expr::Arrow(params.iter().map(|p| p.to_string()).collect(), Box::new(body))
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Source { prec, .. } => *prec,
            Expr::Ident(_) | Expr::Str(_) | Expr::Lit(_) | Expr::Object(_) | Expr::Array(_) => {
                PRIMARY
            }
            Expr::Member(..)
            | Expr::OptionalMember(..)
            | Expr::Index(..)
            | Expr::OptionalIndex(..)
            | Expr::Call(..)
            | Expr::New(..) => MEMBER,
            Expr::Unary(..) => UNARY,
            Expr::Binary(_, op, _) => binary_precedence(op),
            Expr::Arrow(..) | Expr::ArrowBlock(..) => ASSIGNMENT,
        }
    }
}

/// True if `name` can be written after a dot
pub fn is_identifier(name: &str) -> bool {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER
        .get_or_init(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap())
        .is_match(name)
}

fn binary_precedence(op: &str) -> u8 {
    match op {
        "??" | "||" => 4,
        "&&" => 5,
        "|" => 6,
        "^" => 7,
        "&" => 8,
        "==" | "!=" | "===" | "!==" => 9,
        "<" | ">" | "<=" | ">=" | "instanceof" | "in" => 10,
        "<<" | ">>" | ">>>" => 11,
        "+" | "-" => 12,
        "*" | "/" | "%" => 13,
        "**" => 14,
        _ => 3,
    }
}

/// How tightly an original expression binds when re-emitted
pub fn node_precedence(node: Node, source: &str) -> u8 {
    match node.kind() {
        "identifier" | "this" | "super" | "string" | "template_string" | "number" | "true"
        | "false" | "null" | "undefined" | "regex" | "parenthesized_expression" | "array"
        | "object" | "member_expression" | "subscript_expression" | "call_expression"
        | "property_identifier" | "non_null_expression" => PRIMARY,
        "new_expression" => MEMBER,
        "unary_expression" | "await_expression" | "update_expression" => UNARY,
        "binary_expression" => node
            .child_by_field_name("operator")
            .map(|op| binary_precedence(node_text(op, source)))
            .unwrap_or(3),
        "as_expression" | "satisfies_expression" => 10,
        "ternary_expression" => 3,
        "sequence_expression" => 1,
        _ => ASSIGNMENT,
    }
}

/// Formatting conventions of the file being rewritten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Style {
    pub quote: char,
    pub semicolons: bool,
    pub indent_unit: String,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            quote: '\'',
            semicolons: true,
            indent_unit: "  ".to_string(),
        }
    }
}

impl Style {
    /// Detect quote style, semicolon usage and indent unit from a parsed file
    pub fn detect(root: Node, source: &str) -> Self {
        let mut single = 0usize;
        let mut double = 0usize;
        let mut with_semi = 0usize;
        let mut without_semi = 0usize;
        crate::parser::visit_named(root, &mut |n| match n.kind() {
            "string" => match source.as_bytes().get(n.start_byte()) {
                Some(b'\'') => single += 1,
                Some(b'"') => double += 1,
                _ => {}
            },
            "expression_statement" | "lexical_declaration" | "variable_declaration"
            | "import_statement" | "return_statement" => {
                if node_text(n, source).ends_with(';') {
                    with_semi += 1;
                } else {
                    without_semi += 1;
                }
            }
            _ => {}
        });

        Self {
            quote: if double > single { '"' } else { '\'' },
            semicolons: with_semi >= without_semi,
            indent_unit: detect_indent_unit(source),
        }
    }

    fn terminator(&self) -> &'static str {
        if self.semicolons {
            ";"
        } else {
            ""
        }
    }
}

fn detect_indent_unit(source: &str) -> String {
    let mut smallest: Option<usize> = None;
    for line in source.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with('\t') {
            return "\t".to_string();
        }
        let spaces = line.len() - line.trim_start_matches(' ').len();
        if spaces > 0 {
            smallest = Some(smallest.map_or(spaces, |s| s.min(spaces)));
        }
    }
    " ".repeat(smallest.unwrap_or(2))
}

/// Print an expression. `base_indent` is the indentation of the line the
/// expression starts on; `source` renders embedded [`Expr::Source`] ranges.
pub fn print_expr(
    expr: &Expr,
    style: &Style,
    base_indent: &str,
    source: &dyn Fn(Range<usize>) -> String,
) -> String {
    let mut printer = Printer {
        style,
        source,
        out: String::new(),
    };
    printer.expr(expr, 0, base_indent);
    printer.out
}

struct Printer<'a> {
    style: &'a Style,
    source: &'a dyn Fn(Range<usize>) -> String,
    out: String,
}

impl Printer<'_> {
    fn expr(&mut self, expr: &Expr, min_prec: u8, indent: &str) {
        let wrap = expr.precedence() < min_prec;
        if wrap {
            self.out.push('(');
        }
        match expr {
            Expr::Source { range, .. } => {
                let text = (self.source)(range.clone());
                self.out.push_str(&text);
            }
            Expr::Ident(name) | Expr::Lit(name) => self.out.push_str(name),
            Expr::Str(content) => self.string(content),
            Expr::Member(object, property) => {
                self.expr(object, MEMBER, indent);
                self.out.push('.');
                self.out.push_str(property);
            }
            Expr::OptionalMember(object, property) => {
                self.expr(object, MEMBER, indent);
                self.out.push_str("?.");
                self.out.push_str(property);
            }
            Expr::Index(object, index) => {
                self.expr(object, MEMBER, indent);
                self.out.push('[');
                self.expr(index, 0, indent);
                self.out.push(']');
            }
            Expr::OptionalIndex(object, index) => {
                self.expr(object, MEMBER, indent);
                self.out.push_str("?.[");
                self.expr(index, 0, indent);
                self.out.push(']');
            }
            Expr::Call(callee, args) => {
                self.expr(callee, MEMBER, indent);
                self.arguments(args, indent);
            }
            Expr::New(callee, args) => {
                self.out.push_str("new ");
                self.expr(callee, MEMBER, indent);
                self.arguments(args, indent);
            }
            Expr::Unary(op, operand) => {
                self.out.push_str(op);
                self.expr(operand, UNARY, indent);
            }
            Expr::Binary(left, op, right) => {
                let prec = binary_precedence(op);
                self.expr(left, prec, indent);
                self.out.push(' ');
                self.out.push_str(op);
                self.out.push(' ');
                self.expr(right, prec + 1, indent);
            }
            Expr::Arrow(params, body) => {
                self.params(params);
                self.out.push_str(" => ");
                if matches!(**body, Expr::Object(_)) {
                    self.out.push('(');
                    self.expr(body, 0, indent);
                    self.out.push(')');
                } else {
                    self.expr(body, ASSIGNMENT, indent);
                }
            }
            Expr::ArrowBlock(params, body) => {
                self.params(params);
                self.out.push_str(" => ");
                self.block(body, indent);
            }
            Expr::Array(items) => {
                self.out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(item, ASSIGNMENT, indent);
                }
                self.out.push(']');
            }
            Expr::Object(fields) => {
                if fields.is_empty() {
                    self.out.push_str("{}");
                } else {
                    self.out.push_str("{ ");
                    for (i, (key, value)) in fields.iter().enumerate() {
                        if i > 0 {
                            self.out.push_str(", ");
                        }
                        self.out.push_str(key);
                        self.out.push_str(": ");
                        self.expr(value, ASSIGNMENT, indent);
                    }
                    self.out.push_str(" }");
                }
            }
        }
        if wrap {
            self.out.push(')');
        }
    }

    fn arguments(&mut self, args: &[Expr], indent: &str) {
        self.out.push('(');
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(arg, ASSIGNMENT, indent);
        }
        self.out.push(')');
    }

    fn params(&mut self, params: &[String]) {
        self.out.push('(');
        self.out.push_str(&params.join(", "));
        self.out.push(')');
    }

    fn string(&mut self, content: &str) {
        let quote = self.style.quote;
        self.out.push(quote);
        let mut escaped = false;
        for c in content.chars() {
            if c == quote && !escaped {
                self.out.push('\\');
            }
            escaped = c == '\\' && !escaped;
            self.out.push(c);
        }
        self.out.push(quote);
    }

    fn block(&mut self, body: &[Stmt], indent: &str) {
        let inner = format!("{}{}", indent, self.style.indent_unit);
        self.out.push_str("{\n");
        for stmt in body {
            self.out.push_str(&inner);
            self.stmt(stmt, &inner);
            self.out.push('\n');
        }
        self.out.push_str(indent);
        self.out.push('}');
    }

    fn stmt(&mut self, stmt: &Stmt, indent: &str) {
        let terminator = self.style.terminator();
        match stmt {
            Stmt::If(condition, body) => {
                self.out.push_str("if (");
                self.expr(condition, 0, indent);
                self.out.push_str(") ");
                self.block(body, indent);
            }
            Stmt::Return(value) => {
                self.out.push_str("return");
                if let Some(value) = value {
                    self.out.push(' ');
                    self.expr(value, 0, indent);
                }
                self.out.push_str(terminator);
            }
            Stmt::Throw(value) => {
                self.out.push_str("throw ");
                self.expr(value, 0, indent);
                self.out.push_str(terminator);
            }
            Stmt::Expr(value) => {
                self.expr(value, 0, indent);
                self.out.push_str(terminator);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn print(expr: &Expr) -> String {
        print_expr(expr, &Style::default(), "", &|_| String::new())
    }

    #[test]
    fn parenthesizes_by_precedence() {
        let or = Expr::ident("a").binary("||", Expr::ident("b"));
        let and = or.clone().binary("&&", Expr::ident("c"));
        assert_eq!(print(&and), "(a || b) && c");
        let not = Expr::unary("!", or);
        assert_eq!(print(&not), "!(a || b)");
    }

    #[test]
    fn range_check_needs_no_parentheses() {
        let x = Expr::ident("x");
        let check = x
            .clone()
            .binary(">=", Expr::lit("1"))
            .binary("&&", x.binary("<=", Expr::lit("10")));
        assert_eq!(print(&check), "x >= 1 && x <= 10");
    }

    #[test]
    fn escapes_quote_in_string() {
        assert_eq!(print(&Expr::string("it's")), r"'it\'s'");
        assert_eq!(print(&Expr::string(r"it\'s")), r"'it\'s'");
    }

    #[test]
    fn prints_block_arrow_with_indent() {
        let body = vec![
            Stmt::If(
                Expr::ident("args.length").binary(">=", Expr::lit("1")),
                vec![Stmt::Return(Some(Expr::lit("1")))],
            ),
            Stmt::Return(Some(Expr::lit("2"))),
        ];
        let arrow = Expr::ArrowBlock(vec!["...args".to_string()], body);
        let printed = print_expr(&arrow, &Style::default(), "  ", &|_| String::new());
        assert_eq!(
            printed,
            "(...args) => {\n    if (args.length >= 1) {\n      return 1;\n    }\n    return 2;\n  }"
        );
    }

    #[test]
    fn property_falls_back_to_index() {
        let obj = Expr::ident("res");
        assert_eq!(print(&obj.clone().property("status")), "res.status");
        assert_eq!(print(&obj.clone().property("content-type")), "res['content-type']");
        assert_eq!(print(&obj.optional_property("a").optional_property("0")), "res?.a?.['0']");
    }

    #[test]
    fn object_body_arrow_is_wrapped() {
        let arrow = Expr::arrow(&[], Expr::Object(vec![]));
        assert_eq!(print(&arrow), "() => ({})");
    }
}
