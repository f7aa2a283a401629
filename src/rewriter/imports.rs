//! Import normalization.
//!
//! Declarations are scanned before discovery so rules can emit the names the
//! file already binds (`nodeAssert.strictEqual` when the file has
//! `import nodeAssert from 'assert'`). After discovery, the required target
//! modules are ensured exactly once and legacy declarations are removed.

use super::applier::EditSet;
use super::catalog::Names;
use super::synth::Style;
use crate::parser::{call_arguments, line_indent, node_text, node_to_location, string_literal_value, unwrap_parens};
use crate::Diagnostic;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Range;
use std::path::Path;
use tree_sitter::Node;

/// A target module requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleKind {
    /// Default binding of `node:assert`
    Assert,
    /// Named registration functions from `node:test`
    Test,
    /// Named `mock` from `node:test`
    Mock,
    /// Named `isDeepStrictEqual` from `node:util`
    Util,
}

/// Module specifiers emitted for each target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Targets {
    pub assert: String,
    pub test: String,
    pub util: String,
}

impl Default for Targets {
    fn default() -> Self {
        Self {
            assert: "node:assert".to_string(),
            test: "node:test".to_string(),
            util: "node:util".to_string(),
        }
    }
}

impl Targets {
    fn specifier(&self, kind: ModuleKind) -> &str {
        match kind {
            ModuleKind::Assert => &self.assert,
            ModuleKind::Test | ModuleKind::Mock => &self.test,
            ModuleKind::Util => &self.util,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Esm,
    CommonJs,
}

/// `node:assert/strict` and `assert` name the same logical module
pub fn logical_module(specifier: &str) -> &str {
    let specifier = specifier.strip_prefix("node:").unwrap_or(specifier);
    specifier.strip_suffix("/strict").unwrap_or(specifier)
}

/// One top-level import or require
#[derive(Debug, Clone)]
pub struct Declaration<'t> {
    pub statement: Node<'t>,
    pub specifier: String,
    pub dialect: Dialect,
    /// Default, namespace or whole-module binding
    pub default: Option<String>,
    /// Named bindings as (imported, local)
    pub named: Vec<(String, String)>,
    /// `{ ... }` clause of an import or destructuring pattern of a require
    pub named_clause: Option<Node<'t>>,
    /// Identifier of an ESM default import
    pub default_node: Option<Node<'t>>,
    pub namespace: bool,
}

impl Declaration<'_> {
    pub fn logical(&self) -> &str {
        logical_module(&self.specifier)
    }

    pub fn locals(&self) -> impl Iterator<Item = &str> {
        self.default
            .as_deref()
            .into_iter()
            .chain(self.named.iter().map(|(_, local)| local.as_str()))
    }

    fn local_for(&self, imported: &str) -> Option<&str> {
        self.named
            .iter()
            .find(|(name, _)| name == imported)
            .map(|(_, local)| local.as_str())
    }
}

/// Top-level declarations of a file
#[derive(Debug, Default)]
pub struct ImportScan<'t> {
    pub declarations: Vec<Declaration<'t>>,
    /// `'use strict'` directive, if the file starts with one
    pub directive: Option<Node<'t>>,
    /// First top-level statement that is not a directive
    pub first_statement: Option<Node<'t>>,
    /// Every name bound by a top-level declaration
    pub bound: HashSet<String>,
}

/// `require('x')` -> `x`
fn required_module(node: Node, source: &str) -> Option<String> {
    let node = unwrap_parens(node);
    if node.kind() != "call_expression" {
        return None;
    }
    let function = node.child_by_field_name("function")?;
    if function.kind() != "identifier" || node_text(function, source) != "require" {
        return None;
    }
    string_literal_value(*call_arguments(node).first()?, source)
}

/// Module required at the bottom of a chain: `require('chai').expect`
fn chained_require(node: Node, source: &str) -> Option<String> {
    let chain = super::chain::walk(unwrap_parens(node), source);
    required_module(chain.subject, source)
}

impl<'t> ImportScan<'t> {
    pub fn scan(root: Node<'t>, source: &str) -> Self {
        let mut scan = ImportScan::default();
        let mut cursor = root.walk();
        for statement in root.named_children(&mut cursor) {
            match statement.kind() {
                "comment" | "hash_bang_line" => continue,
                "expression_statement" => {
                    let Some(expr) = statement.named_child(0) else {
                        continue;
                    };
                    if expr.kind() == "string" && scan.first_statement.is_none() {
                        scan.directive = Some(statement);
                        continue;
                    }
                    if let Some(specifier) = chained_require(expr, source) {
                        scan.declarations.push(Declaration {
                            statement,
                            specifier,
                            dialect: Dialect::CommonJs,
                            default: None,
                            named: Vec::new(),
                            named_clause: None,
                            default_node: None,
                            namespace: false,
                        });
                    }
                }
                "import_statement" => {
                    if let Some(declaration) = esm_declaration(statement, source) {
                        scan.bound.extend(declaration.locals().map(str::to_string));
                        scan.declarations.push(declaration);
                    }
                }
                "lexical_declaration" | "variable_declaration" => {
                    scan.bind_names(statement, source);
                    if let Some(declaration) = cjs_declaration(statement, source) {
                        scan.declarations.push(declaration);
                    }
                }
                "function_declaration" | "class_declaration" => {
                    if let Some(name) = statement.child_by_field_name("name") {
                        scan.bound.insert(node_text(name, source).to_string());
                    }
                }
                _ => {}
            }
            if scan.first_statement.is_none() {
                scan.first_statement = Some(statement);
            }
        }
        scan
    }

    fn bind_names(&mut self, statement: Node, source: &str) {
        crate::parser::visit_named(statement, &mut |n| {
            let bound = match n.kind() {
                "variable_declarator" => n
                    .child_by_field_name("name")
                    .filter(|name| name.kind() == "identifier"),
                "shorthand_property_identifier_pattern" => Some(n),
                _ => None,
            };
            if let Some(name) = bound {
                self.bound.insert(node_text(name, source).to_string());
            }
        });
    }

    /// Existing declaration importing the same logical module
    pub fn find(&self, specifier: &str) -> Option<&Declaration<'t>> {
        let logical = logical_module(specifier);
        self.declarations.iter().find(|d| d.logical() == logical)
    }

    /// ESM or CommonJS, from the extension first and existing declarations second
    pub fn dialect(&self, path: &Path) -> Dialect {
        match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
            "mjs" | "mts" => Dialect::Esm,
            "cjs" | "cts" => Dialect::CommonJs,
            _ => {
                if self.declarations.iter().any(|d| d.dialect == Dialect::Esm) {
                    Dialect::Esm
                } else if self.declarations.iter().any(|d| d.dialect == Dialect::CommonJs) {
                    Dialect::CommonJs
                } else {
                    Dialect::Esm
                }
            }
        }
    }

    /// Names rewritten code must use, honouring existing bindings
    pub fn resolve_names(&self, targets: &Targets) -> Names {
        let mut names = Names::default();
        let existing_assert = self.find(&targets.assert).and_then(|d| {
            let strict_module = d.specifier.ends_with("/strict");
            d.default
                .as_deref()
                .map(|local| (local, strict_module))
                .or_else(|| d.local_for("strict").map(|local| (local, true)))
        });
        match existing_assert {
            Some((existing, strict)) => {
                names.assert = existing.to_string();
                names.assert_strict = strict;
            }
            None => {
                if self.bound.contains("assert") {
                    names.assert = "nodeAssert".to_string();
                }
                names.assert_strict = targets.assert.ends_with("/strict");
            }
        }
        if let Some(local) = self.find(&targets.test).and_then(|d| d.local_for("mock")) {
            names.mock = local.to_string();
        }
        if let Some(local) = self
            .find(&targets.util)
            .and_then(|d| d.local_for("isDeepStrictEqual"))
        {
            names.util = local.to_string();
        }
        if let Some(local) = self.find("sinon").and_then(|d| d.default.clone()) {
            names.sinon = local;
        }
        if let Some(chai) = self.find("chai") {
            if let Some(local) = &chai.default {
                names.chai = local.clone();
            }
            if let Some(local) = chai.local_for("expect") {
                names.expect = local.to_string();
            }
        }
        if let Some(local) = self.find("should").and_then(|d| d.default.clone()) {
            names.should = local;
        }
        names
    }
}

fn esm_declaration<'t>(statement: Node<'t>, source: &str) -> Option<Declaration<'t>> {
    if node_text(statement, source).starts_with("import type") {
        return None;
    }
    let specifier = string_literal_value(statement.child_by_field_name("source")?, source)?;
    let mut declaration = Declaration {
        statement,
        specifier,
        dialect: Dialect::Esm,
        default: None,
        named: Vec::new(),
        named_clause: None,
        default_node: None,
        namespace: false,
    };
    let mut cursor = statement.walk();
    let clause = statement
        .named_children(&mut cursor)
        .find(|c| c.kind() == "import_clause");
    let Some(clause) = clause else {
        return Some(declaration);
    };
    let mut cursor = clause.walk();
    for part in clause.named_children(&mut cursor) {
        match part.kind() {
            "identifier" => {
                declaration.default = Some(node_text(part, source).to_string());
                declaration.default_node = Some(part);
            }
            "namespace_import" => {
                let mut inner = part.walk();
                let name = part
                    .named_children(&mut inner)
                    .find(|c| c.kind() == "identifier");
                declaration.default = name.map(|n| node_text(n, source).to_string());
                declaration.namespace = true;
            }
            "named_imports" => {
                declaration.named_clause = Some(part);
                let mut inner = part.walk();
                for specifier in part.named_children(&mut inner) {
                    if specifier.kind() != "import_specifier" {
                        continue;
                    }
                    let Some(name) = specifier.child_by_field_name("name") else {
                        continue;
                    };
                    let imported = node_text(name, source).to_string();
                    let local = specifier
                        .child_by_field_name("alias")
                        .map(|a| node_text(a, source).to_string())
                        .unwrap_or_else(|| imported.clone());
                    declaration.named.push((imported, local));
                }
            }
            _ => {}
        }
    }
    Some(declaration)
}

fn cjs_declaration<'t>(statement: Node<'t>, source: &str) -> Option<Declaration<'t>> {
    let mut cursor = statement.walk();
    let declarators: Vec<Node> = statement
        .named_children(&mut cursor)
        .filter(|c| c.kind() == "variable_declarator")
        .collect();
    let [declarator] = declarators.as_slice() else {
        return None;
    };
    let value = unwrap_parens(declarator.child_by_field_name("value")?);
    let chain = super::chain::walk(value, source);
    let specifier = required_module(chain.subject, source)?;
    let pattern = declarator.child_by_field_name("name")?;
    let mut declaration = Declaration {
        statement,
        specifier,
        dialect: Dialect::CommonJs,
        default: None,
        named: Vec::new(),
        named_clause: None,
        default_node: None,
        namespace: false,
    };
    match pattern.kind() {
        "identifier" => {
            let local = node_text(pattern, source).to_string();
            match chain.steps.first() {
                // `const expect = require('chai').expect`
                Some(step) => declaration.named.push((step.name.clone(), local)),
                None => declaration.default = Some(local),
            }
        }
        "object_pattern" if !chain.steps.is_empty() => {}
        "object_pattern" => {
            declaration.named_clause = Some(pattern);
            let mut inner = pattern.walk();
            for property in pattern.named_children(&mut inner) {
                match property.kind() {
                    "shorthand_property_identifier_pattern" => {
                        let name = node_text(property, source).to_string();
                        declaration.named.push((name.clone(), name));
                    }
                    "pair_pattern" => {
                        let key = property.child_by_field_name("key");
                        let value = property.child_by_field_name("value");
                        if let (Some(key), Some(value)) = (key, value) {
                            declaration.named.push((
                                node_text(key, source).to_string(),
                                node_text(value, source).to_string(),
                            ));
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
    Some(declaration)
}

/// True if `name` is referenced outside every `exclude` range and every edit
pub fn is_still_referenced(
    root: Node,
    source: &str,
    name: &str,
    exclude: &[Range<usize>],
    edits: &EditSet,
) -> bool {
    let mut referenced = false;
    crate::parser::visit_named(root, &mut |n| {
        if referenced
            || !matches!(n.kind(), "identifier" | "shorthand_property_identifier")
            || node_text(n, source) != name
        {
            return;
        }
        let range = n.start_byte()..n.end_byte();
        let excluded = exclude
            .iter()
            .any(|r| r.start <= range.start && range.end <= r.end);
        if !excluded && !edits.covers(&range) {
            referenced = true;
        }
    });
    referenced
}

/// What the rewritten file needs from its declarations
#[derive(Debug, Default)]
pub struct ImportRequest {
    pub modules: BTreeSet<ModuleKind>,
    /// Registration names to import from the test module
    pub test_names: BTreeSet<String>,
    /// Legacy module specifiers whose declarations should go
    pub legacy: Vec<&'static str>,
}

#[derive(Debug, Default)]
struct Need {
    default: Option<String>,
    named: Vec<String>,
}

/// Plans import edits: ensure targets, drop legacy declarations
pub struct ImportNormalizer<'s, 't> {
    pub scan: &'s ImportScan<'t>,
    pub names: &'s Names,
    pub targets: &'s Targets,
    pub dialect: Dialect,
    pub style: &'s Style,
}

impl<'s, 't> ImportNormalizer<'s, 't> {
    /// Add import edits to `edits`; returns diagnostics for legacy
    /// declarations that are still needed
    pub fn plan(
        &self,
        request: &ImportRequest,
        root: Node<'t>,
        source: &str,
        edits: &mut EditSet,
    ) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let mut removed: Vec<Range<usize>> = Vec::new();

        // names re-imported from the test module no longer need the legacy one
        let provided = if request.modules.contains(&ModuleKind::Test) {
            request.test_names.clone()
        } else {
            BTreeSet::new()
        };
        for declaration in &self.scan.declarations {
            if !request.legacy.iter().any(|m| *m == declaration.logical()) {
                continue;
            }
            let range = declaration.statement.start_byte()..declaration.statement.end_byte();
            let still_used: Vec<&str> = declaration
                .locals()
                .filter(|local| !provided.contains(*local))
                .filter(|local| is_still_referenced(root, source, local, std::slice::from_ref(&range), edits))
                .collect();
            if still_used.is_empty() {
                removed.push(range);
                edits.delete_statement(declaration.statement, source, "legacy-import");
            } else {
                diagnostics.push(Diagnostic::warning(
                    format!(
                        "'{}' import kept: {} still referenced",
                        declaration.specifier,
                        still_used.join(", ")
                    ),
                    node_to_location(declaration.statement),
                ));
            }
        }

        let mut new_declarations = Vec::new();
        for (specifier, need) in self.needs(request) {
            match self.scan.find(specifier) {
                Some(existing) => {
                    if let Some(text) = self.augment(existing, &need, edits) {
                        new_declarations.push(text);
                    }
                }
                None => new_declarations.push(self.declaration(specifier, &need)),
            }
        }
        if !new_declarations.is_empty() {
            self.insert(new_declarations, source, edits);
        }
        diagnostics
    }

    /// Requirements grouped by module specifier, in a stable order
    fn needs(&self, request: &ImportRequest) -> Vec<(&'s str, Need)> {
        let mut grouped: BTreeMap<ModuleKind, (&'s str, Need)> = BTreeMap::new();
        let mut by_specifier: BTreeMap<&str, ModuleKind> = BTreeMap::new();
        for kind in &request.modules {
            let specifier = self.targets.specifier(*kind);
            let slot = *by_specifier.entry(specifier).or_insert(*kind);
            let (_, need) = grouped.entry(slot).or_insert_with(|| (specifier, Need::default()));
            match kind {
                ModuleKind::Assert => need.default = Some(self.names.assert.clone()),
                ModuleKind::Test => need.named.extend(request.test_names.iter().cloned()),
                ModuleKind::Mock => need.named.push("mock".to_string()),
                ModuleKind::Util => need.named.push("isDeepStrictEqual".to_string()),
            }
        }
        grouped.into_values().collect()
    }

    /// Edit an existing declaration to add what is missing. Returns a new
    /// declaration when the existing one cannot be extended.
    fn augment(&self, existing: &Declaration, need: &Need, edits: &mut EditSet) -> Option<String> {
        let missing: Vec<String> = need
            .named
            .iter()
            .filter(|name| existing.local_for(name).is_none())
            .cloned()
            .collect();
        let missing_default = need
            .default
            .as_ref()
            .filter(|_| existing.default.is_none() && existing.local_for("strict").is_none());

        let mut fallback = Need::default();
        if let Some(default) = missing_default {
            match (existing.dialect, existing.named_clause.and_then(|c| c.parent())) {
                (Dialect::Esm, Some(clause)) if clause.kind() == "import_clause" => {
                    edits.insert(clause.start_byte(), format!("{}, ", default), "import");
                }
                _ => fallback.default = Some(default.clone()),
            }
        }
        if !missing.is_empty() {
            let list = missing.join(", ");
            match (existing.named_clause, existing.default_node) {
                (Some(clause), _) => {
                    let mut cursor = clause.walk();
                    let last = clause
                        .named_children(&mut cursor)
                        .filter(|c| c.kind() != "comment")
                        .last();
                    match last {
                        Some(last) => edits.insert(last.end_byte(), format!(", {}", list), "import"),
                        None => edits.replace_text(
                            clause.start_byte()..clause.end_byte(),
                            format!("{{ {} }}", list),
                            "import",
                        ),
                    }
                }
                (None, Some(default)) if !existing.namespace => {
                    edits.insert(default.end_byte(), format!(", {{ {} }}", list), "import");
                }
                _ => fallback.named = missing,
            }
        }
        (fallback.default.is_some() || !fallback.named.is_empty())
            .then(|| self.declaration(&existing.specifier, &fallback))
    }

    fn declaration(&self, specifier: &str, need: &Need) -> String {
        let quote = self.style.quote;
        let semi = if self.style.semicolons { ";" } else { "" };
        let module = format!("{q}{}{q}", specifier, q = quote);
        let mut lines = Vec::new();
        if let Some(default) = &need.default {
            lines.push(match self.dialect {
                Dialect::Esm => format!("import {} from {}{}", default, module, semi),
                Dialect::CommonJs => format!("const {} = require({}){}", default, module, semi),
            });
        }
        if !need.named.is_empty() {
            let names = need.named.join(", ");
            lines.push(match self.dialect {
                Dialect::Esm => format!("import {{ {} }} from {}{}", names, module, semi),
                Dialect::CommonJs => format!("const {{ {} }} = require({}){}", names, module, semi),
            });
        }
        lines.join("\n")
    }

    /// Insert new declarations at the first existing one, after a
    /// `'use strict'` directive, or before the first statement
    fn insert(&self, declarations: Vec<String>, source: &str, edits: &mut EditSet) {
        let block = declarations.join("\n");
        if let Some(first) = self.scan.declarations.first() {
            let at = line_start(source, first.statement.start_byte());
            let indent = line_indent(source, at);
            edits.insert(at, format!("{}{}\n", indent, block), "import");
            return;
        }
        if let Some(directive) = self.scan.directive {
            let end = directive.end_byte();
            let at = source[end..].find('\n').map(|i| end + i + 1);
            match at {
                Some(at) => edits.insert(at, format!("{}\n", block), "import"),
                None => edits.insert(end, format!("\n{}\n", block), "import"),
            }
            return;
        }
        let at = self
            .scan
            .first_statement
            .map(|s| line_start(source, s.start_byte()))
            .unwrap_or(0);
        edits.insert(at, format!("{}\n\n", block), "import");
    }
}

fn line_start(source: &str, byte: usize) -> usize {
    source[..byte].rfind('\n').map_or(0, |i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::TypeScriptParser;

    #[test]
    fn logical_module_ignores_prefix_and_strict() {
        assert_eq!(logical_module("node:assert/strict"), "assert");
        assert_eq!(logical_module("assert"), "assert");
        assert_eq!(logical_module("node:test"), "test");
    }

    #[test]
    fn scans_esm_and_cjs_declarations() {
        let source = r#"'use strict';
import nodeAssert from 'assert';
import { describe as suite, it } from 'node:test';
const { expect } = require('chai');
require('should');
"#;
        let mut parser = TypeScriptParser::new().unwrap();
        let tree = parser.parse(source).unwrap();
        let scan = ImportScan::scan(tree.root_node(), source);
        assert!(scan.directive.is_some());
        assert_eq!(scan.declarations.len(), 4);
        let names = scan.resolve_names(&Targets::default());
        assert_eq!(names.assert, "nodeAssert");
        assert_eq!(names.expect, "expect");
        let test = scan.find("node:test").unwrap();
        assert_eq!(test.local_for("describe"), Some("suite"));
        assert_eq!(scan.declarations[3].logical(), "should");
    }

    #[test]
    fn dialect_prefers_extension() {
        let source = "const chai = require('chai');";
        let mut parser = TypeScriptParser::new().unwrap();
        let tree = parser.parse(source).unwrap();
        let scan = ImportScan::scan(tree.root_node(), source);
        assert_eq!(scan.dialect(Path::new("a.test.js")), Dialect::CommonJs);
        assert_eq!(scan.dialect(Path::new("a.test.mjs")), Dialect::Esm);
    }

    #[test]
    fn conflicting_assert_binding_gets_fresh_name() {
        let source = "const { assert } = require('chai');";
        let mut parser = TypeScriptParser::new().unwrap();
        let tree = parser.parse(source).unwrap();
        let scan = ImportScan::scan(tree.root_node(), source);
        assert_eq!(scan.resolve_names(&Targets::default()).assert, "nodeAssert");
    }
}
