//! Per-file migration pipeline.
//!
//! One parse, one read-only discovery pass that collects edits and stub
//! plans, then a single application pass over the original text.

use super::applier::{location_at, EditSet};
use super::catalog::{Catalog, MockBindings, RuleContext, Synthesis};
use super::chain::{is_chain_root, outermost, walk};
use super::imports::{
    is_still_referenced, ImportNormalizer, ImportRequest, ImportScan, ModuleKind, Targets,
};
use super::rules::{scan_bindings, RegistrationPass};
use super::stubs::Aggregator;
use super::synth::Style;
use crate::config::Config;
use crate::error::MigrateError;
use crate::parser::{
    body_statements, first_syntax_error, is_function_literal, node_text, node_to_location,
    registration_callee, visit_named, TypeScriptParser, HOOK_NAMES,
};
use crate::{Diagnostic, FileReport, Migration};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info, warn};
use tree_sitter::Node;

/// Result of migrating one source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// Rewritten source (identical to the input when nothing matched)
    pub output: String,
    pub changed: bool,
    /// Migrations that were enabled for the file
    pub migrations: Vec<Migration>,
    /// Number of emitted edits per rule
    pub rewrites: BTreeMap<String, usize>,
    pub diagnostics: Vec<Diagnostic>,
}

impl MigrationOutcome {
    pub fn into_report(self, path: &Path, written: bool) -> FileReport {
        FileReport {
            file_path: path.to_path_buf(),
            migrations: self.migrations,
            changed: self.changed,
            written,
            rewrites: self.rewrites,
            diagnostics: self.diagnostics,
        }
    }
}

/// Migrates files according to a [`Config`]. Shared across worker threads.
pub struct MigrationEngine {
    config: Config,
    targets: Targets,
    catalogs: Vec<Catalog>,
}

impl Default for MigrationEngine {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl MigrationEngine {
    pub fn new(config: Config) -> Self {
        let targets = config.targets.targets();
        let catalogs = Migration::ALL.into_iter().map(Catalog::for_migration).collect();
        Self {
            config,
            targets,
            catalogs,
        }
    }

    /// Engine running only the given migrations
    pub fn with_migrations(migrations: &[Migration]) -> Self {
        Self::new(Config {
            migrations: Some(migrations.to_vec()),
            ..Config::default()
        })
    }

    /// Read, migrate and optionally write back one file
    pub fn migrate_file(&self, path: &Path, write: bool) -> Result<FileReport, MigrateError> {
        let source = fs::read_to_string(path).map_err(|source| MigrateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let outcome = self.migrate_source(&source, path)?;
        let written = write && outcome.changed;
        if written {
            fs::write(path, &outcome.output).map_err(|source| MigrateError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(outcome.into_report(path, written))
    }

    /// Migrate source text. `path` selects the grammar, the import dialect
    /// and per-path config overrides; it is never read.
    pub fn migrate_source(&self, source: &str, path: &Path) -> Result<MigrationOutcome, MigrateError> {
        let parse_error = |e: anyhow::Error| MigrateError::Parse {
            path: path.to_path_buf(),
            message: format!("{:#}", e),
        };
        let mut parser = TypeScriptParser::for_file(path).map_err(parse_error)?;
        let tree = parser.parse(source).map_err(parse_error)?;
        if let Some((row, column)) = first_syntax_error(&tree) {
            return Err(MigrateError::Unparseable {
                path: path.to_path_buf(),
                line: row + 1,
                column: column + 1,
            });
        }

        let migrations = self.config.effective_for_file(path).migrations;
        let root = tree.root_node();
        let scan = ImportScan::scan(root, source);
        let names = scan.resolve_names(&self.targets);
        let mocks = if migrations.contains(&Migration::Mocks) {
            scan_bindings(root, source, &names)
        } else {
            MockBindings::default()
        };
        let ctx = RuleContext {
            source,
            names: &names,
            mocks: &mocks,
        };
        let catalogs: Vec<&Catalog> = self
            .catalogs
            .iter()
            .filter(|c| migrations.contains(&c.migration()))
            .collect();

        let mut run = Run::new(&ctx);
        run.discover(root, &catalogs);
        run.finish_stubs();
        run.remove_sandboxes(root);

        let mut test_names = BTreeSet::new();
        if migrations.contains(&Migration::Registration) {
            let (usage, diagnostics) = RegistrationPass::new(source).run(root, &mut run.edits);
            run.diagnostics.extend(diagnostics);
            if usage.found {
                run.touched.insert(Migration::Registration);
                run.requires.insert(ModuleKind::Test);
                test_names = usage.names;
                if scan.find(&self.targets.test).is_none() {
                    test_names.insert("describe".to_string());
                    test_names.insert("it".to_string());
                }
            }
        }

        // legacy bindings still in use after every rewrite
        let legacy: Vec<&str> = scan
            .declarations
            .iter()
            .filter(|d| {
                migrations
                    .iter()
                    .any(|m| m.legacy_modules().iter().any(|l| *l == d.logical()))
            })
            .flat_map(|d| d.locals())
            .filter(|local| !test_names.contains(*local))
            .collect();
        let declared: Vec<Range<usize>> = scan
            .declarations
            .iter()
            .map(|d| d.statement.start_byte()..d.statement.end_byte())
            .collect();

        let setup_ranges: Vec<Range<usize>> = run
            .setup
            .iter()
            .map(|s| s.start_byte()..s.end_byte())
            .chain(declared.iter().cloned())
            .collect();
        let pending = leftovers(root, source, &legacy, &setup_ranges, &run.edits);
        let keep_should = pending.iter().any(|l| l.should_access);
        if pending.is_empty() {
            for statement in std::mem::take(&mut run.setup) {
                run.edits.delete_statement(statement, source, "assertion-setup");
            }
        } else if !run.setup.is_empty() {
            run.diagnostics.push(Diagnostic::info(
                "assertion library setup kept: some assertions were left unchanged",
                node_to_location(run.setup[0]),
            ));
        }

        let remaining = leftovers(root, source, &legacy, &declared, &run.edits);
        if !remaining.is_empty() {
            warn!(path = %path.display(), count = remaining.len(), "legacy constructs left unchanged");
        }
        for leftover in remaining {
            run.diagnostics.push(Diagnostic::warning(
                format!("left unchanged: {}", leftover.excerpt),
                location_at(source, leftover.range.start),
            ));
        }

        let mut request = ImportRequest {
            modules: run.requires.clone(),
            test_names,
            legacy: Vec::new(),
        };
        for migration in &run.touched {
            for module in migration.legacy_modules() {
                let side_effect_only = matches!(*module, "should" | "chai");
                if keep_should && side_effect_only {
                    continue;
                }
                request.legacy.push(*module);
            }
        }
        let style = self.config.style.apply(Style::detect(root, source));
        let normalizer = ImportNormalizer {
            scan: &scan,
            names: &names,
            targets: &self.targets,
            dialect: scan.dialect(path),
            style: &style,
        };
        let import_diagnostics = normalizer.plan(&request, root, source, &mut run.edits);
        run.diagnostics.extend(import_diagnostics);

        let Run {
            edits,
            mut diagnostics,
            ..
        } = run;
        let applied = edits.apply(source, &style);
        diagnostics.extend(applied.diagnostics);
        diagnostics.sort_by(|a, b| {
            (a.location.line, a.location.column).cmp(&(b.location.line, b.location.column))
        });

        let changed = applied.output != source;
        if changed {
            let total: usize = applied.rewrites.values().sum();
            info!(path = %path.display(), rewrites = total, "migrated");
        }
        Ok(MigrationOutcome {
            output: applied.output,
            changed,
            migrations,
            rewrites: applied.rewrites,
            diagnostics,
        })
    }
}

/// Mutable state of one discovery run
struct Run<'a, 't> {
    ctx: &'a RuleContext<'a>,
    edits: EditSet,
    aggregator: Aggregator<'t>,
    /// Declarations to delete once their binding has no other use
    declarations: Vec<(Node<'t>, String)>,
    /// Assertion library setup statements, removed only if nothing is left over
    setup: Vec<Node<'t>>,
    requires: BTreeSet<ModuleKind>,
    touched: BTreeSet<Migration>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a, 't> Run<'a, 't> {
    fn new(ctx: &'a RuleContext<'a>) -> Self {
        Self {
            ctx,
            edits: EditSet::new(),
            aggregator: Aggregator::new(),
            declarations: Vec::new(),
            setup: Vec::new(),
            requires: BTreeSet::new(),
            touched: BTreeSet::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Match every chain root against the catalogs, in source order
    fn discover(&mut self, root: Node<'t>, catalogs: &[&Catalog]) {
        let mut candidates = Vec::new();
        visit_named(root, &mut |node| {
            if matches!(node.kind(), "call_expression" | "member_expression") && is_chain_root(node) {
                candidates.push(node);
            }
        });

        let ctx = self.ctx;
        for node in candidates {
            let chain = walk(node, ctx.source);
            let found = catalogs
                .iter()
                .find_map(|catalog| catalog.find_rule(&chain, ctx).map(|rule| (catalog.migration(), rule)));
            let Some((migration, rule)) = found else {
                continue;
            };
            debug!(
                rule = rule.name(),
                line = node.start_position().row + 1,
                "matched"
            );
            match rule.build(&chain, ctx) {
                Synthesis::Replace { target, expr } => {
                    self.edits.replace(target, expr, rule.name());
                    self.requires.extend(rule.requires().iter().copied());
                    self.touched.insert(migration);
                }
                Synthesis::RemoveSetup(statement) => {
                    self.setup.push(statement);
                    self.touched.insert(migration);
                }
                Synthesis::RemoveStatement(statement) => {
                    self.edits.delete_statement(statement, ctx.source, rule.name());
                    self.touched.insert(migration);
                }
                Synthesis::RemoveDeclaration { statement, binding } => {
                    self.declarations.push((statement, binding));
                }
                Synthesis::Configure(config) => {
                    self.aggregator.add(config, ctx);
                    self.touched.insert(migration);
                }
                Synthesis::Skip(reason) => {
                    self.diagnostics.push(Diagnostic::warning(
                        format!("{}: {}", rule.name(), reason),
                        node_to_location(node),
                    ));
                }
            }
        }
    }

    fn finish_stubs(&mut self) {
        let aggregator = std::mem::take(&mut self.aggregator);
        let outcome = aggregator.finish(self.ctx, &mut self.edits);
        self.requires.extend(outcome.requires);
        self.diagnostics.extend(outcome.diagnostics);
    }

    /// Delete sandbox declarations whose every other use was rewritten.
    /// `let sandbox;` and its later assignment go together.
    fn remove_sandboxes(&mut self, root: Node<'t>) {
        let source = self.ctx.source;
        visit_named(root, &mut |node| {
            if !matches!(node.kind(), "lexical_declaration" | "variable_declaration") {
                return;
            }
            let mut cursor = node.walk();
            let declarators: Vec<Node> = node
                .named_children(&mut cursor)
                .filter(|c| c.kind() == "variable_declarator")
                .collect();
            if let [declarator] = declarators.as_slice() {
                let name = declarator.child_by_field_name("name");
                let uninitialized = declarator.child_by_field_name("value").is_none();
                if let (Some(name), true) = (name, uninitialized) {
                    let name = node_text(name, source);
                    if self.ctx.mocks.sandboxes.contains(name) {
                        self.declarations.push((node, name.to_string()));
                    }
                }
            }
        });

        let mut grouped: BTreeMap<String, Vec<Node<'t>>> = BTreeMap::new();
        for (statement, binding) in std::mem::take(&mut self.declarations) {
            grouped.entry(binding).or_default().push(statement);
        }
        for (binding, statements) in grouped {
            let ranges: Vec<Range<usize>> = statements
                .iter()
                .map(|s| s.start_byte()..s.end_byte())
                .collect();
            if is_still_referenced(root, source, &binding, &ranges, &self.edits) {
                self.diagnostics.push(Diagnostic::warning(
                    format!("sandbox '{}' kept: it is still used", binding),
                    node_to_location(statements[0]),
                ));
                continue;
            }
            for statement in statements {
                let target = emptied_hook(statement, source).unwrap_or(statement);
                self.edits.delete_statement(target, source, "sandbox-creation");
            }
            self.touched.insert(Migration::Mocks);
        }
    }
}

/// The whole `beforeEach(() => { ... })` statement when `statement` is the
/// only thing its callback does
fn emptied_hook<'t>(statement: Node<'t>, source: &str) -> Option<Node<'t>> {
    let function = statement.parent()?.parent()?;
    if !is_function_literal(function) || body_statements(function) != [statement] {
        return None;
    }
    let call = function.parent()?.parent()?;
    let (base, _) = registration_callee(call, source)?;
    let hook = call.parent().filter(|p| p.kind() == "expression_statement")?;
    HOOK_NAMES.contains(&base).then_some(hook)
}

/// A legacy construct no edit covers
struct Leftover {
    range: Range<usize>,
    excerpt: String,
    should_access: bool,
}

/// Uncovered `.should` accesses and references to legacy bindings, one per
/// outermost chain
fn leftovers(
    root: Node,
    source: &str,
    legacy: &[&str],
    exclude: &[Range<usize>],
    edits: &EditSet,
) -> Vec<Leftover> {
    let mut found: Vec<Leftover> = Vec::new();
    visit_named(root, &mut |node| {
        let should_access = node.kind() == "member_expression"
            && node
                .child_by_field_name("property")
                .is_some_and(|p| node_text(p, source) == "should");
        let legacy_reference = matches!(node.kind(), "identifier" | "shorthand_property_identifier")
            && legacy.iter().any(|l| *l == node_text(node, source));
        if !should_access && !legacy_reference {
            return;
        }
        let range = node.start_byte()..node.end_byte();
        let excluded = exclude
            .iter()
            .any(|r| r.start <= range.start && range.end <= r.end);
        if excluded || edits.covers(&range) {
            return;
        }
        // `expect(x)...` continues from the call, not the callee
        let callee_of = node.parent().filter(|p| {
            p.kind() == "call_expression"
                && p.child_by_field_name("function").is_some_and(|f| f.id() == node.id())
        });
        let top = outermost(callee_of.unwrap_or(node));
        let top_range = top.start_byte()..top.end_byte();
        if found.iter().any(|l| l.range == top_range) {
            return;
        }
        found.push(Leftover {
            range: top_range,
            excerpt: excerpt(node_text(top, source)),
            should_access,
        });
    });
    found
}

fn excerpt(text: &str) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > 60 {
        format!("{}...", line.chars().take(57).collect::<String>())
    } else if line.len() < text.len() {
        format!("{}...", line)
    } else {
        line.to_string()
    }
}
