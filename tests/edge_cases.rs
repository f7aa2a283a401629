//! Dialects, grammars and file shapes the engine must cope with.

use remold::config::{Config, ConfigOverride, QuoteOverride, StyleConfig};
use remold::{Migration, MigrateError, MigrationEngine};
use std::path::Path;

fn migrate(source: &str, file: &str) -> String {
    MigrationEngine::default()
        .migrate_source(source, Path::new(file))
        .unwrap()
        .output
}

#[test]
fn typescript_annotations_survive() {
    let source = r#"import { expect } from 'chai';

const total: number = sum(1, 2) as number;
expect(total).to.equal(3);
"#;
    let output = migrate(source, "sum.test.ts");
    assert!(output.starts_with("import assert from 'node:assert';\n"));
    assert!(output.contains("const total: number = sum(1, 2) as number;"));
    assert!(output.contains("assert.strictEqual(total, 3);"));
    assert!(!output.contains("chai"));
}

#[test]
fn tsx_files_use_the_jsx_grammar() {
    let source = r#"import { expect } from 'chai';

const view = <App title="x" />;
expect(count).to.equal(1);
"#;
    let output = migrate(source, "app.test.tsx");
    assert!(output.contains("const view = <App title=\"x\" />;"));
    assert!(output.contains("assert.strictEqual(count, 1);"));
}

#[test]
fn double_quoted_files_get_double_quoted_imports() {
    let source = "const { expect } = require(\"chai\");\n\nexpect(a).to.equal(\"x\");\n";
    let output = migrate(source, "a.test.js");
    assert!(output.starts_with("const assert = require(\"node:assert\");\n"));
    assert!(output.contains("assert.strictEqual(a, \"x\");"));
}

#[test]
fn quote_override_wins_over_detection() {
    let config = Config {
        style: StyleConfig {
            quote: QuoteOverride::Double,
            ..StyleConfig::default()
        },
        ..Config::default()
    };
    let outcome = MigrationEngine::new(config)
        .migrate_source("x.should.equal(1);\n", Path::new("a.test.mjs"))
        .unwrap();
    assert!(outcome
        .output
        .starts_with("import assert from \"node:assert\";\n"));
}

#[test]
fn semicolon_free_files_stay_semicolon_free() {
    let source = "import 'should'\n\nx.should.equal(1)\ny.should.equal(2)\n";
    let output = migrate(source, "a.test.js");
    assert_eq!(
        output,
        "import assert from 'node:assert'\n\nassert.strictEqual(x, 1)\nassert.strictEqual(y, 2)\n"
    );
}

#[test]
fn empty_file_is_unchanged() {
    let outcome = MigrationEngine::default()
        .migrate_source("", Path::new("empty.test.js"))
        .unwrap();
    assert!(!outcome.changed);
    assert_eq!(outcome.output, "");
    assert!(outcome.diagnostics.is_empty());
}

#[test]
fn file_without_legacy_code_is_untouched() {
    let source = "import assert from 'node:assert';\nimport { test } from 'node:test';\n\ntest('a', () => {\n  assert.ok(true);\n});\n";
    let outcome = MigrationEngine::default()
        .migrate_source(source, Path::new("a.test.js"))
        .unwrap();
    assert!(!outcome.changed);
    assert_eq!(outcome.output, source);
}

#[test]
fn syntax_error_is_reported_with_position() {
    let source = "x.should.equal(1);\nexpect(a).to.equal(;\n";
    let err = MigrationEngine::default()
        .migrate_source(source, Path::new("broken.test.js"))
        .unwrap_err();
    match err {
        MigrateError::Unparseable { line, .. } => assert_eq!(line, 2),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn overrides_narrow_migrations_per_path() {
    let config = Config {
        overrides: vec![ConfigOverride {
            files: vec!["legacy/**".to_string()],
            migrations: Some(vec![Migration::Mocks]),
        }],
        ..Config::default()
    };
    let engine = MigrationEngine::new(config);
    let source = "x.should.equal(1);\n";

    let legacy = engine
        .migrate_source(source, Path::new("legacy/old.test.js"))
        .unwrap();
    assert!(!legacy.changed);
    assert_eq!(legacy.migrations, vec![Migration::Mocks]);

    let current = engine
        .migrate_source(source, Path::new("src/new.test.js"))
        .unwrap();
    assert!(current.changed);
}

#[test]
fn crlf_line_endings_are_handled() {
    let source = "const { expect } = require('chai');\r\n\r\nexpect(a).to.equal(1);\r\n";
    let output = migrate(source, "a.test.js");
    assert!(output.contains("assert.strictEqual(a, 1);\r\n"));
    assert!(!output.contains("chai"));
}

#[test]
fn nested_callbacks_keep_their_indentation() {
    let source = r#"const should = require('should');

describe('a', () => {
    it('b', () => {
        result.should.have.property('id', 1);
    });
});
"#;
    let output = migrate(source, "a.test.js");
    assert!(output.contains("\n        assert.strictEqual(result.id, 1);\n"));
}
