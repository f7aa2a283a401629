//! mocha registration globals to `node:test`.

use pretty_assertions::assert_eq;
use remold::{Migration, MigrationEngine, MigrationOutcome, Severity};
use std::path::Path;

fn migrate(source: &str) -> MigrationOutcome {
    MigrationEngine::default()
        .migrate_source(source, Path::new("timers.test.js"))
        .unwrap()
}

#[test]
fn mocha_suite_becomes_node_test_suite() {
    let source = r#"describe('timers', function () {
  this.timeout(5000);
  context('when idle', function () {
    specify('waits', function (done) {
      this.slow(100);
      setTimeout(done, 10);
    });
  });
});
"#;
    let expected = r#"import { describe, it } from 'node:test';

describe('timers', { timeout: 5000 }, function () {
  describe('when idle', function () {
    it('waits', function (t, done) {
      setTimeout(done, 10);
    });
  });
});
"#;
    let outcome = migrate(source);
    assert_eq!(outcome.output, expected);
    assert_eq!(outcome.rewrites.get("registration-rename"), Some(&2));
    assert_eq!(outcome.rewrites.get("slow-threshold"), Some(&1));
}

#[test]
fn pending_tests_become_skips() {
    let source = "xdescribe('later', () => {\n  xit('soon', () => {});\n});\n";
    let outcome = migrate(source);
    assert_eq!(
        outcome.output,
        "import { describe, it } from 'node:test';\n\ndescribe.skip('later', () => {\n  it.skip('soon', () => {});\n});\n"
    );
}

#[test]
fn modifiers_on_aliases_are_renamed() {
    let source = "context.only('focus', () => {\n  specify.skip('off', () => {});\n});\n";
    let outcome = migrate(source);
    assert!(outcome.output.contains("describe.only('focus', () => {"));
    assert!(outcome.output.contains("it.skip('off', () => {});"));
}

#[test]
fn existing_test_import_is_extended() {
    let source = r#"import { describe } from 'node:test';

describe('a', () => {
  before(() => {});
  it('b', () => {});
});
"#;
    let outcome = migrate(source);
    assert!(outcome
        .output
        .starts_with("import { describe, before, it } from 'node:test';\n"));
}

#[test]
fn mocha_import_is_replaced() {
    let source = r#"const { describe, it } = require('mocha');

describe('a', () => {
  it('b', () => {});
});
"#;
    let outcome = migrate(source);
    assert_eq!(
        outcome.output,
        r#"const { describe, it } = require('node:test');

describe('a', () => {
  it('b', () => {});
});
"#
    );
}

#[test]
fn retries_are_reported() {
    let source = "it('flaky', function () {\n  this.retries(2);\n  run();\n});\n";
    let outcome = migrate(source);
    assert!(outcome.output.contains("this.retries(2);"));
    let warning = outcome
        .diagnostics
        .iter()
        .find(|d| d.message.contains("this.retries"))
        .unwrap();
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.location.line, 2);
}

#[test]
fn arrow_callbacks_keep_their_timeouts() {
    // `this` is not the mocha context inside an arrow function
    let source = "it('a', () => {\n  run();\n});\n";
    let outcome = migrate(source);
    assert!(outcome.output.ends_with(source));
}

#[test]
fn registration_can_be_disabled() {
    let source = "specify('a', function (done) { done(); });\n";
    let outcome = MigrationEngine::with_migrations(&[Migration::Assertions])
        .migrate_source(source, Path::new("a.test.js"))
        .unwrap();
    assert!(!outcome.changed);
    assert_eq!(outcome.migrations, vec![Migration::Assertions]);
}
