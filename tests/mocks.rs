//! sinon to `node:test` mock rewrites, including stub aggregation.

use pretty_assertions::assert_eq;
use remold::{MigrationEngine, MigrationOutcome, Severity};
use std::path::Path;

fn migrate(source: &str) -> MigrationOutcome {
    MigrationEngine::default()
        .migrate_source(source, Path::new("client.test.js"))
        .unwrap()
}

#[test]
fn stub_configurations_merge_at_the_creation_site() {
    let source = r#"const sinon = require('sinon');
const api = require('./api');

describe('client', () => {
  it('fetches', () => {
    const get = sinon.stub(api, 'get');
    get.withArgs('a').returns(1);
    get.returns(2);
    run();
  });
});
"#;
    let expected = r#"const { describe, it, mock } = require('node:test');
const api = require('./api');

describe('client', () => {
  it('fetches', () => {
    const get = mock.method(api, 'get', (...args) => {
      if (args.length >= 1 && args[0] === 'a') {
        return 1;
      }
      return 2;
    });
    run();
  });
});
"#;
    let outcome = migrate(source);
    assert_eq!(outcome.output, expected);
    assert_eq!(outcome.rewrites.get("stub-configuration"), Some(&1));
    assert_eq!(outcome.rewrites.get("stub-configuration-merged"), Some(&2));
    assert!(outcome.diagnostics.is_empty());
}

#[test]
fn matcher_branches_keep_source_order() {
    let source = r#"const get = sinon.stub(api, 'get');
get.withArgs(1).returns('one');
get.withArgs(2).returns('two');
get.returns('other');
"#;
    let outcome = migrate(source);
    let one = outcome.output.find("return 'one'").unwrap();
    let two = outcome.output.find("return 'two'").unwrap();
    let other = outcome.output.find("return 'other'").unwrap();
    assert!(one < two && two < other);
    assert_eq!(outcome.output.matches("mock.method(").count(), 1);
}

#[test]
fn same_member_in_different_tests_is_not_merged() {
    let source = r#"import sinon from 'sinon';
import { api } from './api.js';

describe('client', () => {
  it('first', () => {
    sinon.stub(api, 'get').returns(1);
  });
  it('second', () => {
    sinon.stub(api, 'get').returns(2);
  });
});
"#;
    let expected = r#"import { describe, it, mock } from 'node:test';
import { api } from './api.js';

describe('client', () => {
  it('first', () => {
    mock.method(api, 'get', () => 1);
  });
  it('second', () => {
    mock.method(api, 'get', () => 2);
  });
});
"#;
    assert_eq!(migrate(source).output, expected);
}

#[test]
fn second_stub_in_one_test_skips_the_key() {
    let source = r#"const sinon = require('sinon');

it('twice', () => {
  sinon.stub(api, 'get').returns(1);
  sinon.stub(api, 'get').returns(2);
});
"#;
    let outcome = migrate(source);
    assert!(outcome.output.contains("sinon.stub(api, 'get').returns(1);"));
    assert!(outcome.output.contains("sinon.stub(api, 'get').returns(2);"));
    let skipped = outcome
        .diagnostics
        .iter()
        .find(|d| d.key.is_some())
        .unwrap();
    assert_eq!(skipped.severity, Severity::Warning);
    assert_eq!(skipped.key.as_deref(), Some("api.get in 'twice'"));
    assert!(skipped.message.contains("more than once"));
}

#[test]
fn unsupported_configuration_leaves_the_stub_alone() {
    let source = r#"const get = sinon.stub(api, 'get');
get.onFirstCall().returns(1);
get.returns(2);
"#;
    let outcome = migrate(source);
    assert_eq!(outcome.output, source);
    let skipped = outcome
        .diagnostics
        .iter()
        .find(|d| d.key.is_some())
        .unwrap();
    assert!(skipped.message.contains("onFirstCall"));
}

#[test]
fn creation_without_configuration_installs_noop() {
    let source = "sinon.stub(api, 'ping');\n";
    let outcome = migrate(source);
    assert_eq!(
        outcome.output,
        "import { mock } from 'node:test';\n\nmock.method(api, 'ping', () => undefined);\n"
    );
}

#[test]
fn anonymous_stub_configuration_becomes_mock_implementation() {
    let source = r#"const fetch = sinon.stub();
fetch.withArgs('/a').resolves({ ok: true });
fetch.rejects(new Error('down'));
"#;
    let expected = r#"import { mock } from 'node:test';

const fetch = mock.fn();
fetch.mock.mockImplementation((...args) => {
  if (args.length >= 1 && args[0] === '/a') {
    return Promise.resolve({ ok: true });
  }
  return Promise.reject(new Error('down'));
});
"#;
    assert_eq!(migrate(source).output, expected);
}

#[test]
fn object_matchers_use_deep_equality() {
    let source = r#"const save = sinon.stub(db, 'save');
save.withArgs({ id: 1 }, sinon.match.any).returns(true);
"#;
    let outcome = migrate(source);
    assert!(outcome
        .output
        .contains("if (args.length >= 2 && isDeepStrictEqual(args[0], { id: 1 })) {"));
    assert!(outcome
        .output
        .contains("import { isDeepStrictEqual } from 'node:util';"));
}

#[test]
fn spies_and_call_inspection() {
    let source = r#"const sinon = require('sinon');
const assert = require('node:assert');

const cb = sinon.spy();
emitter.on('data', cb);
emitter.emit('data', 1);
sinon.assert.calledWith(cb, 1);
assert.strictEqual(cb.callCount, 1);
assert.deepStrictEqual(cb.firstCall.args, [1]);
"#;
    let expected = r#"const { mock } = require('node:test');
const { isDeepStrictEqual } = require('node:util');
const assert = require('node:assert');

const cb = mock.fn();
emitter.on('data', cb);
emitter.emit('data', 1);
assert.ok(cb.mock.calls.some((call) => isDeepStrictEqual(call.arguments.slice(0, 1), [1])));
assert.strictEqual(cb.mock.callCount(), 1);
assert.deepStrictEqual(cb.mock.calls[0].arguments, [1]);
"#;
    assert_eq!(migrate(source).output, expected);
}

#[test]
fn call_count_assertions() {
    let source = r#"const assert = require('node:assert');

const spy = sinon.spy(service, 'load');
sinon.assert.called(spy);
sinon.assert.notCalled(spy);
sinon.assert.callCount(spy, 3);
spy.resetHistory();
"#;
    let outcome = migrate(source);
    for line in [
        "const spy = mock.method(service, 'load');",
        "assert.ok(spy.mock.callCount() > 0);",
        "assert.strictEqual(spy.mock.callCount(), 0);",
        "assert.strictEqual(spy.mock.callCount(), 3);",
        "spy.mock.resetCalls();",
    ] {
        assert!(outcome.output.contains(line), "missing `{}`", line);
    }
}

#[test]
fn inspection_inside_assertion_composes() {
    let source = r#"const { expect } = require('chai');

const spy = sinon.spy();
expect(spy.calledOnce).to.be.true;
"#;
    let outcome = migrate(source);
    assert!(outcome
        .output
        .contains("assert.strictEqual(spy.mock.callCount() === 1, true);"));
    assert!(!outcome.output.contains("chai"));
}

#[test]
fn sandbox_disappears_with_its_uses() {
    let source = r#"const sinon = require('sinon');

describe('db', () => {
  let sandbox;
  beforeEach(() => {
    sandbox = sinon.createSandbox();
  });
  afterEach(() => {
    sandbox.restore();
  });
  it('queries', () => {
    const query = sandbox.stub(db, 'query').resolves([]);
    run();
    sinon.assert.calledOnce(query);
  });
});
"#;
    let expected = r#"const assert = require('node:assert');
const { afterEach, describe, it, mock } = require('node:test');

describe('db', () => {
  afterEach(() => {
    mock.restoreAll();
  });
  it('queries', () => {
    const query = mock.method(db, 'query', () => Promise.resolve([]));
    run();
    assert.strictEqual(query.mock.callCount(), 1);
  });
});
"#;
    let outcome = migrate(source);
    assert_eq!(outcome.output, expected);
    assert_eq!(outcome.rewrites.get("sandbox-creation"), Some(&2));
}

#[test]
fn sandbox_still_in_use_is_kept() {
    let source = r#"const sandbox = sinon.createSandbox();
sandbox.useFakeTimers();
sandbox.restore();
"#;
    let outcome = migrate(source);
    assert!(outcome.output.contains("const sandbox = sinon.createSandbox();"));
    assert!(outcome.output.contains("mock.restoreAll();"));
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.message == "sandbox 'sandbox' kept: it is still used"));
}

#[test]
fn conditional_configuration_is_left_alone() {
    let source = r#"const sinon = require('sinon');

it('guarded', () => {
  const get = sinon.stub(api, 'get');
  if (flag) get.returns(1);
  run();
});
it('looped', () => {
  const get = sinon.stub(api, 'get');
  for (const id of ids) get.withArgs(id).returns(id);
  run();
});
"#;
    let outcome = migrate(source);
    assert!(outcome.output.contains("  if (flag) get.returns(1);\n"));
    assert!(outcome
        .output
        .contains("  for (const id of ids) get.withArgs(id).returns(id);\n"));
    assert!(!outcome.output.contains("mock.method"));
    let keys: Vec<&str> = outcome
        .diagnostics
        .iter()
        .filter(|d| d.message.contains("conditional"))
        .filter_map(|d| d.key.as_deref())
        .collect();
    assert_eq!(keys, ["api.get in 'guarded'", "api.get in 'looped'"]);
}

#[test]
fn repeated_default_is_not_collapsed() {
    let source = r#"it('switches', () => {
  const get = sinon.stub(api, 'get');
  get.returns(1);
  check(api.get());
  get.returns(2);
});
"#;
    let outcome = migrate(source);
    assert!(outcome.output.contains("  get.returns(1);\n"));
    assert!(outcome.output.contains("  get.returns(2);\n"));
    let skipped = outcome
        .diagnostics
        .iter()
        .find(|d| d.key.is_some())
        .unwrap();
    assert_eq!(skipped.severity, Severity::Warning);
    assert!(skipped
        .message
        .ends_with("default behaviour configured more than once"));
}

#[test]
fn repeated_argument_tuple_is_not_collapsed() {
    let source = r#"const get = sinon.stub(api, 'get');
get.withArgs(1, sinon.match.any).returns('a');
get.withArgs(1, sinon.match.any).returns('b');
"#;
    let outcome = migrate(source);
    assert_eq!(outcome.output, source);
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.message.contains("withArgs(1, sinon.match.any) configured more than once")));
}

#[test]
fn inline_default_of_anonymous_stub_survives_argument_branches() {
    let source = r#"const s = sinon.stub().returns(1);
s.withArgs(2).returns(3);
"#;
    let expected = r#"import { mock } from 'node:test';

const s = mock.fn((...args) => {
  if (args.length >= 1 && args[0] === 2) {
    return 3;
  }
  return 1;
});
"#;
    let outcome = migrate(source);
    assert_eq!(outcome.output, expected);
    assert_eq!(outcome.rewrites.get("stub-configuration"), Some(&1));
    assert!(outcome.diagnostics.is_empty());
}

#[test]
fn test_level_branches_do_not_replace_hook_configuration() {
    let source = r#"describe('client', () => {
  let get;
  beforeEach(() => {
    get = sinon.stub(api, 'get').returns(1);
  });
  it('branches', () => {
    get.withArgs(2).returns(3);
    run();
  });
});
"#;
    let outcome = migrate(source);
    assert!(outcome.output.contains("get = mock.method(api, 'get', () => 1);"));
    assert!(outcome.output.contains("    get.withArgs(2).returns(3);\n"));
    assert!(!outcome.output.contains("mockImplementation"));
    let skipped = outcome
        .diagnostics
        .iter()
        .find(|d| d.key.as_deref() == Some("api.get in 'branches'"))
        .unwrap();
    assert!(skipped
        .message
        .contains("would replace the configuration made for api.get in 'client'"));
}
