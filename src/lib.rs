//! Remold: legacy test-code migrations for JavaScript and TypeScript
//!
//! This library rewrites should.js/chai assertions, mocha registration globals
//! and sinon stubs into `node:assert` and `node:test` equivalents. Files are
//! parsed with tree-sitter, rewrites are discovered in one read-only pass and
//! applied as byte-range edits in a second pass.

pub mod config;
pub mod error;
pub mod parser;
pub mod reporter;
pub mod rewriter;

pub use error::MigrateError;
pub use rewriter::{MigrationEngine, MigrationOutcome};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

/// One of the legacy conventions the engine knows how to migrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Migration {
    /// should.js / chai fluent assertions -> node:assert
    Assertions,
    /// mocha registration globals -> node:test imports
    Registration,
    /// sinon stubs, spies and sandboxes -> node:test mock
    Mocks,
}

impl Migration {
    /// All migrations in the order the engine runs their catalogs
    pub const ALL: [Migration; 3] = [Migration::Mocks, Migration::Assertions, Migration::Registration];

    /// Modules whose declarations are dropped once this migration touches a file
    pub fn legacy_modules(self) -> &'static [&'static str] {
        match self {
            Migration::Assertions => &[
                "chai",
                "should",
                "chai-as-promised",
                "sinon-chai",
                "should-sinon",
            ],
            Migration::Registration => &["mocha"],
            Migration::Mocks => &["sinon"],
        }
    }
}

impl std::fmt::Display for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Migration::Assertions => write!(f, "assertions"),
            Migration::Registration => write!(f, "registration"),
            Migration::Mocks => write!(f, "mocks"),
        }
    }
}

impl FromStr for Migration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "assertions" | "assert" | "should" | "chai" => Ok(Migration::Assertions),
            "registration" | "mocha" => Ok(Migration::Registration),
            "mocks" | "mock" | "sinon" => Ok(Migration::Mocks),
            other => Err(format!(
                "unknown migration '{}' (expected assertions, registration or mocks)",
                other
            )),
        }
    }
}

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Location in a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
    /// End line (optional)
    pub end_line: Option<usize>,
    /// End column (optional)
    pub end_column: Option<usize>,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            line,
            column,
            end_line: None,
            end_column: None,
        }
    }

    pub fn with_end(mut self, end_line: usize, end_column: usize) -> Self {
        self.end_line = Some(end_line);
        self.end_column = Some(end_column);
        self
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Something the engine skipped or could only partially convert.
///
/// Diagnostics never abort a file: a partially migrated file is a valid result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Location,
    /// Grouping key (for skipped stub configurations)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Diagnostic {
    pub fn info(message: impl Into<String>, location: Location) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            location,
            key: None,
        }
    }

    pub fn warning(message: impl Into<String>, location: Location) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            location,
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Per-file outcome of running the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    /// Path of the migrated file
    pub file_path: PathBuf,
    /// Migrations that were enabled for this file
    pub migrations: Vec<Migration>,
    /// Whether the rewritten text differs from the input
    pub changed: bool,
    /// Whether the rewritten text was written back to disk
    #[serde(default)]
    pub written: bool,
    /// Number of rewrites per catalog rule
    pub rewrites: BTreeMap<String, usize>,
    /// Skipped or partially converted constructs
    pub diagnostics: Vec<Diagnostic>,
}

impl FileReport {
    /// Total number of rewrites applied
    pub fn total_rewrites(&self) -> usize {
        self.rewrites.values().sum()
    }
}
