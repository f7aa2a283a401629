//! Config schema and deserialization

use crate::rewriter::{Style, Targets};
use crate::Migration;
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Quote preference for emitted strings and module specifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuoteOverride {
    /// Follow the majority of string literals in the file
    #[default]
    Auto,
    Single,
    Double,
}

/// Semicolon preference for emitted statements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SemicolonOverride {
    #[default]
    Auto,
    Always,
    Never,
}

/// Code style of generated code
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleConfig {
    #[serde(default)]
    pub quote: QuoteOverride,

    #[serde(default)]
    pub semicolons: SemicolonOverride,

    /// Indent unit for multi-line output, e.g. "  " or "\t"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent: Option<String>,
}

impl StyleConfig {
    /// Apply forced settings on top of the style detected in a file
    pub fn apply(&self, mut detected: Style) -> Style {
        match self.quote {
            QuoteOverride::Auto => {}
            QuoteOverride::Single => detected.quote = '\'',
            QuoteOverride::Double => detected.quote = '"',
        }
        match self.semicolons {
            SemicolonOverride::Auto => {}
            SemicolonOverride::Always => detected.semicolons = true,
            SemicolonOverride::Never => detected.semicolons = false,
        }
        if let Some(indent) = &self.indent {
            detected.indent_unit = indent.clone();
        }
        detected
    }

    fn merge_from(&mut self, base: &StyleConfig) {
        if self.quote == QuoteOverride::Auto {
            self.quote = base.quote;
        }
        if self.semicolons == SemicolonOverride::Auto {
            self.semicolons = base.semicolons;
        }
        if self.indent.is_none() {
            self.indent = base.indent.clone();
        }
    }
}

/// Module specifiers generated imports point at
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub util: Option<String>,
}

impl TargetConfig {
    pub fn targets(&self) -> Targets {
        let defaults = Targets::default();
        Targets {
            assert: self.assert.clone().unwrap_or(defaults.assert),
            test: self.test.clone().unwrap_or(defaults.test),
            util: self.util.clone().unwrap_or(defaults.util),
        }
    }

    fn merge_from(&mut self, base: &TargetConfig) {
        if self.assert.is_none() {
            self.assert = base.assert.clone();
        }
        if self.test.is_none() {
            self.test = base.test.clone();
        }
        if self.util.is_none() {
            self.util = base.util.clone();
        }
    }
}

const DEFAULT_TEST_SUFFIXES: [&str; 16] = [
    ".test.js", ".test.mjs", ".test.cjs", ".test.jsx", ".test.ts", ".test.mts", ".test.cts",
    ".test.tsx", ".spec.js", ".spec.mjs", ".spec.cjs", ".spec.jsx", ".spec.ts", ".spec.mts",
    ".spec.cts", ".spec.tsx",
];

/// Per-path override configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOverride {
    /// Glob patterns this override applies to
    pub files: Vec<String>,

    /// Migrations enabled for matched files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrations: Option<Vec<Migration>>,
}

impl ConfigOverride {
    /// Patterns match the path or any trailing part of it, so `legacy/**`
    /// applies to `./packages/api/legacy/a.test.js`. Invalid globs match nothing.
    fn applies_to(&self, file_path: &Path) -> bool {
        let matchers: Vec<GlobMatcher> = self
            .files
            .iter()
            .filter_map(|pattern| Glob::new(pattern).ok())
            .map(|glob| glob.compile_matcher())
            .collect();
        let components: Vec<Component> = file_path.components().collect();
        (0..components.len()).any(|i| {
            let tail: PathBuf = components[i..].iter().collect();
            matchers.iter().any(|m| m.is_match(&tail))
        })
    }
}

/// Root config structure for .remoldrc.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base config file, relative to this one or absolute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    /// Enabled migrations. Default: all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrations: Option<Vec<Migration>>,

    /// Glob patterns for files/directories to leave alone
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Test file name suffixes; replaces the built-in `.test.*`/`.spec.*` list
    #[serde(default)]
    pub test_patterns: Vec<String>,

    #[serde(default)]
    pub targets: TargetConfig,

    #[serde(default)]
    pub style: StyleConfig,

    /// Per-path migration selections; later entries win
    #[serde(default)]
    pub overrides: Vec<ConfigOverride>,
}

impl Config {
    /// Config for `remold init`
    pub fn starter(migrations: Option<Vec<Migration>>) -> Self {
        Self {
            migrations: Some(migrations.unwrap_or_else(|| Migration::ALL.to_vec())),
            ignore: vec!["**/node_modules/**".to_string(), "**/fixtures/**".to_string()],
            ..Self::default()
        }
    }

    /// Replace the enabled migrations with a CLI selection
    pub fn merge_with_cli(mut self, cli_migrations: Option<Vec<Migration>>) -> Self {
        if cli_migrations.is_some() {
            self.migrations = cli_migrations;
        }
        self
    }

    /// Enabled migrations, in engine order
    pub fn enabled_migrations(&self) -> Vec<Migration> {
        normalize(self.migrations.as_deref())
    }

    /// Migrations for one file after applying `overrides`
    pub fn effective_for_file(&self, file_path: &Path) -> EffectiveConfig {
        let migrations = self
            .overrides
            .iter()
            .filter(|o| o.applies_to(file_path))
            .filter_map(|o| o.migrations.as_deref())
            .last()
            .map_or_else(|| self.enabled_migrations(), |m| normalize(Some(m)));
        EffectiveConfig { migrations }
    }

    /// Merge another config into this one (for extends)
    pub fn merge_from(&mut self, base: Config) {
        if self.extends.is_none() {
            self.extends = base.extends;
        }
        if self.migrations.is_none() {
            self.migrations = base.migrations;
        }

        let mut all_ignores = base.ignore;
        all_ignores.append(&mut self.ignore);
        self.ignore = all_ignores;

        if self.test_patterns.is_empty() {
            self.test_patterns = base.test_patterns;
        }

        self.targets.merge_from(&base.targets);
        self.style.merge_from(&base.style);

        // Prepend base overrides
        let mut all_overrides = base.overrides;
        all_overrides.append(&mut self.overrides);
        self.overrides = all_overrides;
    }

    /// File name suffixes that mark a test file
    pub fn get_test_patterns(&self) -> Vec<&str> {
        if !self.test_patterns.is_empty() {
            return self.test_patterns.iter().map(String::as_str).collect();
        }
        DEFAULT_TEST_SUFFIXES.to_vec()
    }
}

/// Deduplicate and put migrations in engine order
fn normalize(selected: Option<&[Migration]>) -> Vec<Migration> {
    match selected {
        Some(selected) => Migration::ALL
            .into_iter()
            .filter(|m| selected.contains(m))
            .collect(),
        None => Migration::ALL.to_vec(),
    }
}

/// Effective configuration for a specific file (after applying overrides)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub migrations: Vec<Migration>,
}
