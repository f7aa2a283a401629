//! `.remoldrc.json` discovery and `extends` chains.
//!
//! A config may extend one other config file, named by a relative or absolute
//! path. The base is merged first and keys set in the extending file win.

mod schema;

pub use schema::{
    Config, ConfigOverride, EffectiveConfig, QuoteOverride, SemicolonOverride, StyleConfig,
    TargetConfig,
};

use anyhow::{bail, ensure, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = ".remoldrc.json";

/// Load the config for a run rooted at `work_dir`.
///
/// An explicit path must exist. Without one, the nearest `.remoldrc.json` in
/// `work_dir` or its ancestors is used, and defaults apply when there is none.
pub fn load_config(work_dir: &Path, explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(p) => {
            let path = work_dir.join(p);
            ensure!(path.is_file(), "Config file not found: {}", path.display());
            Some(path)
        }
        None => discover(work_dir),
    };
    match path {
        Some(path) => ExtendsChain::default().load(&path),
        None => Ok(Config::default()),
    }
}

fn discover(work_dir: &Path) -> Option<PathBuf> {
    work_dir
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILENAME))
        .find(|candidate| candidate.is_file())
}

/// Files loaded so far along one `extends` chain
#[derive(Default)]
struct ExtendsChain {
    files: Vec<PathBuf>,
}

impl ExtendsChain {
    fn load(&mut self, path: &Path) -> Result<Config> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if self.files.contains(&key) {
            let chain: Vec<String> = self
                .files
                .iter()
                .chain(std::iter::once(&key))
                .map(|f| f.display().to_string())
                .collect();
            bail!("Circular extends: {}", chain.join(" -> "));
        }
        self.files.push(key);

        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&text)
            .with_context(|| format!("Invalid JSON in config: {}", path.display()))?;
        if let Some(reference) = config.extends.take() {
            let base = self.load(&base_path(path, &reference)?)?;
            config.merge_from(base);
        }
        Ok(config)
    }
}

/// File named by `extends` in the config at `from`; `.json` is implied
fn base_path(from: &Path, reference: &str) -> Result<PathBuf> {
    let relative = reference.starts_with("./") || reference.starts_with("../");
    ensure!(
        relative || Path::new(reference).is_absolute(),
        "extends must be a relative or absolute path, got '{}' in {}",
        reference,
        from.display()
    );
    let mut path = from.parent().unwrap_or(Path::new(".")).join(reference);
    if path.extension().is_none() {
        path.set_extension("json");
    }
    ensure!(
        path.is_file(),
        "Extended config not found: {} (referenced from {})",
        path.display(),
        from.display()
    );
    Ok(path)
}

/// Compile `ignore` globs
pub fn build_ignore_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob =
            Glob::new(pattern).with_context(|| format!("Invalid ignore pattern: {}", pattern))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

pub fn is_ignored(path: &Path, ignore_set: &GlobSet) -> bool {
    ignore_set.is_match(path)
}

/// Write a starter config into `dir`; refuses to overwrite an existing one
pub fn write_starter(dir: &Path, config: &Config) -> Result<PathBuf> {
    let path = dir.join(CONFIG_FILENAME);
    ensure!(!path.exists(), "Config already exists: {}", path.display());
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(&path, format!("{}\n", json))
        .with_context(|| format!("Failed to write config: {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Migration;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_is_ignored_fixtures() {
        let set = build_ignore_set(&["**/fixtures/**".to_string()]).unwrap();
        assert!(is_ignored(Path::new("test/fixtures/a.test.js"), &set));
        assert!(!is_ignored(Path::new("test/a.test.js"), &set));
    }

    #[test]
    fn test_missing_custom_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load_config(dir.path(), Some(Path::new("nope.json"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_config_extends() {
        let dir = TempDir::new().unwrap();

        let base_path = dir.path().join("base.json");
        let mut base_file = fs::File::create(&base_path).unwrap();
        writeln!(
            base_file,
            r#"{{
                "migrations": ["assertions"],
                "targets": {{ "assert": "node:assert/strict" }},
                "ignore": ["**/legacy/**"]
            }}"#
        )
        .unwrap();

        let child_path = dir.path().join(CONFIG_FILENAME);
        let mut child_file = fs::File::create(&child_path).unwrap();
        writeln!(
            child_file,
            r#"{{
                "extends": "./base.json",
                "style": {{ "quote": "double" }},
                "ignore": ["**/fixtures/**"]
            }}"#
        )
        .unwrap();

        let config = load_config(dir.path(), None).unwrap();

        assert_eq!(config.enabled_migrations(), vec![Migration::Assertions]);
        assert_eq!(config.targets.targets().assert, "node:assert/strict");
        assert_eq!(config.targets.targets().test, "node:test");
        assert_eq!(config.style.quote, QuoteOverride::Double);
        assert!(config.ignore.contains(&"**/legacy/**".to_string()));
        assert!(config.ignore.contains(&"**/fixtures/**".to_string()));
    }

    #[test]
    fn test_extends_without_extension_and_from_a_subdirectory() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("shared.json"),
            r#"{ "style": { "semicolons": "never" } }"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(CONFIG_FILENAME),
            r#"{ "extends": "./shared", "migrations": ["mocks"] }"#,
        )
        .unwrap();
        let nested = dir.path().join("test").join("unit");
        fs::create_dir_all(&nested).unwrap();

        let config = load_config(&nested, None).unwrap();
        assert_eq!(config.enabled_migrations(), vec![Migration::Mocks]);
        assert_eq!(config.style.semicolons, SemicolonOverride::Never);
        assert!(config.extends.is_none());
    }

    #[test]
    fn test_package_style_extends_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILENAME),
            r#"{ "extends": "shared-remold-config" }"#,
        )
        .unwrap();
        let err = load_config(dir.path(), None).unwrap_err();
        assert!(err.to_string().contains("relative or absolute path"));
    }

    #[test]
    fn test_missing_base_names_the_referencing_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILENAME),
            r#"{ "extends": "../elsewhere/base.json" }"#,
        )
        .unwrap();
        let err = load_config(dir.path(), None).unwrap_err().to_string();
        assert!(err.contains("Extended config not found"));
        assert!(err.contains(CONFIG_FILENAME));
    }

    #[test]
    fn test_no_config_means_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(dir.path(), None).unwrap();
        assert_eq!(config.enabled_migrations(), Migration::ALL.to_vec());
    }

    #[test]
    fn test_circular_extends() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.json"), r#"{ "extends": "./b.json" }"#).unwrap();
        fs::write(dir.path().join("b.json"), r#"{ "extends": "./a.json" }"#).unwrap();
        let err = load_config(dir.path(), Some(Path::new("a.json"))).unwrap_err();
        assert!(format!("{:#}", err).contains("Circular extends"));
    }

    #[test]
    fn test_config_overrides() {
        let config: Config = serde_json::from_str(
            r#"{
                "migrations": ["assertions", "mocks"],
                "overrides": [
                    { "files": ["**/legacy/**"], "migrations": ["registration"] }
                ]
            }"#,
        )
        .unwrap();

        let effective = config.effective_for_file(Path::new("src/auth.test.js"));
        assert_eq!(
            effective.migrations,
            vec![Migration::Mocks, Migration::Assertions]
        );

        let effective = config.effective_for_file(Path::new("src/legacy/old.test.js"));
        assert_eq!(effective.migrations, vec![Migration::Registration]);
    }

    #[test]
    fn test_override_globs_match_nested_paths() {
        let config = Config {
            overrides: vec![ConfigOverride {
                files: vec!["legacy/**".to_string(), "[".to_string()],
                migrations: Some(vec![Migration::Mocks]),
            }],
            ..Config::default()
        };
        let nested = config.effective_for_file(Path::new("./packages/api/legacy/a.test.js"));
        assert_eq!(nested.migrations, vec![Migration::Mocks]);
        let other = config.effective_for_file(Path::new("./packages/api/a.test.js"));
        assert_eq!(other.migrations, Migration::ALL.to_vec());
    }

    #[test]
    fn test_write_starter_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = write_starter(dir.path(), &Config::starter(None)).unwrap();
        let written: Config = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.enabled_migrations(), Migration::ALL.to_vec());
        assert!(write_starter(dir.path(), &Config::starter(None)).is_err());
    }
}
