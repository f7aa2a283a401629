//! Remold: legacy test-code migration CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use remold::config::{build_ignore_set, is_ignored, load_config, write_starter, Config};
use remold::reporter::{ConsoleReporter, Failure, JsonReporter, RunSummary};
use remold::{FileReport, Migration, MigrationEngine};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use walkdir::WalkDir;

/// Remold: migrate should/chai, mocha and sinon tests to node:assert and node:test
#[derive(Parser, Debug)]
#[command(name = "remold")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Test file or directory to migrate (omit when using a subcommand)
    #[arg(required = true)]
    path: Option<PathBuf>,

    /// Migrations to run (default: all, or the config's selection)
    #[arg(long, short, value_delimiter = ',', value_name = "MIGRATIONS")]
    migrate: Option<Vec<Migration>>,

    /// Write changed files back to disk (default: dry run)
    #[arg(long, short)]
    write: bool,

    /// Exit with code 1 if any file would change
    #[arg(long)]
    check: bool,

    /// Print the rewritten source of a single file to stdout
    #[arg(long, conflicts_with_all = ["write", "json"])]
    print: bool,

    /// Output format as JSON
    #[arg(long, short)]
    json: bool,

    /// Quiet mode (only list changed files)
    #[arg(long, short)]
    quiet: bool,

    /// Verbose output (also enables debug logging)
    #[arg(long, short)]
    verbose: bool,

    /// Path to config file (default: search .remoldrc.json in current dir and parents)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Migrate files in parallel (default for more than ten files)
    #[arg(long)]
    parallel: bool,

    /// Number of parallel threads (default: number of CPU cores)
    #[arg(long, value_name = "N")]
    jobs: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create .remoldrc.json with sensible defaults
    Init {
        /// Directory in which to create config (default: current)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Migrations to enable (default: all)
        #[arg(long, value_delimiter = ',')]
        migrate: Option<Vec<Migration>>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

/// Initialize tracing subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if verbose { "remold=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(args: Args) -> Result<ExitCode> {
    if let Some(Commands::Init { dir, migrate }) = args.command {
        return run_init(dir.as_deref(), migrate);
    }

    let path = args
        .path
        .clone()
        .context("a path is required when not using a subcommand")?;

    // Resolve work directory for config search
    let work_dir = if path.is_file() {
        path.parent().unwrap_or(Path::new("."))
    } else {
        path.as_path()
    };

    // Load config (CLI flags override config file)
    let config = load_config(work_dir, args.config.as_deref())?.merge_with_cli(args.migrate.clone());

    if args.print {
        return run_print(&path, config);
    }

    let ignore_set = if config.ignore.is_empty() {
        None
    } else {
        Some(build_ignore_set(&config.ignore)?)
    };
    let test_patterns = config.get_test_patterns();
    let test_files = collect_test_files(&path, ignore_set.as_ref(), &test_patterns)?;

    if test_files.is_empty() {
        eprintln!("{}: No test files found", "Warning".yellow());
        return Ok(ExitCode::from(2));
    }

    if let Some(jobs) = args.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .ok();
    }

    let engine = MigrationEngine::new(config);
    let use_parallel = args.parallel || test_files.len() > 10;
    let (reports, failures) = if use_parallel {
        migrate_files_parallel(&engine, &test_files, args.write)
    } else {
        migrate_files_sequential(&engine, &test_files, args.write)
    };

    if reports.is_empty() {
        for failure in &failures {
            eprintln!(
                "{}: {}: {}",
                "Error".red(),
                failure.file_path.display(),
                failure.message
            );
        }
        eprintln!("{}: All files failed to migrate", "Error".red());
        return Ok(ExitCode::from(2));
    }

    let summary = RunSummary::from_reports(&reports, &failures);
    if args.json {
        let reporter = JsonReporter::new().pretty();
        println!(
            "{}",
            reporter.report_with_summary(&reports, &failures, &summary)
        );
    } else {
        let mut reporter = ConsoleReporter::new();
        if args.verbose {
            reporter = reporter.verbose();
        }
        if args.quiet {
            reporter = reporter.quiet();
        }
        reporter.report_many(&reports, &failures, &summary);
    }

    if args.check && summary.files_changed > summary.files_written {
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

/// `--print`: rewrite one file to stdout, diagnostics to stderr
fn run_print(path: &Path, config: Config) -> Result<ExitCode> {
    if !path.is_file() {
        anyhow::bail!("--print needs a single file: {}", path.display());
    }
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let engine = MigrationEngine::new(config);
    let outcome = engine.migrate_source(&source, path)?;
    print!("{}", outcome.output);
    for diagnostic in &outcome.diagnostics {
        eprintln!(
            "{}:{}: {}",
            path.display(),
            diagnostic.location,
            diagnostic.message
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn run_init(dir: Option<&Path>, migrations: Option<Vec<Migration>>) -> Result<ExitCode> {
    let dir = dir.unwrap_or(Path::new("."));
    if !dir.is_dir() {
        anyhow::bail!("Directory does not exist: {}", dir.display());
    }
    let config = Config::starter(migrations);
    let config_path = write_starter(dir, &config)?;
    let enabled: Vec<String> = config
        .enabled_migrations()
        .iter()
        .map(Migration::to_string)
        .collect();
    println!(
        "{}: Created {} with migrations={}",
        "Done".green().bold(),
        config_path.display(),
        enabled.join(",")
    );
    Ok(ExitCode::SUCCESS)
}

fn collect_test_files(
    path: &Path,
    ignore_set: Option<&globset::GlobSet>,
    test_patterns: &[&str],
) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        if let Some(set) = ignore_set {
            if is_ignored(path, set) {
                return Ok(vec![]);
            }
        }
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.is_dir() {
        anyhow::bail!("Path does not exist: {}", path.display());
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.file_name() != "node_modules")
        .filter_map(|e| e.ok())
    {
        let file_path = entry.path();
        if is_test_file(file_path, test_patterns) {
            if let Some(set) = ignore_set {
                if is_ignored(file_path, set) {
                    continue;
                }
            }
            files.push(file_path.to_path_buf());
        }
    }

    // Sort for consistent output
    files.sort();

    Ok(files)
}

fn is_test_file(path: &Path, test_patterns: &[&str]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    // Skip node_modules
    if path
        .components()
        .any(|c| c.as_os_str() == "node_modules")
    {
        return false;
    }

    test_patterns.iter().any(|p| name.ends_with(p))
}

fn failure(file: &Path, error: impl std::fmt::Display) -> Failure {
    Failure {
        file_path: file.to_path_buf(),
        message: error.to_string(),
    }
}

fn migrate_files_sequential(
    engine: &MigrationEngine,
    files: &[PathBuf],
    write: bool,
) -> (Vec<FileReport>, Vec<Failure>) {
    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for file in files {
        match engine.migrate_file(file, write) {
            Ok(report) => reports.push(report),
            Err(e) => failures.push(failure(file, e)),
        }
    }
    (reports, failures)
}

/// Migrate files in parallel; results keep the input order
fn migrate_files_parallel(
    engine: &MigrationEngine,
    files: &[PathBuf],
    write: bool,
) -> (Vec<FileReport>, Vec<Failure>) {
    use rayon::prelude::*;

    let results: Vec<_> = files
        .par_iter()
        .map(|file| engine.migrate_file(file, write).map_err(|e| failure(file, e)))
        .collect();

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(report) => reports.push(report),
            Err(f) => failures.push(f),
        }
    }
    (reports, failures)
}
