//! Console reporter with colored output

use super::{Failure, RunSummary};
use crate::{Diagnostic, FileReport, Severity};
use colored::Colorize;

/// Reporter for terminal output
pub struct ConsoleReporter {
    /// Whether to show verbose output
    verbose: bool,
    /// Whether to list only changed files
    quiet: bool,
}

impl ConsoleReporter {
    /// Create a new console reporter
    pub fn new() -> Self {
        Self {
            verbose: false,
            quiet: false,
        }
    }

    /// Enable verbose output
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// One line per changed file, no diagnostics
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Report a single file
    pub fn report(&self, report: &FileReport) {
        if self.quiet {
            self.report_quiet(report);
            return;
        }
        if !report.changed && report.diagnostics.is_empty() && !self.verbose {
            return;
        }

        let status = if report.written {
            "migrated".green().bold()
        } else if report.changed {
            "would migrate".yellow().bold()
        } else {
            "unchanged".dimmed()
        };
        println!("{} {}", status, report.file_path.display().to_string().bold());

        if report.changed {
            let counts: Vec<String> = report
                .rewrites
                .iter()
                .map(|(rule, count)| format!("{} {}", count, rule))
                .collect();
            println!("   {} {}", "↳".dimmed(), counts.join(", ").dimmed());
        }

        for diagnostic in &report.diagnostics {
            if diagnostic.severity == Severity::Info && !self.verbose {
                continue;
            }
            self.print_diagnostic(diagnostic);
        }
    }

    /// Report in quiet mode (just changed paths)
    pub fn report_quiet(&self, report: &FileReport) {
        if report.changed {
            println!("{}", report.file_path.display());
        }
    }

    /// Report multiple files with summary
    pub fn report_many(&self, reports: &[FileReport], failures: &[Failure], summary: &RunSummary) {
        for report in reports {
            self.report(report);
        }
        for failure in failures {
            eprintln!(
                "{} {}: {}",
                "error".red().bold(),
                failure.file_path.display(),
                failure.message
            );
        }
        if !self.quiet {
            self.print_summary(summary);
        }
    }

    fn print_diagnostic(&self, diagnostic: &Diagnostic) {
        let icon = match diagnostic.severity {
            Severity::Error => "✗".red(),
            Severity::Warning => "⚠".yellow(),
            Severity::Info => "ℹ".blue(),
        };
        let location = format!("L{}:{}", diagnostic.location.line, diagnostic.location.column);
        println!("   {} {} {}", icon, location.dimmed(), diagnostic.message);
        if let (Some(key), true) = (&diagnostic.key, self.verbose) {
            println!("       {} {}", "key".dimmed(), key.dimmed());
        }
    }

    fn print_summary(&self, summary: &RunSummary) {
        println!();
        println!("{}", "═".repeat(60));
        println!("{}", "Summary".bold());
        println!("{}", "═".repeat(60));
        println!(
            "   Files scanned:  {}",
            summary.files_scanned.to_string().bold()
        );
        let changed = summary.files_changed.to_string();
        println!(
            "   Files changed:  {}",
            if summary.files_changed > 0 {
                changed.green()
            } else {
                changed.normal()
            }
        );
        if summary.files_written > 0 {
            println!("   Files written:  {}", summary.files_written);
        }
        println!("   Rewrites:       {}", summary.total_rewrites);
        if summary.warnings > 0 {
            println!("   Warnings:       {}", summary.warnings.to_string().yellow());
        }
        if summary.files_failed > 0 {
            println!("   Failed:         {}", summary.files_failed.to_string().red());
        }
        if summary.files_changed > summary.files_written {
            println!(
                "   {} run with --write to apply changes",
                "→".cyan()
            );
        }
        println!();
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}
