//! Reporter module for output formatting

pub mod console;
pub mod json;

pub use console::ConsoleReporter;
pub use json::JsonReporter;

use crate::{FileReport, Severity};
use serde::Serialize;
use std::path::PathBuf;

/// A file the engine could not migrate
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub file_path: PathBuf,
    pub message: String,
}

/// Totals over every processed file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub files_scanned: usize,
    pub files_changed: usize,
    pub files_written: usize,
    pub files_failed: usize,
    pub total_rewrites: usize,
    pub warnings: usize,
}

impl RunSummary {
    pub fn from_reports(reports: &[FileReport], failures: &[Failure]) -> Self {
        Self {
            files_scanned: reports.len() + failures.len(),
            files_changed: reports.iter().filter(|r| r.changed).count(),
            files_written: reports.iter().filter(|r| r.written).count(),
            files_failed: failures.len(),
            total_rewrites: reports.iter().map(FileReport::total_rewrites).sum(),
            warnings: reports
                .iter()
                .flat_map(|r| &r.diagnostics)
                .filter(|d| d.severity == Severity::Warning)
                .count(),
        }
    }
}
