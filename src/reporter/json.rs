//! JSON reporter for machine-readable output

use super::{Failure, RunSummary};
use crate::FileReport;
use serde::Serialize;

/// Reporter for JSON output
pub struct JsonReporter {
    /// Whether to pretty-print JSON
    pretty: bool,
}

impl JsonReporter {
    /// Create a new JSON reporter
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Enable pretty-printing
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    /// Report a single file as JSON
    pub fn report(&self, report: &FileReport) -> String {
        self.render(report, "{}")
    }

    /// Report with summary
    pub fn report_with_summary(
        &self,
        reports: &[FileReport],
        failures: &[Failure],
        summary: &RunSummary,
    ) -> String {
        let output = JsonOutput {
            results: reports,
            failures,
            summary,
        };
        self.render(&output, "{}")
    }

    fn render<T: Serialize>(&self, value: &T, fallback: &str) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|_| fallback.to_string())
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonOutput<'a> {
    results: &'a [FileReport],
    #[serde(skip_serializing_if = "no_failures")]
    failures: &'a [Failure],
    summary: &'a RunSummary,
}

fn no_failures(failures: &&[Failure]) -> bool {
    failures.is_empty()
}
