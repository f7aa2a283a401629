//! Per-file error type

use std::path::PathBuf;
use thiserror::Error;

/// Errors that make a single file impossible to migrate.
///
/// Everything else (unmatched chains, incomplete stub configurations) is
/// reported as a [`crate::Diagnostic`] instead.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("{path} has a syntax error at {line}:{column}; file left untouched")]
    Unparseable {
        path: PathBuf,
        line: usize,
        column: usize,
    },
}
