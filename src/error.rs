//! Error taxonomy for the ingestion pipeline
//!
//! Per-line failures (see `parser::ParseError`) are logged and skipped by the
//! orchestrator; everything here aborts the file being processed.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("log file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A dimension row vanished between a uniqueness conflict and the
    /// follow-up lookup. The store's UNIQUE constraint guarantees this cannot
    /// happen unless the store itself is broken, so the whole import aborts.
    #[error("dimension table {table} has no row for {value:?} after conflict retry")]
    DimensionConsistency { table: &'static str, value: String },
}

impl IngestError {
    /// Map an i/o error during the initial file read, distinguishing the
    /// reported "file not found" outcome from other filesystem failures.
    pub fn from_read_error(err: std::io::Error, path: &std::path::Path) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            IngestError::FileNotFound(path.to_path_buf())
        } else {
            IngestError::Io(err)
        }
    }
}
