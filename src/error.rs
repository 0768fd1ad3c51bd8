//! Import errors.

use std::path::PathBuf;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that end an import run (rollback) or reject a single row.
#[derive(Error, Debug)]
pub enum ImportError {
    /// Source file could not be opened
    #[error("cannot open {}: {source}", path.display())]
    SourceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV error that cannot be confined to one chunk (I/O mid-read, header read)
    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Missing required column
    #[error("{}: missing required column {column}", path.display())]
    MissingColumn { path: PathBuf, column: &'static str },

    /// Failed to serialize a chunk for COPY
    #[error("failed to encode {table} chunk: {source}")]
    Encode {
        table: &'static str,
        #[source]
        source: BoxError,
    },

    /// Store rejected a statement or the connection failed
    #[error("store error during {op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: BoxError,
    },

    /// One row was rejected; the surrounding transaction is still usable
    #[error("{table} row rejected: {source}")]
    RowRejected {
        table: &'static str,
        #[source]
        source: BoxError,
    },

    /// Completion marker could not be read or written
    #[error("completion marker {}: {source}", path.display())]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ImportError {
    pub fn store<E>(op: &'static str, err: E) -> Self
    where
        E: Into<BoxError>,
    {
        ImportError::Store {
            op,
            source: err.into(),
        }
    }

    pub fn row_rejected<E>(table: &'static str, err: E) -> Self
    where
        E: Into<BoxError>,
    {
        ImportError::RowRejected {
            table,
            source: err.into(),
        }
    }

    /// Whether the run can carry on past this error.
    pub fn is_row_level(&self) -> bool {
        matches!(self, ImportError::RowRejected { .. })
    }

    pub fn encode<E>(table: &'static str, err: E) -> Self
    where
        E: Into<BoxError>,
    {
        ImportError::Encode {
            table,
            source: err.into(),
        }
    }
}
