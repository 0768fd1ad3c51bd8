use async_trait::async_trait;
use serde::Serialize;

use crate::config::ImportMode;
use crate::error::ImportError;
use crate::model::{ReviewRecord, SalesRecord};

/// Row written to `import_runs` in the same transaction as the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRecord {
    pub mode: ImportMode,
    pub sales_rows: i64,
    pub review_rows: i64,
}

/// Target store for one import run. All calls happen on a single connection;
/// `begin`/`commit`/`rollback` delimit the run's transaction.
#[async_trait]
pub trait ImportStore: Send {
    async fn begin(&mut self) -> Result<(), ImportError>;

    async fn commit(&mut self) -> Result<(), ImportError>;

    async fn rollback(&mut self) -> Result<(), ImportError>;

    /// Create tables if missing. Safe to run repeatedly.
    async fn ensure_schema(&mut self) -> Result<(), ImportError>;

    /// Whether a previous run recorded its completion in the store.
    async fn completion_recorded(&mut self) -> Result<bool, ImportError>;

    /// Insert one sales row and return its generated id. A rejected row is
    /// reported as `ImportError::RowRejected` and leaves the transaction
    /// usable; any other error means the transaction is lost.
    async fn insert_sale(&mut self, row: &SalesRecord) -> Result<i32, ImportError>;

    /// Bulk copy a chunk of sales rows; returns rows written.
    async fn copy_sales(&mut self, rows: &[SalesRecord]) -> Result<u64, ImportError>;

    /// Bulk copy a chunk of review rows; returns rows written.
    async fn copy_reviews(&mut self, rows: &[ReviewRecord]) -> Result<u64, ImportError>;

    async fn record_completion(&mut self, record: &CompletionRecord) -> Result<(), ImportError>;
}
