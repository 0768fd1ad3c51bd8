//! In-memory `ImportStore` with transaction snapshots and injectable failures.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::store::{CompletionRecord, ImportStore};
use crate::error::ImportError;
use crate::model::{ReviewRecord, SalesRecord};

#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub sales: Vec<(i32, SalesRecord)>,
    pub reviews: Vec<ReviewRecord>,
    pub runs: Vec<CompletionRecord>,
    pub schema_created: bool,
    next_id: i32,
}

#[derive(Debug, Default)]
pub struct MemoryState {
    pub committed: Tables,
    working: Option<Tables>,
    pub fail_insert_names: HashSet<String>,
    pub fail_review_copy: bool,
    /// Insert that loses the transaction (e.g. savepoint on a dropped connection).
    pub fail_savepoint_for: Option<String>,
    pub commits: u32,
    pub rollbacks: u32,
    pub copy_calls: Vec<(&'static str, usize)>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_inserts_for(self, name: &str) -> Self {
        self.lock().fail_insert_names.insert(name.to_string());
        self
    }

    pub fn losing_connection_at(self, name: &str) -> Self {
        self.lock().fail_savepoint_for = Some(name.to_string());
        self
    }

    pub fn failing_review_copy(self) -> Self {
        self.lock().fail_review_copy = true;
        self
    }

    /// Seed a committed `import_runs` row, as if an earlier run had finished.
    pub fn with_recorded_run(self, record: CompletionRecord) -> Self {
        self.lock().committed.runs.push(record);
        self
    }

    pub fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub fn committed(&self) -> Tables {
        self.lock().committed.clone()
    }

    fn with_tx<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> Result<T, ImportError> {
        let mut state = self.lock();
        let tables = state
            .working
            .as_mut()
            .ok_or_else(|| ImportError::store("write", "no transaction in progress"))?;
        Ok(f(tables))
    }
}

#[async_trait]
impl ImportStore for MemoryStore {
    async fn begin(&mut self) -> Result<(), ImportError> {
        let mut state = self.lock();
        if state.working.is_some() {
            return Err(ImportError::store("begin", "transaction already open"));
        }
        state.working = Some(state.committed.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), ImportError> {
        let mut state = self.lock();
        let working = state
            .working
            .take()
            .ok_or_else(|| ImportError::store("commit", "no transaction in progress"))?;
        state.committed = working;
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ImportError> {
        let mut state = self.lock();
        state.working = None;
        state.rollbacks += 1;
        Ok(())
    }

    async fn ensure_schema(&mut self) -> Result<(), ImportError> {
        self.with_tx(|t| t.schema_created = true)
    }

    async fn completion_recorded(&mut self) -> Result<bool, ImportError> {
        Ok(!self.lock().committed.runs.is_empty())
    }

    async fn insert_sale(&mut self, row: &SalesRecord) -> Result<i32, ImportError> {
        {
            let state = self.lock();
            if state.fail_savepoint_for.as_deref() == Some(row.name.as_str()) {
                return Err(ImportError::store("savepoint", "connection closed"));
            }
            if state.fail_insert_names.contains(&row.name) {
                return Err(ImportError::row_rejected("sales", "injected failure"));
            }
        }
        self.with_tx(|t| {
            t.next_id += 1;
            t.sales.push((t.next_id, row.clone()));
            t.next_id
        })
    }

    async fn copy_sales(&mut self, rows: &[SalesRecord]) -> Result<u64, ImportError> {
        self.lock().copy_calls.push(("sales", rows.len()));
        self.with_tx(|t| {
            for r in rows {
                t.next_id += 1;
                t.sales.push((t.next_id, r.clone()));
            }
            rows.len() as u64
        })
    }

    async fn copy_reviews(&mut self, rows: &[ReviewRecord]) -> Result<u64, ImportError> {
        self.lock().copy_calls.push(("reviews", rows.len()));
        if self.lock().fail_review_copy {
            return Err(ImportError::store("copy finish", "injected failure"));
        }
        self.with_tx(|t| {
            t.reviews.extend_from_slice(rows);
            rows.len() as u64
        })
    }

    async fn record_completion(&mut self, record: &CompletionRecord) -> Result<(), ImportError> {
        self.with_tx(|t| t.runs.push(record.clone()))
    }
}
