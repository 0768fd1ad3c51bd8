//! Run controller: gate and marker checks, then one transaction around schema,
//! sales, reviews and the completion record.

use std::future::Future;
use std::path::PathBuf;
use tracing::{error, info, warn, Instrument, Span};

use crate::config::{ImportConfig, ImportMode};
use crate::database_ops::{CompletionRecord, ImportStore};
use crate::error::ImportError;
use crate::marker::CompletionMarker;
use crate::model::{RunStatus, RunSummary};
use crate::normalization::ReviewFilter;
use crate::pipeline::{load_reviews, load_sales_linked, load_sales_streamed, read_sales};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// `RUN_IMPORT` is unset or false.
    GateDisabled,
    /// The completion marker file exists.
    MarkerPresent(PathBuf),
    /// The store already holds an `import_runs` row.
    AlreadyRecorded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Skipped(SkipReason),
    Committed(RunSummary),
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Skipped(_) => RunStatus::Skipped,
            RunOutcome::Committed(_) => RunStatus::Committed,
        }
    }
}

pub struct Importer {
    config: ImportConfig,
    marker: CompletionMarker,
    span: Span,
}

impl Importer {
    /// `span` wraps every event the run emits; the caller decides its name and fields.
    pub fn new(config: ImportConfig, span: Span) -> Self {
        let marker = CompletionMarker::new(config.marker_path.clone());
        Self {
            config,
            marker,
            span,
        }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn marker(&self) -> &CompletionMarker {
        &self.marker
    }

    /// Execute one run. `connect` is only called once both skip checks pass,
    /// and the store it yields is dropped before this returns.
    pub async fn run<S, F, Fut>(&self, connect: F) -> Result<RunOutcome, ImportError>
    where
        S: ImportStore,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S, ImportError>>,
    {
        self.run_inner(connect).instrument(self.span.clone()).await
    }

    async fn run_inner<S, F, Fut>(&self, connect: F) -> Result<RunOutcome, ImportError>
    where
        S: ImportStore,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S, ImportError>>,
    {
        if !self.config.run_import {
            info!("RUN_IMPORT is not enabled; skipping import");
            return Ok(RunOutcome::Skipped(SkipReason::GateDisabled));
        }
        if self.marker.exists() {
            info!(marker = %self.marker.path().display(), "data already imported; skipping");
            return Ok(RunOutcome::Skipped(SkipReason::MarkerPresent(
                self.marker.path().to_path_buf(),
            )));
        }

        let mut store = connect().await?;

        if store.completion_recorded().await? {
            info!("import_runs already has a completed run; skipping");
            // Commit landed but the file marker did not; restore it.
            if let Err(e) = self.marker.write("restored from import_runs") {
                warn!(error = %e, "could not restore completion marker");
            }
            return Ok(RunOutcome::Skipped(SkipReason::AlreadyRecorded));
        }

        info!(
            status = %RunStatus::Pending,
            mode = %self.config.mode,
            sales = %self.config.sales_path.display(),
            reviews = %self.config.reviews_path.display(),
            chunk_size = self.config.chunk_size,
            "starting import"
        );

        store.begin().await?;
        let mut summary = RunSummary::default();
        if let Err(e) = self.execute(&mut store, &mut summary).await {
            error!(error = %e, status = %RunStatus::RolledBack, "import failed; rolling back");
            if let Err(rb) = store.rollback().await {
                error!(error = %rb, "rollback failed");
            }
            return Err(e);
        }
        if let Err(e) = store.commit().await {
            error!(error = %e, status = %RunStatus::RolledBack, "commit failed");
            return Err(e);
        }
        drop(store);

        info!(status = %RunStatus::Committed, summary = ?summary, "import committed");
        let detail = format!(
            "mode={} sales_rows={} review_rows={}",
            self.config.mode, summary.sales_persisted, summary.reviews_persisted
        );
        if let Err(e) = self.marker.write(&detail) {
            // The import_runs row still guards against a second run.
            warn!(error = %e, "data committed but completion marker could not be written");
        }
        Ok(RunOutcome::Committed(summary))
    }

    async fn execute<S: ImportStore>(
        &self,
        store: &mut S,
        summary: &mut RunSummary,
    ) -> Result<(), ImportError> {
        let cfg = &self.config;
        store.ensure_schema().await?;

        let sales = read_sales(&cfg.sales_path, cfg.chunk_size, summary)?;
        let filter = ReviewFilter {
            min_app_id: cfg.min_app_id,
        };
        match cfg.mode {
            ImportMode::Linked => {
                let ids = load_sales_linked(store, &sales, summary).await?;
                drop(sales);
                load_reviews(
                    store,
                    &cfg.reviews_path,
                    cfg.chunk_size,
                    &filter,
                    Some(&ids),
                    summary,
                )
                .await?;
            }
            ImportMode::Streamed => {
                load_sales_streamed(store, &sales, cfg.chunk_size, summary).await?;
                drop(sales);
                load_reviews(store, &cfg.reviews_path, cfg.chunk_size, &filter, None, summary)
                    .await?;
            }
        }

        store
            .record_completion(&CompletionRecord {
                mode: cfg.mode,
                sales_rows: summary.sales_persisted as i64,
                review_rows: summary.reviews_persisted as i64,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::memory::MemoryStore;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    const SALES: &str = "Name,Platform,Year,Genre,Publisher,NA_Sales,EU_Sales,JP_Sales,Other_Sales,Global_Sales\n\
Zelda,Switch,2017,Action,Nintendo,1,1,1,1,4\n\
Zelda,WiiU,2017,Action,Nintendo,2,0,0,0,2\n";

    const REVIEWS: &str = "app_name,review_text,review_score,review_votes\n\
Zelda,Great game,9,100\n\
Unknown Game,,1,0\n";

    fn workspace(run_import: bool, mode: ImportMode) -> (TempDir, ImportConfig) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("vgsales.csv"), SALES).unwrap();
        fs::write(dir.path().join("dataset.csv"), REVIEWS).unwrap();
        let cfg = ImportConfig {
            run_import,
            sales_path: dir.path().join("vgsales.csv"),
            reviews_path: dir.path().join("dataset.csv"),
            marker_path: dir.path().join("data/imported.txt"),
            mode,
            ..ImportConfig::default()
        };
        (dir, cfg)
    }

    fn importer(cfg: ImportConfig) -> Importer {
        Importer::new(cfg, tracing::info_span!("import_test"))
    }

    async fn run_with(imp: &Importer, store: &MemoryStore) -> Result<RunOutcome, ImportError> {
        let store = store.clone();
        imp.run(move || async move { Ok(store) }).await
    }

    #[tokio::test]
    async fn gate_off_never_connects() {
        let (_dir, cfg) = workspace(false, ImportMode::Linked);
        let imp = importer(cfg);
        let connected = AtomicBool::new(false);
        let outcome = imp
            .run(|| async {
                connected.store(true, Ordering::SeqCst);
                Ok(MemoryStore::new())
            })
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Skipped(SkipReason::GateDisabled));
        assert_eq!(outcome.status(), RunStatus::Skipped);
        assert!(!connected.load(Ordering::SeqCst));
        assert!(!imp.marker().exists());
    }

    #[tokio::test]
    async fn gate_off_wins_over_marker() {
        let (_dir, cfg) = workspace(false, ImportMode::Linked);
        let imp = importer(cfg);
        imp.marker().write("earlier").unwrap();
        let store = MemoryStore::new();
        let outcome = run_with(&imp, &store).await.unwrap();
        assert_eq!(outcome, RunOutcome::Skipped(SkipReason::GateDisabled));
        assert!(store.committed().runs.is_empty());
        assert_eq!(store.lock().commits, 0);
    }

    #[tokio::test]
    async fn marker_present_skips() {
        let (_dir, cfg) = workspace(true, ImportMode::Linked);
        let imp = importer(cfg);
        imp.marker().write("earlier").unwrap();
        let store = MemoryStore::new();
        let outcome = run_with(&imp, &store).await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Skipped(SkipReason::MarkerPresent(_))
        ));
        assert!(store.committed().sales.is_empty());
        assert_eq!(store.lock().commits, 0);
    }

    #[tokio::test]
    async fn linked_run_aggregates_links_and_marks() {
        let (_dir, cfg) = workspace(true, ImportMode::Linked);
        let imp = importer(cfg);
        let store = MemoryStore::new();
        let outcome = run_with(&imp, &store).await.unwrap();

        let RunOutcome::Committed(summary) = outcome else {
            panic!("expected a committed run");
        };
        assert_eq!(summary.sales_persisted, 1);
        assert_eq!(summary.reviews_persisted, 1);
        assert_eq!(summary.reviews_sentinel, 1);

        let tables = store.committed();
        assert!(tables.schema_created);
        let (id, zelda) = &tables.sales[0];
        assert_eq!(tables.sales.len(), 1);
        assert_eq!(
            (zelda.na_sales, zelda.eu_sales, zelda.jp_sales, zelda.other_sales, zelda.global_sales),
            (3.0, 1.0, 1.0, 1.0, 6.0)
        );
        assert_eq!(tables.reviews.len(), 1);
        assert_eq!(tables.reviews[0].app_id, Some(*id));
        assert_eq!(tables.reviews[0].review_score, 9);
        assert_eq!(tables.reviews[0].review_votes, Some(100));
        assert_eq!(
            tables.runs,
            vec![CompletionRecord {
                mode: ImportMode::Linked,
                sales_rows: 1,
                review_rows: 1,
            }]
        );
        assert!(imp.marker().exists());
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let (_dir, cfg) = workspace(true, ImportMode::Linked);
        let imp = importer(cfg);
        let store = MemoryStore::new();
        run_with(&imp, &store).await.unwrap();
        let outcome = run_with(&imp, &store).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Skipped(SkipReason::MarkerPresent(_))));
        assert_eq!(store.committed().sales.len(), 1);
        assert_eq!(store.lock().commits, 1);
    }

    #[tokio::test]
    async fn recorded_run_restores_missing_marker() {
        let (_dir, cfg) = workspace(true, ImportMode::Linked);
        let imp = importer(cfg);
        let store = MemoryStore::new().with_recorded_run(CompletionRecord {
            mode: ImportMode::Linked,
            sales_rows: 1,
            review_rows: 1,
        });
        let outcome = run_with(&imp, &store).await.unwrap();
        assert_eq!(outcome, RunOutcome::Skipped(SkipReason::AlreadyRecorded));
        assert!(imp.marker().exists());
        assert_eq!(store.lock().commits, 0);
    }

    #[tokio::test]
    async fn failed_insert_still_commits() {
        let (_dir, cfg) = workspace(true, ImportMode::Linked);
        let imp = importer(cfg);
        let store = MemoryStore::new().failing_inserts_for("Zelda");
        let outcome = run_with(&imp, &store).await.unwrap();
        let RunOutcome::Committed(summary) = outcome else {
            panic!("expected a committed run");
        };
        assert_eq!(summary.sales_failed, 1);
        assert_eq!(summary.reviews_orphaned, 1);
        let tables = store.committed();
        assert!(tables.sales.is_empty());
        assert!(tables.reviews.is_empty());
        assert_eq!(tables.runs.len(), 1);
        assert!(imp.marker().exists());
    }

    #[tokio::test]
    async fn copy_failure_rolls_back_without_marker() {
        let (_dir, cfg) = workspace(true, ImportMode::Linked);
        let imp = importer(cfg);
        let store = MemoryStore::new().failing_review_copy();
        let err = run_with(&imp, &store).await.unwrap_err();
        assert!(matches!(err, ImportError::Store { op: "copy finish", .. }));

        let state = store.lock();
        assert_eq!(state.rollbacks, 1);
        assert_eq!(state.commits, 0);
        assert!(state.committed.sales.is_empty());
        assert!(state.committed.runs.is_empty());
        drop(state);
        assert!(!imp.marker().exists());
    }

    #[tokio::test]
    async fn lost_savepoint_rolls_back_without_marker() {
        let (_dir, cfg) = workspace(true, ImportMode::Linked);
        let imp = importer(cfg);
        let store = MemoryStore::new().losing_connection_at("Zelda");
        let err = run_with(&imp, &store).await.unwrap_err();
        assert!(matches!(err, ImportError::Store { op: "savepoint", .. }));
        assert_eq!(store.lock().rollbacks, 1);
        assert!(store.committed().runs.is_empty());
        assert!(!imp.marker().exists());
    }

    #[tokio::test]
    async fn missing_source_rolls_back() {
        let (dir, mut cfg) = workspace(true, ImportMode::Streamed);
        cfg.sales_path = dir.path().join("missing.csv");
        let imp = importer(cfg);
        let store = MemoryStore::new();
        let err = run_with(&imp, &store).await.unwrap_err();
        assert!(matches!(err, ImportError::SourceIo { .. }));
        assert_eq!(store.lock().rollbacks, 1);
        assert!(!Path::new(&imp.config().marker_path).exists());
    }

    #[tokio::test]
    async fn streamed_run_leaves_reviews_unlinked() {
        let (_dir, cfg) = workspace(true, ImportMode::Streamed);
        let imp = importer(cfg);
        let store = MemoryStore::new();
        let outcome = run_with(&imp, &store).await.unwrap();
        let RunOutcome::Committed(summary) = outcome else {
            panic!("expected a committed run");
        };
        assert_eq!(summary.reviews_orphaned, 0);
        let tables = store.committed();
        assert_eq!(tables.sales.len(), 1);
        assert_eq!(tables.reviews.len(), 1);
        assert_eq!(tables.reviews[0].app_id, None);
        assert_eq!(tables.runs[0].mode, ImportMode::Streamed);
    }
}
