use serde::Serialize;
use std::fmt;

/// One cleaned (and possibly aggregated) game sales observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesRecord {
    pub name: String,
    pub year: i32,
    pub genre: String,
    pub publisher: String,
    pub na_sales: f64,
    pub eu_sales: f64,
    pub jp_sales: f64,
    pub other_sales: f64,
    pub global_sales: f64,
}

/// Grouping key for sales aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SalesKey {
    pub name: String,
    pub year: i32,
    pub genre: String,
    pub publisher: String,
}

impl SalesRecord {
    pub fn key(&self) -> SalesKey {
        SalesKey {
            name: self.name.clone(),
            year: self.year,
            genre: self.genre.clone(),
            publisher: self.publisher.clone(),
        }
    }

    /// Add another observation's figures into this one.
    pub fn absorb(&mut self, other: &SalesRecord) {
        self.na_sales += other.na_sales;
        self.eu_sales += other.eu_sales;
        self.jp_sales += other.jp_sales;
        self.other_sales += other.other_sales;
        self.global_sales += other.global_sales;
    }
}

/// One cleaned user review, ready to load.
///
/// `app_id` is the surrogate id of the sales row the review belongs to. It is
/// `None` until identity resolution runs (and stays `None` in streamed mode).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRecord {
    pub app_id: Option<i32>,
    pub app_name: String,
    pub review_text: String,
    pub review_score: i32,
    pub review_votes: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Sales,
    Reviews,
}

impl DatasetKind {
    pub fn table(self) -> &'static str {
        match self {
            DatasetKind::Sales => "sales",
            DatasetKind::Reviews => "reviews",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Lifecycle of one import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Committed,
    RolledBack,
    Skipped,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Committed => "committed",
            RunStatus::RolledBack => "rolled-back",
            RunStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Counters collected over one run; logged at the end and persisted with the
/// completion record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub sales_rows_read: u64,
    pub sales_groups: u64,
    pub sales_persisted: u64,
    pub sales_failed: u64,
    pub review_rows_read: u64,
    pub reviews_sentinel: u64,
    pub reviews_below_min_app_id: u64,
    pub reviews_orphaned: u64,
    pub reviews_persisted: u64,
    pub chunks_discarded: u64,
    pub names_shadowed: u64,
}
