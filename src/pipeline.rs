//! Load stages run inside the import transaction.
//!
//! Sales are read and aggregated over the whole file first, then persisted
//! either row by row (building the name → id map the reviews link against)
//! or by chunked COPY. Reviews are always cleaned and copied chunk by chunk.

use std::path::Path;
use tracing::{debug, info, warn};

use crate::database_ops::ImportStore;
use crate::error::ImportError;
use crate::identity::IdentityMap;
use crate::model::{DatasetKind, RunSummary, SalesRecord};
use crate::normalization::{clean_reviews, ReviewFilter, SalesAggregator};
use crate::source::{Chunk, ChunkedCsv, ReviewColumns, SalesColumns};

/// Read the sales file and return one cleaned row per
/// (name, year, genre, publisher) group, in first-seen order.
pub fn read_sales(
    path: &Path,
    chunk_size: usize,
    summary: &mut RunSummary,
) -> Result<Vec<SalesRecord>, ImportError> {
    let mut csv = ChunkedCsv::open(path, chunk_size)?;
    let headers = csv.headers()?;
    let cols = SalesColumns::resolve(&headers, path)?;

    let mut agg = SalesAggregator::new();
    while let Some(chunk) = csv.next_chunk()? {
        match chunk {
            Chunk::Records(records) => {
                for rec in &records {
                    agg.push(&cols.extract(rec));
                }
            }
            Chunk::Malformed { index, error } => {
                summary.chunks_discarded += 1;
                warn!(dataset = %DatasetKind::Sales, file = %path.display(), chunk = index, error = %error, "discarding malformed chunk");
            }
        }
    }

    summary.sales_rows_read += agg.rows_seen();
    summary.sales_groups += agg.group_count() as u64;
    info!(
        rows = agg.rows_seen(),
        groups = agg.group_count(),
        "sales cleaned"
    );
    Ok(agg.finish())
}

/// Insert sales one at a time and remember each generated id by name.
/// A rejected row is skipped and any reviews naming it end up orphaned; any
/// other store error ends the load.
pub async fn load_sales_linked<S>(
    store: &mut S,
    rows: &[SalesRecord],
    summary: &mut RunSummary,
) -> Result<IdentityMap, ImportError>
where
    S: ImportStore + ?Sized,
{
    let mut ids = IdentityMap::new();
    for row in rows {
        match store.insert_sale(row).await {
            Ok(id) => {
                ids.record(&row.name, id);
                summary.sales_persisted += 1;
            }
            Err(e) if e.is_row_level() => {
                summary.sales_failed += 1;
                warn!(name = %row.name, year = row.year, error = %e, "sales row insert failed; skipping");
            }
            Err(e) => return Err(e),
        }
    }
    summary.names_shadowed += ids.shadowed();
    info!(
        persisted = summary.sales_persisted,
        failed = summary.sales_failed,
        distinct_names = ids.len(),
        "sales inserted"
    );
    Ok(ids)
}

/// COPY sales in chunks of `chunk_size`. Any failure is fatal to the run.
pub async fn load_sales_streamed<S>(
    store: &mut S,
    rows: &[SalesRecord],
    chunk_size: usize,
    summary: &mut RunSummary,
) -> Result<(), ImportError>
where
    S: ImportStore + ?Sized,
{
    for (index, chunk) in rows.chunks(chunk_size.max(1)).enumerate() {
        let written = store.copy_sales(chunk).await?;
        summary.sales_persisted += written;
        debug!(chunk = index, written, "sales chunk copied");
    }
    info!(persisted = summary.sales_persisted, "sales copied");
    Ok(())
}

/// Clean and COPY reviews chunk by chunk. With an identity map, each review is
/// linked to its sales id by name and unresolved reviews are dropped; without
/// one, reviews are stored unlinked.
pub async fn load_reviews<S>(
    store: &mut S,
    path: &Path,
    chunk_size: usize,
    filter: &ReviewFilter,
    ids: Option<&IdentityMap>,
    summary: &mut RunSummary,
) -> Result<(), ImportError>
where
    S: ImportStore + ?Sized,
{
    let mut csv = ChunkedCsv::open(path, chunk_size)?;
    let headers = csv.headers()?;
    let cols = ReviewColumns::resolve(&headers, path)?;
    if filter.min_app_id.is_some() && !cols.has_app_id() {
        warn!(file = %path.display(), "min app id set but file has no app_id column; every review will be filtered");
    }

    while let Some(chunk) = csv.next_chunk()? {
        let records = match chunk {
            Chunk::Records(records) => records,
            Chunk::Malformed { index, error } => {
                summary.chunks_discarded += 1;
                warn!(dataset = %DatasetKind::Reviews, file = %path.display(), chunk = index, error = %error, "discarding malformed chunk");
                continue;
            }
        };
        summary.review_rows_read += records.len() as u64;

        let raw: Vec<_> = records.iter().map(|r| cols.extract(r)).collect();
        let mut batch = clean_reviews(&raw, filter);
        summary.reviews_sentinel += batch.sentinel;
        summary.reviews_below_min_app_id += batch.below_min_app_id;

        if let Some(ids) = ids {
            let before = batch.rows.len();
            batch.rows.retain_mut(|r| match ids.resolve(&r.app_name) {
                Some(id) => {
                    r.app_id = Some(id);
                    true
                }
                None => false,
            });
            summary.reviews_orphaned += (before - batch.rows.len()) as u64;
        }

        let written = store.copy_reviews(&batch.rows).await?;
        summary.reviews_persisted += written;
        debug!(rows = raw.len(), written, "reviews chunk copied");
    }

    info!(
        read = summary.review_rows_read,
        persisted = summary.reviews_persisted,
        sentinel = summary.reviews_sentinel,
        orphaned = summary.reviews_orphaned,
        "reviews loaded"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::memory::MemoryStore;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SALES: &str = "Rank,Name,Platform,Year,Genre,Publisher,NA_Sales,EU_Sales,JP_Sales,Other_Sales,Global_Sales\n\
1,Zelda,Switch,2017,Action,Nintendo,1,1,1,1,4\n\
2,Zelda,WiiU,2017,Action,Nintendo,2,0,0,0,2\n\
3,Halo,X360,2001,Shooter,Microsoft,5,1,0,0.5,6.5\n";

    const REVIEWS: &str = "app_id,app_name,review_text,review_score,review_votes\n\
10,Zelda,Great game,9,100\n\
11,Unknown Game,,1,0\n\
12,Unknown Game,Fun,1,0\n\
13,Halo,.,1,0\n\
14,Halo,It's fine,1,\n";

    fn csv_file(body: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn sales_groups_are_summed() {
        let f = csv_file(SALES);
        let mut summary = RunSummary::default();
        let rows = read_sales(f.path(), 2, &mut summary).unwrap();
        assert_eq!(rows.len(), 2);
        let zelda = &rows[0];
        assert_eq!(zelda.name, "Zelda");
        assert_eq!(
            (zelda.na_sales, zelda.eu_sales, zelda.jp_sales, zelda.other_sales, zelda.global_sales),
            (3.0, 1.0, 1.0, 1.0, 6.0)
        );
        assert_eq!(summary.sales_rows_read, 3);
        assert_eq!(summary.sales_groups, 2);
    }

    #[test]
    fn missing_sales_header_is_fatal() {
        let f = csv_file("Name,Year\nZelda,2017\n");
        let err = read_sales(f.path(), 10, &mut RunSummary::default()).unwrap_err();
        assert!(matches!(err, ImportError::MissingColumn { .. }));
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = read_sales(Path::new("/nonexistent/vgsales.csv"), 10, &mut RunSummary::default())
            .unwrap_err();
        assert!(matches!(err, ImportError::SourceIo { .. }));
    }

    #[tokio::test]
    async fn linked_reviews_resolve_by_name() {
        let sales = csv_file(SALES);
        let reviews = csv_file(REVIEWS);
        let mut store = MemoryStore::new();
        let mut summary = RunSummary::default();
        store.begin().await.unwrap();

        let rows = read_sales(sales.path(), 100, &mut summary).unwrap();
        let ids = load_sales_linked(&mut store, &rows, &mut summary).await.unwrap();
        load_reviews(
            &mut store,
            reviews.path(),
            100,
            &ReviewFilter::default(),
            Some(&ids),
            &mut summary,
        )
        .await
        .unwrap();
        store.commit().await.unwrap();

        let tables = store.committed();
        assert_eq!(tables.sales.len(), 2);
        let zelda_id = tables.sales[0].0;
        assert_eq!(tables.reviews.len(), 2);
        assert_eq!(tables.reviews[0].app_id, Some(zelda_id));
        assert_eq!(tables.reviews[0].review_text, "Great game");
        assert_eq!(tables.reviews[0].review_votes, Some(100));
        assert_eq!(tables.reviews[1].review_text, "It''s fine");
        assert_eq!(tables.reviews[1].review_votes, None);

        assert_eq!(summary.reviews_sentinel, 2);
        assert_eq!(summary.reviews_orphaned, 1);
        assert_eq!(summary.reviews_persisted, 2);
    }

    #[tokio::test]
    async fn failed_sales_insert_orphans_its_reviews() {
        let sales = csv_file(SALES);
        let reviews = csv_file(REVIEWS);
        let mut store = MemoryStore::new().failing_inserts_for("Zelda");
        let mut summary = RunSummary::default();
        store.begin().await.unwrap();

        let rows = read_sales(sales.path(), 100, &mut summary).unwrap();
        let ids = load_sales_linked(&mut store, &rows, &mut summary).await.unwrap();
        assert_eq!(summary.sales_failed, 1);
        assert!(ids.resolve("Zelda").is_none());

        load_reviews(
            &mut store,
            reviews.path(),
            100,
            &ReviewFilter::default(),
            Some(&ids),
            &mut summary,
        )
        .await
        .unwrap();
        assert_eq!(summary.reviews_orphaned, 2);
        assert_eq!(summary.reviews_persisted, 1);
    }

    #[tokio::test]
    async fn lost_transaction_stops_sales_insert() {
        let sales = csv_file(SALES);
        let mut store = MemoryStore::new().losing_connection_at("Zelda");
        let mut summary = RunSummary::default();
        store.begin().await.unwrap();

        let rows = read_sales(sales.path(), 100, &mut summary).unwrap();
        let err = load_sales_linked(&mut store, &rows, &mut summary)
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Store { op: "savepoint", .. }));
        assert_eq!(summary.sales_failed, 0);
        assert_eq!(summary.sales_persisted, 0);
    }

    #[tokio::test]
    async fn streamed_sales_are_copied_in_chunks() {
        let sales = csv_file(SALES);
        let mut store = MemoryStore::new();
        let mut summary = RunSummary::default();
        store.begin().await.unwrap();

        let rows = read_sales(sales.path(), 100, &mut summary).unwrap();
        load_sales_streamed(&mut store, &rows, 1, &mut summary)
            .await
            .unwrap();
        assert_eq!(summary.sales_persisted, 2);
        assert_eq!(
            store.lock().copy_calls,
            vec![("sales", 1usize), ("sales", 1usize)]
        );
    }

    #[tokio::test]
    async fn unlinked_reviews_keep_null_app_id() {
        let reviews = csv_file(REVIEWS);
        let mut store = MemoryStore::new();
        let mut summary = RunSummary::default();
        store.begin().await.unwrap();

        load_reviews(
            &mut store,
            reviews.path(),
            2,
            &ReviewFilter { min_app_id: Some(12) },
            None,
            &mut summary,
        )
        .await
        .unwrap();
        store.commit().await.unwrap();

        let tables = store.committed();
        assert_eq!(summary.reviews_below_min_app_id, 2);
        assert_eq!(summary.reviews_sentinel, 1);
        assert_eq!(tables.reviews.len(), 2);
        assert!(tables.reviews.iter().all(|r| r.app_id.is_none()));
    }

    #[tokio::test]
    async fn malformed_review_chunk_is_skipped() {
        let reviews = csv_file(
            "app_name,review_text,review_score\n\
Zelda,ok,1\n\
Zelda,broken\n\
Zelda,fine,1\n",
        );
        let mut store = MemoryStore::new();
        let mut summary = RunSummary::default();
        store.begin().await.unwrap();

        load_reviews(
            &mut store,
            reviews.path(),
            2,
            &ReviewFilter::default(),
            None,
            &mut summary,
        )
        .await
        .unwrap();
        assert_eq!(summary.chunks_discarded, 1);
        assert_eq!(summary.reviews_persisted, 1);
    }
}
