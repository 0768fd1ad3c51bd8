use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use serde::Serialize;
use tokio_postgres::{Client, CopyInSink, NoTls, Statement};
use tracing::{debug, error, info, instrument};

use super::copy::{encode_reviews, encode_sales};
use super::schema::{
    IMPORT_RUNS_VISIBLE_SQL, IMPORT_RUN_EXISTS_SQL, INSERT_IMPORT_RUN_SQL, INSERT_SALE_SQL,
    REVIEWS_COPY_SQL, SALES_COPY_SQL, SCHEMA_SQL,
};
use super::store::{CompletionRecord, ImportStore};
use crate::error::ImportError;
use crate::model::{ReviewRecord, SalesRecord};
use crate::util::env::env_flag;

/// Postgres-backed store on one tokio-postgres connection.
pub struct PgImportStore {
    client: Client,
    insert_sale: Option<Statement>,
}

/// Snapshot printed by `vgsl status`.
#[derive(Debug, Serialize)]
pub struct StoreStatus {
    pub sales_rows: Option<i64>,
    pub review_rows: Option<i64>,
    pub runs: Vec<ImportRunRow>,
}

#[derive(Debug, Serialize)]
pub struct ImportRunRow {
    pub id: i32,
    pub mode: String,
    pub sales_rows: i64,
    pub review_rows: i64,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

fn sslmode_from_querystring(url: &str) -> Option<String> {
    url.split_once('?').and_then(|(_, qs)| {
        qs.split('&').find_map(|kv| match kv.split_once('=') {
            Some((k, v)) if k.eq_ignore_ascii_case("sslmode") => Some(v.to_ascii_lowercase()),
            _ => None,
        })
    })
}

impl PgImportStore {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, ImportError> {
        let sslmode = sslmode_from_querystring(database_url);
        let client = if sslmode.as_deref() == Some("disable") {
            let (client, connection) = tokio_postgres::connect(database_url, NoTls)
                .await
                .map_err(|e| ImportError::store("connect", e))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!(error = %e, "postgres connection error");
                }
            });
            client
        } else {
            // sslmode=require means "encrypt", not "verify"; opt into verification explicitly.
            let verify = env_flag("PG_TLS_VERIFY", false);
            let connector = TlsConnector::builder()
                .danger_accept_invalid_certs(!verify)
                .danger_accept_invalid_hostnames(!verify)
                .build()
                .map_err(|e| ImportError::store("tls setup", e))?;
            let (client, connection) =
                tokio_postgres::connect(database_url, MakeTlsConnector::new(connector))
                    .await
                    .map_err(|e| ImportError::store("connect", e))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!(error = %e, "postgres connection error");
                }
            });
            client
        };
        info!(sslmode = sslmode.as_deref().unwrap_or("prefer"), "connected to db");
        Ok(Self {
            client,
            insert_sale: None,
        })
    }

    async fn table_visible(&self, table: &str) -> Result<bool, ImportError> {
        let row = self
            .client
            .query_one("SELECT to_regclass($1) IS NOT NULL", &[&table])
            .await
            .map_err(|e| ImportError::store("table lookup", e))?;
        Ok(row.get(0))
    }

    async fn count_rows(&self, table: &'static str) -> Result<Option<i64>, ImportError> {
        if !self.table_visible(table).await? {
            return Ok(None);
        }
        let row = self
            .client
            .query_one(format!("SELECT COUNT(*)::BIGINT FROM {table}").as_str(), &[])
            .await
            .map_err(|e| ImportError::store("count rows", e))?;
        Ok(Some(row.get(0)))
    }

    pub async fn status(&self) -> Result<StoreStatus, ImportError> {
        let sales_rows = self.count_rows("sales").await?;
        let review_rows = self.count_rows("reviews").await?;
        let mut runs = Vec::new();
        if self.table_visible("import_runs").await? {
            let rows = self
                .client
                .query(
                    "SELECT id, mode, sales_rows, review_rows, completed_at FROM import_runs ORDER BY id",
                    &[],
                )
                .await
                .map_err(|e| ImportError::store("list import runs", e))?;
            runs = rows
                .into_iter()
                .map(|r| ImportRunRow {
                    id: r.get(0),
                    mode: r.get(1),
                    sales_rows: r.get(2),
                    review_rows: r.get(3),
                    completed_at: r.get(4),
                })
                .collect();
        }
        Ok(StoreStatus {
            sales_rows,
            review_rows,
            runs,
        })
    }

    async fn copy_chunk(
        &self,
        table: &'static str,
        statement: &str,
        buf: Vec<u8>,
    ) -> Result<u64, ImportError> {
        let sink: CopyInSink<Bytes> = self
            .client
            .copy_in(statement)
            .await
            .map_err(|e| ImportError::store("copy start", e))?;
        tokio::pin!(sink);
        sink.send(Bytes::from(buf))
            .await
            .map_err(|e| ImportError::store("copy send", e))?;
        let written = sink
            .finish()
            .await
            .map_err(|e| ImportError::store("copy finish", e))?;
        debug!(table, written, "copy chunk finished");
        Ok(written)
    }
}

#[async_trait]
impl ImportStore for PgImportStore {
    async fn begin(&mut self) -> Result<(), ImportError> {
        self.client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| ImportError::store("begin", e))
    }

    async fn commit(&mut self) -> Result<(), ImportError> {
        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(|e| ImportError::store("commit", e))
    }

    async fn rollback(&mut self) -> Result<(), ImportError> {
        self.client
            .batch_execute("ROLLBACK")
            .await
            .map_err(|e| ImportError::store("rollback", e))
    }

    async fn ensure_schema(&mut self) -> Result<(), ImportError> {
        self.client
            .batch_execute(SCHEMA_SQL)
            .await
            .map_err(|e| ImportError::store("create schema", e))
    }

    async fn completion_recorded(&mut self) -> Result<bool, ImportError> {
        let visible: bool = self
            .client
            .query_one(IMPORT_RUNS_VISIBLE_SQL, &[])
            .await
            .map_err(|e| ImportError::store("check import_runs", e))?
            .get(0);
        if !visible {
            return Ok(false);
        }
        let row = self
            .client
            .query_one(IMPORT_RUN_EXISTS_SQL, &[])
            .await
            .map_err(|e| ImportError::store("check import_runs", e))?;
        Ok(row.get(0))
    }

    async fn insert_sale(&mut self, row: &SalesRecord) -> Result<i32, ImportError> {
        let stmt = match &self.insert_sale {
            Some(s) => s.clone(),
            None => {
                let s = self
                    .client
                    .prepare(INSERT_SALE_SQL)
                    .await
                    .map_err(|e| ImportError::store("prepare sales insert", e))?;
                self.insert_sale = Some(s.clone());
                s
            }
        };

        // A failed statement aborts the whole transaction unless scoped by a savepoint.
        self.client
            .batch_execute("SAVEPOINT sales_row")
            .await
            .map_err(|e| ImportError::store("savepoint", e))?;
        let inserted = self
            .client
            .query_one(
                &stmt,
                &[
                    &row.name,
                    &row.year,
                    &row.genre,
                    &row.publisher,
                    &row.na_sales,
                    &row.eu_sales,
                    &row.jp_sales,
                    &row.other_sales,
                    &row.global_sales,
                ],
            )
            .await;
        match inserted {
            Ok(r) => {
                self.client
                    .batch_execute("RELEASE SAVEPOINT sales_row")
                    .await
                    .map_err(|e| ImportError::store("release savepoint", e))?;
                Ok(r.get(0))
            }
            Err(e) => {
                self.client
                    .batch_execute("ROLLBACK TO SAVEPOINT sales_row")
                    .await
                    .map_err(|e| ImportError::store("rollback to savepoint", e))?;
                Err(ImportError::row_rejected("sales", e))
            }
        }
    }

    async fn copy_sales(&mut self, rows: &[SalesRecord]) -> Result<u64, ImportError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let buf = encode_sales(rows)?;
        self.copy_chunk("sales", SALES_COPY_SQL, buf).await
    }

    async fn copy_reviews(&mut self, rows: &[ReviewRecord]) -> Result<u64, ImportError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let buf = encode_reviews(rows)?;
        self.copy_chunk("reviews", REVIEWS_COPY_SQL, buf).await
    }

    async fn record_completion(&mut self, record: &CompletionRecord) -> Result<(), ImportError> {
        self.client
            .execute(
                INSERT_IMPORT_RUN_SQL,
                &[&record.mode.as_str(), &record.sales_rows, &record.review_rows],
            )
            .await
            .map_err(|e| ImportError::store("record completion", e))?;
        Ok(())
    }
}
