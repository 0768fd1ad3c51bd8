use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, info_span};

use vgsl_loader::config::{ImportConfig, ImportMode, DEFAULT_MARKER_PATH};
use vgsl_loader::database_ops::PgImportStore;
use vgsl_loader::error::ImportError;
use vgsl_loader::loadtest::{run_load_test, LoadTestConfig};
use vgsl_loader::logging::init_tracing;
use vgsl_loader::marker::CompletionMarker;
use vgsl_loader::orchestrator::{Importer, RunOutcome};
use vgsl_loader::util::env::{self, redact_postgres_url};

#[derive(Parser, Debug)]
#[command(name = "vgsl", version, about = "Video game sales & reviews loader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Import the sales and reviews CSVs once (no-op when already imported)
    Import {
        /// Sales CSV (defaults to SALES_CSV)
        #[arg(long)]
        sales: Option<PathBuf>,
        /// Reviews CSV (defaults to REVIEWS_CSV)
        #[arg(long)]
        reviews: Option<PathBuf>,
        /// linked | streamed (defaults to IMPORT_MODE)
        #[arg(long)]
        mode: Option<ImportMode>,
        /// Rows per chunk (defaults to IMPORT_CHUNK_SIZE)
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Drop reviews whose source app_id is below this
        #[arg(long)]
        min_app_id: Option<i64>,
        /// Completion marker path (defaults to IMPORT_MARKER_PATH)
        #[arg(long)]
        marker: Option<PathBuf>,
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
        /// Run even when RUN_IMPORT is not set
        #[arg(long, default_value_t = false)]
        force_gate: bool,
    },
    /// Print marker state, import_runs rows and table counts as JSON
    Status {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
        /// Completion marker path (defaults to IMPORT_MARKER_PATH)
        #[arg(long)]
        marker: Option<PathBuf>,
    },
    /// Exercise the catalogue HTTP API with concurrent virtual users
    LoadTest {
        /// Base URL (defaults to LOADTEST_HOST or http://localhost:5000)
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        users: Option<usize>,
        #[arg(long, default_value_t = 60)]
        duration_secs: u64,
        #[arg(long, default_value_t = 1000)]
        min_wait_ms: u64,
        #[arg(long, default_value_t = 5000)]
        max_wait_ms: u64,
        /// Seed for reproducible task sequences
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    let log_file = env::env_opt("IMPORT_LOG_FILE").map(PathBuf::from);
    init_tracing("info", log_file.as_deref())?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Import {
            sales,
            reviews,
            mode,
            chunk_size,
            min_app_id,
            marker,
            db_url,
            force_gate,
        } => {
            env::preflight_check("vgsl import", &[], &ImportConfig::ENV_KEYS)?;
            let mut cfg = ImportConfig::from_env()?;
            if let Some(p) = sales {
                cfg.sales_path = p;
            }
            if let Some(p) = reviews {
                cfg.reviews_path = p;
            }
            if let Some(m) = mode {
                cfg.mode = m;
            }
            if let Some(n) = chunk_size {
                cfg.chunk_size = n;
            }
            if min_app_id.is_some() {
                cfg.min_app_id = min_app_id;
            }
            if let Some(p) = marker {
                cfg.marker_path = p;
            }
            cfg.run_import |= force_gate;
            cfg.validate()?;

            let span = info_span!("import", mode = %cfg.mode);
            let importer = Importer::new(cfg, span);
            let outcome = importer
                .run(|| async move {
                    let url = resolve_database_url(db_url)
                        .map_err(|e| ImportError::Config(format!("{e:#}")))?;
                    info!(url = %redact_postgres_url(&url), "import: connecting");
                    PgImportStore::connect(&url).await
                })
                .await;
            match outcome {
                Ok(RunOutcome::Skipped(reason)) => {
                    info!(?reason, "import: skipped");
                }
                Ok(RunOutcome::Committed(summary)) => {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                Err(e) => {
                    error!(error = %e, "import: failed");
                    return Err(e).context("import failed");
                }
            }
        }
        Commands::Status { db_url, marker } => {
            let marker = CompletionMarker::new(marker.unwrap_or_else(|| {
                env::env_opt("IMPORT_MARKER_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MARKER_PATH))
            }));
            let database_url = resolve_database_url(db_url)?;
            info!(url = %redact_postgres_url(&database_url), "status: connecting");
            let store = PgImportStore::connect(&database_url).await?;
            let status = store.status().await?;
            let report = serde_json::json!({
                "marker": {
                    "path": marker.path().display().to_string(),
                    "present": marker.exists(),
                },
                "sales_rows": status.sales_rows,
                "review_rows": status.review_rows,
                "import_runs": status.runs,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::LoadTest {
            host,
            users,
            duration_secs,
            min_wait_ms,
            max_wait_ms,
            seed,
        } => {
            if min_wait_ms > max_wait_ms {
                bail!("--min-wait-ms must not exceed --max-wait-ms");
            }
            let mut cfg = LoadTestConfig::from_env();
            if let Some(h) = host {
                cfg.host = h;
            }
            if let Some(n) = users {
                cfg.users = n;
            }
            cfg.duration = Duration::from_secs(duration_secs);
            cfg.min_wait = Duration::from_millis(min_wait_ms);
            cfg.max_wait = Duration::from_millis(max_wait_ms);
            cfg.seed = seed;

            let stats = run_load_test(&cfg).await?;
            println!("{}", serde_json::to_string_pretty(&stats.report())?);
        }
    }

    Ok(())
}

fn resolve_database_url(db_url: Option<String>) -> Result<String> {
    if let Some(url) = db_url {
        let trimmed = url.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    let env_url = env::db_url().with_context(|| "resolve_database_url: missing database URL")?;
    let trimmed = env_url.trim();
    if trimmed.is_empty() {
        bail!("database URL is empty; set DATABASE_URL / DB_HOST or pass --db-url");
    }
    Ok(trimmed.to_string())
}
