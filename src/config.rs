use serde::Serialize;

use crate::error::ImportError;
use crate::util::env::{env_flag, env_opt, env_parse, env_parse_opt};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_CHUNK_SIZE: usize = 50_000;
pub const DEFAULT_MARKER_PATH: &str = "/data/imported.txt";
pub const DEFAULT_SALES_CSV: &str = "/datasets/vgsales.csv";
pub const DEFAULT_REVIEWS_CSV: &str = "/datasets/dataset.csv";

/// How sales and reviews are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Sales inserted row by row; reviews linked to the returned ids, then copied.
    #[default]
    Linked,
    /// Both datasets copied independently, no cross-referencing.
    Streamed,
}

impl ImportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportMode::Linked => "linked",
            ImportMode::Streamed => "streamed",
        }
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportMode {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linked" => Ok(ImportMode::Linked),
            "streamed" | "stream" | "copy" => Ok(ImportMode::Streamed),
            other => Err(ImportError::Config(format!(
                "unknown import mode {other:?} (expected linked or streamed)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// The `RUN_IMPORT` gate; nothing happens unless set.
    pub run_import: bool,
    pub sales_path: PathBuf,
    pub reviews_path: PathBuf,
    pub marker_path: PathBuf,
    pub mode: ImportMode,
    pub chunk_size: usize,
    /// Reviews whose source `app_id` is below this are dropped.
    pub min_app_id: Option<i64>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            run_import: false,
            sales_path: PathBuf::from(DEFAULT_SALES_CSV),
            reviews_path: PathBuf::from(DEFAULT_REVIEWS_CSV),
            marker_path: PathBuf::from(DEFAULT_MARKER_PATH),
            mode: ImportMode::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            min_app_id: None,
        }
    }
}

impl ImportConfig {
    /// Keys worth including in the startup configuration snapshot.
    pub const ENV_KEYS: [&'static str; 8] = [
        "RUN_IMPORT",
        "SALES_CSV",
        "REVIEWS_CSV",
        "IMPORT_MARKER_PATH",
        "IMPORT_MODE",
        "IMPORT_CHUNK_SIZE",
        "REVIEWS_MIN_APP_ID",
        "DATABASE_URL",
    ];

    pub fn from_env() -> Result<Self, ImportError> {
        let defaults = Self::default();
        let mode = match env_opt("IMPORT_MODE") {
            Some(raw) => raw.parse()?,
            None => defaults.mode,
        };
        let cfg = Self {
            run_import: env_flag("RUN_IMPORT", false),
            sales_path: env_opt("SALES_CSV")
                .map(PathBuf::from)
                .unwrap_or(defaults.sales_path),
            reviews_path: env_opt("REVIEWS_CSV")
                .map(PathBuf::from)
                .unwrap_or(defaults.reviews_path),
            marker_path: env_opt("IMPORT_MARKER_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.marker_path),
            mode,
            chunk_size: env_parse("IMPORT_CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
            min_app_id: env_parse_opt("REVIEWS_MIN_APP_ID"),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if self.chunk_size == 0 {
            return Err(ImportError::Config("chunk size must be positive".into()));
        }
        Ok(())
    }
}
