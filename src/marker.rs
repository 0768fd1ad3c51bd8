use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ImportError;

/// File whose presence means the import already completed.
#[derive(Debug, Clone)]
pub struct CompletionMarker {
    path: PathBuf,
}

impl CompletionMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create the marker (and its parent directory). Overwrites an existing one.
    pub fn write(&self, detail: &str) -> Result<(), ImportError> {
        let err = |source| ImportError::Marker {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(err)?;
        }
        let body = format!(
            "Data has been imported\ncompleted_at={}\n{}\n",
            Utc::now().to_rfc3339(),
            detail
        );
        fs::write(&self.path, body).map_err(err)
    }
}
