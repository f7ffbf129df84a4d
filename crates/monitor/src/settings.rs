//! The persisted "analysis enabled" flag.
//!
//! Stored as `{"analysis_enabled": bool}` in a small JSON file. Writes go
//! to a sibling temp file that is renamed over the target, so a crash
//! mid-write leaves either the old or the new flag on disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct AnalysisSettings {
    analysis_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct AnalysisFlagStore {
    path: PathBuf,
}

impl AnalysisFlagStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the flag. A missing file means disabled; an unreadable or
    /// corrupt one is logged and also treated as disabled.
    pub async fn load(&self) -> bool {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return false,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Cannot read analysis flag");
                return false;
            }
        };
        match serde_json::from_str::<AnalysisSettings>(&raw) {
            Ok(settings) => settings.analysis_enabled,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Corrupt analysis flag file");
                false
            }
        }
    }

    pub async fn save(&self, enabled: bool) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let body = serde_json::to_vec_pretty(&AnalysisSettings {
            analysis_enabled: enabled,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;

        tracing::debug!(path = %self.path.display(), enabled, "Analysis flag saved");
        Ok(())
    }
}
