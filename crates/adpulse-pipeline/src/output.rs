//! Append-only run outputs under one directory.

use std::path::{Path, PathBuf};

use adpulse_core::{Envelope, PipelineError};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

pub const SUMMARY_FILE: &str = "dataset_summary.json";
pub const VALIDATED_FILE: &str = "validated_hypotheses.json";
pub const ENVELOPES_FILE: &str = "envelopes.jsonl";

#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    /// Create the output directory (and parents) if needed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the directory cannot be created.
    pub async fn create(dir: &Path) -> Result<Self, PipelineError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| PipelineError::io(dir.display().to_string(), e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_of(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Append one envelope as a JSON line.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] when the log cannot be opened or written.
    pub async fn append_envelope(&self, envelope: &Envelope<()>) -> Result<(), PipelineError> {
        let path = self.path_of(ENVELOPES_FILE);
        let mut line = to_json(envelope, ENVELOPES_FILE, false)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| PipelineError::io(path.display().to_string(), e))?;
        file.write_all(&line)
            .await
            .map_err(|e| PipelineError::io(path.display().to_string(), e))?;
        file.flush()
            .await
            .map_err(|e| PipelineError::io(path.display().to_string(), e))
    }

    /// Write `value` as pretty JSON to `file`, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] on write failure.
    pub async fn write_json<T: Serialize>(
        &self,
        file: &str,
        value: &T,
    ) -> Result<PathBuf, PipelineError> {
        let path = self.path_of(file);
        let bytes = to_json(value, file, true)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PipelineError::io(path.display().to_string(), e))?;
        tracing::info!(path = %path.display(), "output written");
        Ok(path)
    }
}

fn to_json<T: Serialize>(value: &T, file: &str, pretty: bool) -> Result<Vec<u8>, PipelineError> {
    let result = if pretty {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    };
    result.map_err(|e| PipelineError::Unexpected(format!("failed to serialize {file}: {e}")))
}
