use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::{ExportData, ExportStats};

/// Writes the export as one JSON document, to a file or to stdout.
#[derive(Debug, Clone, Default)]
pub struct JsonExporter {
    path: Option<PathBuf>,
}

impl JsonExporter {
    /// Export to `path`, or to stdout when `None`.
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Serialize `data`, replacing any previous output file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn export(&self, data: &ExportData) -> Result<ExportStats> {
        let mut body = serde_json::to_vec(data).context("Failed to serialize export")?;
        body.push(b'\n');

        match &self.path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await.with_context(|| {
                        format!("Failed to create export directory: {}", parent.display())
                    })?;
                }
                tokio::fs::write(path, &body)
                    .await
                    .with_context(|| format!("Failed to write export file: {}", path.display()))?;
                info!(path = %path.display(), bytes = body.len(), "JSON export written");
            }
            None => {
                let mut stdout = tokio::io::stdout();
                stdout
                    .write_all(&body)
                    .await
                    .context("Failed to write export to stdout")?;
                stdout.flush().await.context("Failed to flush stdout")?;
            }
        }

        Ok(ExportStats {
            rows_written: data.posts.len() + data.edits.len() + data.users.len(),
            rows_failed: 0,
        })
    }
}
