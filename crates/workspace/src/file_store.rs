//! File-based project store: one pretty-printed JSON document per project.
//!
//! Storage location: `<dir>/<id>.json`. Documents are
//! human-inspectable and written whole on every save.

use async_trait::async_trait;
use boltstudio_core::error::StoreError;
use boltstudio_core::project::{ProjectSnapshot, ProjectStore};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct FileProjectStore {
    dir: PathBuf,
}

impl FileProjectStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve the document path for an id. Ids are opaque but must stay a
    /// single path component.
    fn document_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(StoreError::Storage(format!("Invalid project id: {id:?}")));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl ProjectStore for FileProjectStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, id: &str) -> Result<ProjectSnapshot, StoreError> {
        let path = self.document_path(id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        serde_json::from_str(&content).map_err(|e| StoreError::Corrupted {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    async fn save(&self, snapshot: &ProjectSnapshot) -> Result<(), StoreError> {
        let path = self.document_path(&snapshot.id)?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StoreError::Storage(format!("Failed to create project directory: {e}"))
        })?;

        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize project: {e}")))?;

        tokio::fs::write(&path, json)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write project file: {e}")))?;

        debug!(id = %snapshot.id, files = snapshot.files.len(), "Project saved");
        Ok(())
    }
}
