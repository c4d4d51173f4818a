//! Project persistence: the collaborator that saves and restores a project's
//! file set and message history keyed by an opaque id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::error::StoreError;
use crate::message::Message;

/// Everything needed to reopen a project later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub id: String,
    pub name: String,
    /// Canonical files, path → content
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub saved_at: DateTime<Utc>,
}

/// Load/save projects by id.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&self, id: &str) -> Result<ProjectSnapshot, StoreError>;

    async fn save(&self, snapshot: &ProjectSnapshot) -> Result<(), StoreError>;

    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        match self.load(id).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
