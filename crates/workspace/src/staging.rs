//! The workspace staging store.
//!
//! Holds four things side by side:
//! - the **canonical** file set (accepted, authoritative content),
//! - **pending** proposals, at most one per path,
//! - **originals**: the canonical content of a path captured the instant its
//!   first proposal arrived,
//! - named, immutable **checkpoints** of the canonical set.
//!
//! Invariant: every pending path has an original, and accepting or
//! discarding a path removes both entries together.

use boltstudio_core::directive::{PlanStep, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// The staging store shared between the loop, the tool dispatcher and any
/// front-end applying direct edits.
pub type SharedWorkspace = Arc<RwLock<Workspace>>;

/// Errors from workspace operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),
}

/// A named, immutable snapshot of the canonical file set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    files: BTreeMap<String, String>,
}

impl Checkpoint {
    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }
}

/// A pending change as presented for review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedChange {
    pub path: String,
    /// Canonical content when the change was first proposed; `None` for a
    /// file that did not exist yet.
    pub original: Option<String>,
    pub proposed: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workspace {
    files: BTreeMap<String, String>,
    pending: BTreeMap<String, String>,
    originals: BTreeMap<String, Option<String>>,
    checkpoints: Vec<Checkpoint>,
    plan: Vec<PlanStep>,
    active_file: Option<String>,
}

fn is_within(path: &str, root: &str) -> bool {
    path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a workspace whose canonical set is `files`.
    pub fn from_files(files: impl IntoIterator<Item = (String, String)>) -> Self {
        let files: BTreeMap<String, String> = files.into_iter().collect();
        let active_file = files.keys().next().cloned();
        Self {
            files,
            active_file,
            ..Self::default()
        }
    }

    /// Wrap into the shared handle.
    pub fn shared(self) -> SharedWorkspace {
        Arc::new(RwLock::new(self))
    }

    // ── Canonical files ──────────────────────────────────────────────

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Direct edit: create or replace a canonical file. Staging is untouched,
    /// so a pending proposal for the same path keeps its captured original.
    pub fn upsert_file(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    /// Direct edit of an existing file. Returns false when the path is unknown.
    pub fn update_file(&mut self, path: &str, content: impl Into<String>) -> bool {
        match self.files.get_mut(path) {
            Some(existing) => {
                *existing = content.into();
                true
            }
            None => false,
        }
    }

    /// Rename a file (or every file under a directory prefix), carrying
    /// pending and original entries along. Returns how many canonical entries
    /// moved.
    pub fn rename_file(&mut self, old_path: &str, new_path: &str) -> usize {
        fn rekey<V>(map: &mut BTreeMap<String, V>, old_path: &str, new_path: &str) -> usize {
            let keys: Vec<String> = map
                .keys()
                .filter(|k| is_within(k, old_path))
                .cloned()
                .collect();
            for key in &keys {
                if let Some(value) = map.remove(key) {
                    let renamed = format!("{new_path}{}", &key[old_path.len()..]);
                    map.insert(renamed, value);
                }
            }
            keys.len()
        }

        let moved = rekey(&mut self.files, old_path, new_path);
        rekey(&mut self.pending, old_path, new_path);
        rekey(&mut self.originals, old_path, new_path);

        if let Some(active) = &self.active_file
            && is_within(active, old_path)
        {
            self.active_file = Some(format!("{new_path}{}", &active[old_path.len()..]));
        }
        debug!(from = old_path, to = new_path, moved, "Renamed workspace path");
        moved
    }

    /// Delete a file or a directory tree, including any staging for it.
    /// Returns how many canonical entries were removed.
    pub fn delete_file(&mut self, path: &str) -> usize {
        let before = self.files.len();
        self.files.retain(|k, _| !is_within(k, path));
        self.pending.retain(|k, _| !is_within(k, path));
        self.originals.retain(|k, _| !is_within(k, path));

        if self.active_file.as_deref().is_some_and(|a| is_within(a, path)) {
            self.active_file = None;
        }
        before - self.files.len()
    }

    pub fn active_file(&self) -> Option<&str> {
        self.active_file.as_deref()
    }

    pub fn set_active_file(&mut self, path: Option<String>) {
        self.active_file = path;
    }

    // ── Staging ──────────────────────────────────────────────────────

    /// Stage a proposal. The original is captured only when the path has no
    /// original yet. Returns true when this created a new pending entry.
    pub fn set_pending(&mut self, path: impl Into<String>, content: impl Into<String>) -> bool {
        let path = path.into();
        if !self.originals.contains_key(&path) {
            let original = self.files.get(&path).cloned();
            self.originals.insert(path.clone(), original);
        }
        self.pending.insert(path, content.into()).is_none()
    }

    pub fn pending(&self, path: &str) -> Option<&str> {
        self.pending.get(path).map(String::as_str)
    }

    pub fn pending_paths(&self) -> Vec<String> {
        self.pending.keys().cloned().collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// The captured original for a pending path. Outer `None`: nothing staged.
    /// Inner `None`: the file did not exist when first proposed.
    pub fn original(&self, path: &str) -> Option<Option<&str>> {
        self.originals.get(path).map(Option::as_deref)
    }

    pub fn staged_changes(&self) -> Vec<StagedChange> {
        self.pending
            .iter()
            .map(|(path, proposed)| StagedChange {
                path: path.clone(),
                original: self.originals.get(path).cloned().flatten(),
                proposed: proposed.clone(),
            })
            .collect()
    }

    fn select(&self, path: Option<&str>) -> Vec<String> {
        match path {
            Some(p) if self.pending.contains_key(p) => vec![p.to_string()],
            Some(_) => Vec::new(),
            None => self.pending_paths(),
        }
    }

    /// Promote pending content into the canonical set, for one path or for
    /// all of them. Returns the accepted paths.
    pub fn accept(&mut self, path: Option<&str>) -> Vec<String> {
        let selected = self.select(path);
        for p in &selected {
            if let Some(content) = self.pending.remove(p) {
                self.files.insert(p.clone(), content);
            }
            self.originals.remove(p);
        }
        debug!(count = selected.len(), "Accepted staged changes");
        selected
    }

    /// Drop pending proposals without touching canonical content. Returns the
    /// discarded paths.
    pub fn discard(&mut self, path: Option<&str>) -> Vec<String> {
        let selected = self.select(path);
        for p in &selected {
            self.pending.remove(p);
            self.originals.remove(p);
        }
        debug!(count = selected.len(), "Discarded staged changes");
        selected
    }

    // ── Checkpoints ──────────────────────────────────────────────────

    /// Deep-copy the canonical set into a new checkpoint and return its id.
    pub fn add_checkpoint(&mut self, name: impl Into<String>) -> String {
        let id = Uuid::new_v4().to_string();
        self.checkpoints.push(Checkpoint {
            id: id.clone(),
            name: name.into(),
            timestamp: Utc::now(),
            files: self.files.clone(),
        });
        id
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn checkpoint(&self, id: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.id == id)
    }

    /// Replace the canonical set with a checkpoint's snapshot. Any in-flight
    /// staging and the current plan are invalidated.
    pub fn restore_checkpoint(&mut self, id: &str) -> Result<(), WorkspaceError> {
        let snapshot = self
            .checkpoint(id)
            .map(|c| c.files.clone())
            .ok_or_else(|| WorkspaceError::CheckpointNotFound(id.to_string()))?;

        self.active_file = snapshot.keys().next().cloned();
        self.files = snapshot;
        self.pending.clear();
        self.originals.clear();
        self.plan.clear();
        debug!(checkpoint = id, files = self.files.len(), "Restored checkpoint");
        Ok(())
    }

    pub fn delete_checkpoint(&mut self, id: &str) -> bool {
        let before = self.checkpoints.len();
        self.checkpoints.retain(|c| c.id != id);
        before != self.checkpoints.len()
    }

    // ── Plan ─────────────────────────────────────────────────────────

    pub fn plan(&self) -> &[PlanStep] {
        &self.plan
    }

    /// Install a freshly extracted plan. Steps whose id already exists keep
    /// their more advanced status, so a repeated plan never sends a step back
    /// to pending.
    pub fn set_plan(&mut self, steps: Vec<PlanStep>) {
        let previous = std::mem::take(&mut self.plan);
        self.plan = steps
            .into_iter()
            .map(|mut step| {
                if let Some(old) = previous.iter().find(|p| p.id == step.id) {
                    step.advance(old.status);
                }
                step
            })
            .collect();
    }

    /// Advance one step. Returns whether its status changed.
    pub fn advance_step(&mut self, id: &str, status: StepStatus) -> bool {
        self.plan
            .iter_mut()
            .find(|s| s.id == id)
            .is_some_and(|s| s.advance(status))
    }

    /// Advance every step that can still move to `status`.
    pub fn advance_all(&mut self, status: StepStatus) -> usize {
        self.plan.iter_mut().filter_map(|s| s.advance(status).then_some(())).count()
    }

    pub fn clear_plan(&mut self) {
        self.plan.clear();
    }
}
