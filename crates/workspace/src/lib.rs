//! # BoltStudio Workspace
//!
//! The staging store that sits between model proposals and the canonical
//! project: pending changes, captured originals, checkpoints and the live
//! plan. Also home to project indexing, diff statistics and the file-backed
//! project store.

pub mod diff;
pub mod file_store;
pub mod index;
pub mod staging;

pub use diff::{DiffStats, diff_stats};
pub use file_store::FileProjectStore;
pub use index::project_index;
pub use staging::{Checkpoint, SharedWorkspace, StagedChange, Workspace, WorkspaceError};
