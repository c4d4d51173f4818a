//! Collaborator traits for side effects: the execution sandbox and the
//! network proxy.
//!
//! The orchestrator never touches processes, the filesystem or the network
//! directly. Everything goes through these traits so the dispatcher can be
//! exercised against in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::{SandboxError, ToolError};

/// Combined output of a finished process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// Interleaved stdout/stderr as captured
    pub output: String,
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// The execution environment the agent's tools act on.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run a shell command to completion.
    async fn spawn(&self, command: &str) -> Result<ProcessOutput, SandboxError>;

    async fn read_file(&self, path: &str) -> Result<String, SandboxError>;

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError>;

    async fn mkdir(&self, path: &str) -> Result<(), SandboxError>;

    /// Remove a file or a directory tree.
    async fn remove(&self, path: &str) -> Result<(), SandboxError>;

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, SandboxError>;
}

/// A page fetched through the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl FetchedPage {
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
    }
}

/// Outbound HTTP goes through a proxy so the agent never talks to arbitrary
/// hosts from the session's own origin.
#[async_trait]
pub trait WebProxy: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ToolError>;
}
