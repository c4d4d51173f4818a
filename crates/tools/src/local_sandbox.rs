//! A sandbox backed by a local project directory.
//!
//! Commands run through `sh -c` with the project root as working directory
//! and a wall-clock timeout. File operations are confined to the root: paths
//! are taken relative to it, and absolute paths or `..` components are
//! rejected before touching the filesystem.

use async_trait::async_trait;
use boltstudio_core::error::SandboxError;
use boltstudio_core::sandbox::{DirEntry, ProcessOutput, Sandbox};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

pub struct LocalSandbox {
    root: PathBuf,
    timeout: Duration,
}

impl LocalSandbox {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a workspace-relative path to a location under the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let normalized = path.replace('\\', "/");
        let trimmed = normalized.trim().trim_start_matches("./");
        let relative = Path::new(trimmed);

        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(SandboxError::PathRejected {
                        path: path.into(),
                        reason: "path traversal".into(),
                    });
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(SandboxError::PathRejected {
                        path: path.into(),
                        reason: "absolute paths are outside the workspace".into(),
                    });
                }
            }
        }

        Ok(self.root.join(relative))
    }

    fn io_error(path: &str, e: std::io::Error) -> SandboxError {
        if e.kind() == std::io::ErrorKind::NotFound {
            SandboxError::NotFound(path.into())
        } else {
            SandboxError::Io {
                path: path.into(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn spawn(&self, command: &str) -> Result<ProcessOutput, SandboxError> {
        debug!(command = %command, "Executing shell command");

        let child = Command::new("sh")
            .args(["-c", command])
            .current_dir(&self.root)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(SandboxError::Spawn {
                    command: command.into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(command = %command, "Command timed out");
                return Err(SandboxError::Timeout {
                    command: command.into(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code != 0 {
            warn!(command = %command, exit_code, "Command failed");
        }

        Ok(ProcessOutput {
            output: text,
            exit_code,
        })
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| Self::io_error(path, e))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_error(path, e))?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| Self::io_error(path, e))
    }

    async fn mkdir(&self, path: &str) -> Result<(), SandboxError> {
        let full = self.resolve(path)?;
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| Self::io_error(path, e))
    }

    async fn remove(&self, path: &str) -> Result<(), SandboxError> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(SandboxError::PathRejected {
                path: path.into(),
                reason: "refusing to remove the workspace root".into(),
            });
        }

        let metadata = tokio::fs::metadata(&full)
            .await
            .map_err(|e| Self::io_error(path, e))?;
        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&full).await
        } else {
            tokio::fs::remove_file(&full).await
        };
        result.map_err(|e| Self::io_error(path, e))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, SandboxError> {
        let full = self.resolve(if path.trim().is_empty() { "." } else { path })?;
        let mut reader = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| Self::io_error(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| Self::io_error(path, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }
        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }
}
