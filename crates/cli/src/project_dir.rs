//! The on-disk side of a project: its source files, and the state directory
//! holding the saved project document and the session (staged changes,
//! checkpoints, plan, last episode).

use anyhow::Context;
use boltstudio_agent::{Session, SessionState, UNTITLED_PROJECT};
use boltstudio_config::WorkspaceConfig;
use boltstudio_core::project::ProjectStore;
use boltstudio_workspace::{FileProjectStore, Workspace};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Id of the project document inside the state directory.
pub const PROJECT_ID: &str = "project";

const SESSION_FILE: &str = "state.json";

/// Files above this size are not loaded into the agent's workspace.
const MAX_SCANNED_FILE_BYTES: u64 = 256 * 1024;

const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "dist", "build"];

pub struct ProjectDir {
    root: PathBuf,
    state_dir: PathBuf,
}

impl ProjectDir {
    pub fn new(root: &Path, config: &WorkspaceConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            state_dir: root.join(&config.state_dir),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> FileProjectStore {
        FileProjectStore::new(&self.state_dir)
    }

    /// Resume the saved session, else reopen the saved project, else start
    /// fresh from the files in the directory.
    pub async fn open_session(&self) -> anyhow::Result<Session> {
        let session_path = self.state_dir.join(SESSION_FILE);
        if tokio::fs::try_exists(&session_path).await.unwrap_or(false) {
            let raw = tokio::fs::read_to_string(&session_path)
                .await
                .with_context(|| format!("Failed to read {}", session_path.display()))?;
            let state: SessionState = serde_json::from_str(&raw)
                .with_context(|| format!("Corrupted session state in {}", session_path.display()))?;
            debug!(path = %session_path.display(), "Resumed session");
            return Ok(Session::from_state(state));
        }

        let store = self.store();
        if store.exists(PROJECT_ID).await? {
            let snapshot = store.load(PROJECT_ID).await?;
            debug!(files = snapshot.files.len(), "Reopened saved project");
            return Ok(Session::from_snapshot(snapshot));
        }

        let files = self.scan().await?;
        debug!(files = files.len(), root = %self.root.display(), "Scanned project directory");
        Ok(Session::with_project(
            PROJECT_ID,
            UNTITLED_PROJECT,
            Workspace::from_files(files),
        ))
    }

    pub async fn save_session(&self, session: &Session) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.state_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.state_dir.display()))?;
        let json = serde_json::to_string_pretty(&session.state().await)?;
        let path = self.state_dir.join(SESSION_FILE);
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Write files into the project directory, creating parents as needed.
    pub async fn write_files<'a>(
        &self,
        files: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> anyhow::Result<usize> {
        let mut written = 0;
        for (path, content) in files {
            let target = self.resolve(path)?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, content)
                .await
                .with_context(|| format!("Failed to write {}", target.display()))?;
            written += 1;
        }
        Ok(written)
    }

    /// Make the directory match a canonical file set: write every file and
    /// remove tracked files that are no longer in it.
    pub async fn sync_files(
        &self,
        files: &BTreeMap<String, String>,
        previous: &BTreeMap<String, String>,
    ) -> anyhow::Result<()> {
        for path in previous.keys().filter(|p| !files.contains_key(*p)) {
            let target = self.resolve(path)?;
            match tokio::fs::remove_file(&target).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to remove {}", target.display()));
                }
            }
        }
        self.write_files(files.iter().map(|(p, c)| (p.as_str(), c.as_str())))
            .await?;
        Ok(())
    }

    fn resolve(&self, path: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir));
        anyhow::ensure!(!escapes, "Refusing to write outside the project: {path}");
        Ok(self.root.join(relative))
    }

    /// Load the project's text files, skipping hidden entries, dependency
    /// and build directories, binaries and very large files.
    async fn scan(&self) -> anyhow::Result<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e).with_context(|| format!("Failed to read {}", dir.display())),
            };

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }
                let file_type = entry.file_type().await?;
                let path = entry.path();

                if file_type.is_dir() {
                    if !SKIPPED_DIRS.contains(&name.as_str()) {
                        stack.push(path);
                    }
                    continue;
                }
                if !file_type.is_file() || entry.metadata().await?.len() > MAX_SCANNED_FILE_BYTES {
                    continue;
                }

                let Ok(content) = tokio::fs::read_to_string(&path).await else {
                    continue;
                };
                if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    files.insert(key, content);
                }
            }
        }

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(tmp: &TempDir) -> ProjectDir {
        ProjectDir::new(tmp.path(), &WorkspaceConfig::default())
    }

    #[tokio::test]
    async fn fresh_directory_is_scanned() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        std::fs::create_dir_all(tmp.path().join("node_modules/react")).unwrap();
        std::fs::write(tmp.path().join("package.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("src/main.ts"), "console.log(1)").unwrap();
        std::fs::write(tmp.path().join("node_modules/react/index.js"), "x").unwrap();
        std::fs::write(tmp.path().join(".env"), "SECRET=1").unwrap();

        let session = project(&tmp).open_session().await.unwrap();
        let ws = session.workspace().read().await;
        let paths: Vec<&String> = ws.files().keys().collect();
        assert_eq!(paths, vec!["package.json", "src/main.ts"]);
        assert_eq!(session.project_id(), PROJECT_ID);
    }

    #[tokio::test]
    async fn saved_session_is_resumed() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.ts"), "export {}").unwrap();
        let dir = project(&tmp);

        let session = dir.open_session().await.unwrap();
        session.workspace().write().await.set_pending("a.ts", "export const a = 1;");
        dir.save_session(&session).await.unwrap();

        let resumed = dir.open_session().await.unwrap();
        assert_eq!(resumed.id(), session.id());
        assert_eq!(
            resumed.workspace().read().await.pending("a.ts"),
            Some("export const a = 1;")
        );
    }

    #[tokio::test]
    async fn writes_refuse_to_escape_the_root() {
        let tmp = TempDir::new().unwrap();
        let dir = project(&tmp);

        assert!(dir.write_files([("../evil.sh", "rm -rf /")]).await.is_err());
        assert_eq!(
            dir.write_files([("src/deep/new.ts", "ok")]).await.unwrap(),
            1
        );
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("src/deep/new.ts")).unwrap(),
            "ok"
        );
    }

    #[tokio::test]
    async fn sync_removes_files_dropped_from_the_set() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("old.ts"), "old").unwrap();
        let dir = project(&tmp);

        let previous = BTreeMap::from([("old.ts".to_string(), "old".to_string())]);
        let next = BTreeMap::from([("new.ts".to_string(), "new".to_string())]);
        dir.sync_files(&next, &previous).await.unwrap();

        assert!(!tmp.path().join("old.ts").exists());
        assert_eq!(std::fs::read_to_string(tmp.path().join("new.ts")).unwrap(), "new");
    }
}
