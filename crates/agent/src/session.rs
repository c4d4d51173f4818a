//! The session: everything one agent loop works on, threaded explicitly
//! through every call instead of living in ambient global state.

use crate::mode::AgentMode;
use crate::outcome::EpisodeOutcome;
use boltstudio_core::message::{Conversation, Message};
use boltstudio_core::project::ProjectSnapshot;
use boltstudio_workspace::{SharedWorkspace, Workspace};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Name given to projects that have not been titled yet.
pub const UNTITLED_PROJECT: &str = "New Project";

/// The objective of the most recent episode, kept for `retry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastEpisode {
    pub objective: String,
    pub mode: AgentMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<EpisodeOutcome>,
}

/// Serializable form of a session, for front-ends that persist between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    pub project_id: String,
    pub project_name: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub workspace: Workspace,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_episode: Option<LastEpisode>,
}

pub struct Session {
    id: String,
    project_id: String,
    project_name: Mutex<String>,
    conversation: Mutex<Conversation>,
    workspace: SharedWorkspace,
    last_episode: Mutex<Option<LastEpisode>>,
    running: AtomicBool,
}

/// Clears the session's running flag when the episode ends, however it ends.
pub(crate) struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl Session {
    /// A fresh, untitled session over `workspace`.
    pub fn new(workspace: Workspace) -> Self {
        Self::with_project(Uuid::new_v4().to_string(), UNTITLED_PROJECT, workspace)
    }

    pub fn with_project(
        project_id: impl Into<String>,
        project_name: impl Into<String>,
        workspace: Workspace,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            project_name: Mutex::new(project_name.into()),
            conversation: Mutex::new(Conversation::new()),
            workspace: workspace.shared(),
            last_episode: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Reopen a saved project: its files become the canonical set and its
    /// history the conversation.
    pub fn from_snapshot(snapshot: ProjectSnapshot) -> Self {
        let mut session = Self::with_project(
            snapshot.id,
            snapshot.name,
            Workspace::from_files(snapshot.files),
        );
        *session.conversation.get_mut() = Conversation::from_messages(snapshot.messages);
        session
    }

    pub fn from_state(state: SessionState) -> Self {
        Self {
            id: state.id,
            project_id: state.project_id,
            project_name: Mutex::new(state.project_name),
            conversation: Mutex::new(Conversation::from_messages(state.messages)),
            workspace: state.workspace.shared(),
            last_episode: Mutex::new(state.last_episode),
            running: AtomicBool::new(false),
        }
    }

    pub async fn state(&self) -> SessionState {
        SessionState {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            project_name: self.project_name().await,
            messages: self.messages().await,
            workspace: self.workspace.read().await.clone(),
            last_episode: self.last_episode().await,
        }
    }

    /// What the project store should persist right now.
    pub async fn snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            id: self.project_id.clone(),
            name: self.project_name().await,
            files: self.workspace.read().await.files().clone(),
            messages: self.messages().await,
            saved_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub async fn project_name(&self) -> String {
        self.project_name.lock().await.clone()
    }

    pub async fn set_project_name(&self, name: impl Into<String>) {
        *self.project_name.lock().await = name.into();
    }

    pub fn workspace(&self) -> &SharedWorkspace {
        &self.workspace
    }

    pub(crate) fn conversation(&self) -> &Mutex<Conversation> {
        &self.conversation
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.conversation.lock().await.messages.clone()
    }

    pub async fn last_episode(&self) -> Option<LastEpisode> {
        self.last_episode.lock().await.clone()
    }

    pub(crate) async fn record_episode(&self, episode: LastEpisode) {
        *self.last_episode.lock().await = Some(episode);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Claim the session for one episode. `None` when another episode holds it.
    pub(crate) fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                flag: &self.running,
            })
    }
}
