//! Shared fakes for loop tests.

use async_trait::async_trait;
use boltstudio_core::error::{ProviderError, SandboxError, StoreError, ToolError};
use boltstudio_core::event::DomainEvent;
use boltstudio_core::message::Message;
use boltstudio_core::project::{ProjectSnapshot, ProjectStore};
use boltstudio_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk};
use boltstudio_core::sandbox::{DirEntry, FetchedPage, ProcessOutput, Sandbox, WebProxy};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// One scripted model response.
#[derive(Debug, Clone)]
pub enum Script {
    /// Stream these chunks, then finish.
    Reply(Vec<String>),
    /// Fail the call before any chunk arrives.
    Refuse(ProviderError),
    /// Stream these chunks, then fail mid-stream.
    Break(Vec<String>, ProviderError),
    /// Stream these chunks, then stay open until the receiver is dropped.
    Hang(Vec<String>),
}

impl Script {
    /// A reply streamed in small chunks.
    pub fn reply(text: &str) -> Self {
        Self::Reply(chunked(text, 16))
    }
}

/// Split on char boundaries into pieces of at most `size` chars.
pub fn chunked(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

/// A provider that plays back scripts in order. Once the scripts run out
/// the last one repeats.
pub struct ScriptedProvider {
    scripts: Vec<Script>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        assert!(!scripts.is_empty(), "ScriptedProvider needs at least one script");
        Self {
            scripts,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_script(&self, request: ProviderRequest) -> Script {
        self.requests.lock().unwrap().push(request);
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.scripts
            .get(index)
            .or_else(|| self.scripts.last())
            .cloned()
            .unwrap()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self.next_script(request) {
            Script::Reply(chunks) => Ok(ProviderResponse {
                message: Message::assistant(chunks.concat()),
                usage: None,
                model: "mock-model".into(),
            }),
            Script::Refuse(e) | Script::Break(_, e) => Err(e),
            Script::Hang(_) => Err(ProviderError::Timeout("scripted hang".into())),
        }
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let script = self.next_script(request);
        if let Script::Refuse(e) = script {
            return Err(e);
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            match script {
                Script::Reply(chunks) => {
                    for chunk in chunks {
                        let _ = tx.send(Ok(StreamChunk::delta(chunk))).await;
                    }
                    let _ = tx.send(Ok(StreamChunk::finished(None))).await;
                }
                Script::Break(chunks, e) => {
                    for chunk in chunks {
                        let _ = tx.send(Ok(StreamChunk::delta(chunk))).await;
                    }
                    let _ = tx.send(Err(e)).await;
                }
                Script::Hang(chunks) => {
                    for chunk in chunks {
                        let _ = tx.send(Ok(StreamChunk::delta(chunk))).await;
                    }
                    tx.closed().await;
                }
                Script::Refuse(_) => {}
            }
        });
        Ok(rx)
    }
}

/// In-memory sandbox whose commands always succeed.
#[derive(Default)]
pub struct MemorySandbox {
    files: Mutex<BTreeMap<String, String>>,
    commands: Mutex<Vec<String>>,
}

impl MemorySandbox {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sandbox for MemorySandbox {
    async fn spawn(&self, command: &str) -> Result<ProcessOutput, SandboxError> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(ProcessOutput {
            output: format!("ran: {command}"),
            exit_code: 0,
        })
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| SandboxError::NotFound(path.into()))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        self.files.lock().unwrap().insert(path.into(), content.into());
        Ok(())
    }

    async fn mkdir(&self, _path: &str) -> Result<(), SandboxError> {
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), SandboxError> {
        self.files
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| SandboxError::NotFound(path.into()))
    }

    async fn read_dir(&self, _path: &str) -> Result<Vec<DirEntry>, SandboxError> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .map(|name| DirEntry {
                name: name.clone(),
                is_dir: false,
            })
            .collect())
    }
}

/// A proxy with no network.
pub struct OfflineProxy;

#[async_trait]
impl WebProxy for OfflineProxy {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ToolError> {
        Err(ToolError::FetchFailed {
            url: url.into(),
            reason: "offline".into(),
        })
    }
}

/// In-memory project store, optionally failing every save.
#[derive(Default)]
pub struct MemoryStore {
    projects: Mutex<HashMap<String, ProjectSnapshot>>,
    saves: AtomicUsize,
    fail: bool,
}

impl MemoryStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: &str) -> Option<ProjectSnapshot> {
        self.projects.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, id: &str) -> Result<ProjectSnapshot, StoreError> {
        self.get(id).ok_or_else(|| StoreError::NotFound(id.into()))
    }

    async fn save(&self, snapshot: &ProjectSnapshot) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Storage("disk full".into()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.projects
            .lock()
            .unwrap()
            .insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }
}

/// Wait (bounded) for an event matching `pred`. Returns whether one arrived.
pub async fn wait_for(
    events: &mut broadcast::Receiver<Arc<DomainEvent>>,
    pred: impl Fn(&DomainEvent) -> bool,
) -> bool {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return true,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or(false)
}
