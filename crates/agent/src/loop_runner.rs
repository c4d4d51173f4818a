//! The agent loop: one bounded episode of model turns per objective.
//!
//! Each turn streams a model response, re-extracts directives from the
//! growing buffer on every chunk, stages file proposals as they appear, and
//! at stream end decides whether to run tools and go again, re-prompt, or
//! stop. Only quota and transport failures are fatal; everything else is fed
//! back to the model as context.

use crate::extractor::extract;
use crate::mode::AgentMode;
use crate::outcome::{EpisodeOutcome, EpisodeReport};
use crate::prompt;
use crate::session::{LastEpisode, Session, UNTITLED_PROJECT};
use boltstudio_core::directive::{StepStatus, ToolDirective};
use boltstudio_core::error::ProviderError;
use boltstudio_core::event::{DomainEvent, EventBus};
use boltstudio_core::message::{Message, Role};
use boltstudio_core::project::ProjectStore;
use boltstudio_core::provider::{Provider, ProviderRequest};
use boltstudio_tools::ToolDispatcher;
use boltstudio_workspace::project_index;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Model invocations allowed per episode unless configured otherwise.
pub const DEFAULT_MAX_TURNS: u32 = 3;

/// How a single turn ended.
enum TurnEnd {
    Completed(String),
    Aborted,
    Failed(ProviderError),
}

/// Drives episodes against a provider, a tool dispatcher and, optionally,
/// a project store.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,

    model: String,

    temperature: f32,

    max_tokens: Option<u32>,

    dispatcher: Arc<ToolDispatcher>,

    event_bus: Arc<EventBus>,

    /// Upper bound on model invocations per episode
    max_turns: u32,

    /// Where finished episodes are saved
    store: Option<Arc<dyn ProjectStore>>,

    /// Snapshot the canonical files before each episode
    checkpoint_before_task: bool,

    auto_save: bool,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        dispatcher: Arc<ToolDispatcher>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            dispatcher,
            event_bus,
            max_turns: DEFAULT_MAX_TURNS,
            store: None,
            checkpoint_before_task: true,
            auto_save: true,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the turn budget. Zero is treated as one.
    pub fn with_max_turns(mut self, max: u32) -> Self {
        self.max_turns = max.max(1);
        self
    }

    /// Attach a project store for auto-save.
    pub fn with_project_store(mut self, store: Arc<dyn ProjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_checkpoint_before_task(mut self, enabled: bool) -> Self {
        self.checkpoint_before_task = enabled;
        self
    }

    pub fn with_auto_save(mut self, enabled: bool) -> Self {
        self.auto_save = enabled;
        self
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// Run one episode for a new user objective.
    ///
    /// A second call while the session is already running returns
    /// [`EpisodeOutcome::AlreadyRunning`] without touching anything.
    pub async fn run(
        &self,
        session: &Session,
        objective: &str,
        mode: AgentMode,
        cancel: CancellationToken,
    ) -> EpisodeReport {
        self.episode(session, objective, mode, cancel, true).await
    }

    /// Re-issue the last objective as the first turn of a fresh episode.
    /// `None` when the session has never run one.
    ///
    /// The objective is appended again unless it is already the last message,
    /// so the first request always ends with it even after a partial reply.
    pub async fn retry(&self, session: &Session, cancel: CancellationToken) -> Option<EpisodeReport> {
        let last = session.last_episode().await?;
        info!(session_id = session.id(), objective = %last.objective, "Retrying last objective");
        let pending = session
            .conversation()
            .lock()
            .await
            .messages
            .last()
            .is_some_and(|m| m.role == Role::User && m.content == last.objective);
        Some(
            self.episode(session, &last.objective, last.mode, cancel, !pending)
                .await,
        )
    }

    /// Ask the model to fix an error reported by the sandbox's terminal.
    pub async fn auto_fix(
        &self,
        session: &Session,
        error: &str,
        cancel: CancellationToken,
    ) -> EpisodeReport {
        let objective =
            format!("The terminal reported an error: \"{error}\". Fix this immediately.");
        self.run(session, &objective, AgentMode::Fix, cancel).await
    }

    async fn episode(
        &self,
        session: &Session,
        objective: &str,
        mode: AgentMode,
        cancel: CancellationToken,
        push_objective: bool,
    ) -> EpisodeReport {
        let Some(_guard) = session.try_begin() else {
            warn!(session_id = session.id(), "Episode already running, request ignored");
            return EpisodeReport::noop(EpisodeOutcome::AlreadyRunning);
        };

        info!(session_id = session.id(), %mode, max_turns = self.max_turns, "Episode started");
        self.event_bus.publish(DomainEvent::EpisodeStarted {
            session_id: session.id().to_string(),
            objective: objective.to_string(),
            mode: mode.to_string(),
            timestamp: Utc::now(),
        });

        self.name_project(session, objective).await;

        let checkpoint_id = {
            let mut ws = session.workspace().write().await;
            ws.clear_plan();
            self.checkpoint_before_task
                .then(|| ws.add_checkpoint(prompt::pre_task_checkpoint_name(objective)))
        };

        if push_objective {
            session
                .conversation()
                .lock()
                .await
                .push(Message::user(objective));
        }

        let mut staged = BTreeSet::new();
        let mut previous_output: Option<String> = None;
        let mut turns = 0;

        let outcome = loop {
            if turns >= self.max_turns {
                info!(session_id = session.id(), turns, "Turn budget reached");
                break EpisodeOutcome::BudgetExhausted;
            }
            if cancel.is_cancelled() {
                break EpisodeOutcome::Aborted;
            }
            turns += 1;

            let output = match self
                .turn(session, mode, turns, checkpoint_id.as_deref(), &mut staged, &cancel)
                .await
            {
                TurnEnd::Completed(output) => output,
                TurnEnd::Aborted => break EpisodeOutcome::Aborted,
                TurnEnd::Failed(e) => {
                    warn!(session_id = session.id(), turn = turns, error = %e, "Model call failed");
                    break failure_outcome(e);
                }
            };

            let extraction = extract(&output);
            let tools: Vec<ToolDirective> = extraction.tools().cloned().collect();

            if !tools.is_empty() {
                let results = self.run_tools(session, &tools, &cancel).await;
                if !results.is_empty() {
                    session
                        .conversation()
                        .lock()
                        .await
                        .push(Message::system(prompt::tool_results_message(&results)));
                }
                if cancel.is_cancelled() {
                    break EpisodeOutcome::Aborted;
                }
                previous_output = Some(output);
                continue;
            }

            let repeated = previous_output.as_deref() == Some(output.as_str());

            if mode.expects_output() && !extraction.has_files() {
                if repeated {
                    break EpisodeOutcome::Stalled;
                }
                debug!(session_id = session.id(), turn = turns, "No files or tools, re-prompting");
                session
                    .conversation()
                    .lock()
                    .await
                    .push(Message::system(prompt::corrective_message(mode)));
                self.event_bus.publish(DomainEvent::CorrectionInjected {
                    session_id: session.id().to_string(),
                    turn: turns,
                });
                previous_output = Some(output);
                continue;
            }

            break if repeated {
                EpisodeOutcome::Stalled
            } else {
                EpisodeOutcome::Done
            };
        };

        session
            .record_episode(LastEpisode {
                objective: objective.to_string(),
                mode,
                outcome: Some(outcome.clone()),
            })
            .await;

        if self.auto_save && !outcome.is_failure() {
            self.save(session).await;
        }

        let files_changed: Vec<String> = staged.into_iter().collect();
        info!(
            session_id = session.id(),
            outcome = outcome.label(),
            turns,
            files_changed = files_changed.len(),
            "Episode finished"
        );
        self.event_bus.publish(DomainEvent::EpisodeFinished {
            session_id: session.id().to_string(),
            outcome: outcome.label().to_string(),
            turns,
            files_changed: files_changed.len(),
            timestamp: Utc::now(),
        });

        EpisodeReport {
            outcome,
            turns,
            files_changed,
            checkpoint_id,
        }
    }

    /// One model invocation, streamed to completion, cancellation or failure.
    async fn turn(
        &self,
        session: &Session,
        mode: AgentMode,
        turn: u32,
        checkpoint_id: Option<&str>,
        staged: &mut BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> TurnEnd {
        let request = self.build_request(session, mode).await;
        debug!(
            session_id = session.id(),
            turn,
            messages = request.messages.len(),
            "Issuing model call"
        );
        self.event_bus.publish(DomainEvent::TurnStarted {
            session_id: session.id().to_string(),
            turn,
            timestamp: Utc::now(),
        });

        let mut rx = tokio::select! {
            _ = cancel.cancelled() => return TurnEnd::Aborted,
            result = self.provider.stream(request) => match result {
                Ok(rx) => rx,
                Err(e) => return TurnEnd::Failed(e),
            },
        };

        session.conversation().lock().await.push(
            Message::assistant(String::new()).with_checkpoint(checkpoint_id.map(str::to_string)),
        );

        let mut buffer = String::new();
        let mut plan_seen = false;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(session_id = session.id(), turn, "Cancelled mid-stream");
                    if buffer.is_empty() {
                        session.conversation().lock().await.messages.pop();
                    }
                    return TurnEnd::Aborted;
                }
                next = rx.recv() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if let Some(delta) = chunk.content.filter(|d| !d.is_empty()) {
                        buffer.push_str(&delta);
                        session
                            .conversation()
                            .lock()
                            .await
                            .replace_last_content(buffer.as_str());
                        self.event_bus.publish(DomainEvent::ChunkReceived {
                            session_id: session.id().to_string(),
                            turn,
                            delta,
                        });
                        self.apply_directives(session, &buffer, &mut plan_seen, staged)
                            .await;
                    }
                    if chunk.done {
                        break;
                    }
                }
                Some(Err(e)) => {
                    if buffer.is_empty() {
                        session.conversation().lock().await.messages.pop();
                    }
                    return TurnEnd::Failed(e);
                }
                None => break,
            }
        }

        self.apply_directives(session, &buffer, &mut plan_seen, staged)
            .await;
        {
            let mut ws = session.workspace().write().await;
            if ws.advance_all(StepStatus::Completed) > 0 {
                self.event_bus.publish(DomainEvent::PlanUpdated {
                    session_id: session.id().to_string(),
                    steps: ws.plan().to_vec(),
                });
            }
        }

        TurnEnd::Completed(buffer)
    }

    /// Re-derive directives from the whole buffer and apply what is new:
    /// the plan the first time it completes, and every file whose proposed
    /// content changed.
    async fn apply_directives(
        &self,
        session: &Session,
        buffer: &str,
        plan_seen: &mut bool,
        staged: &mut BTreeSet<String>,
    ) {
        let extraction = extract(buffer);
        let mut ws = session.workspace().write().await;

        if !*plan_seen {
            if let Some(steps) = extraction.plan_steps() {
                *plan_seen = true;
                ws.set_plan(steps.to_vec());
                if let Some(first) = steps.first() {
                    ws.advance_step(&first.id, StepStatus::InProgress);
                }
                self.event_bus.publish(DomainEvent::PlanUpdated {
                    session_id: session.id().to_string(),
                    steps: ws.plan().to_vec(),
                });
            }
        }

        for file in extraction.files() {
            if ws.pending(&file.path) == Some(file.content.as_str()) {
                continue;
            }
            ws.set_pending(file.path.clone(), file.content.clone());
            if staged.insert(file.path.clone()) {
                debug!(session_id = session.id(), path = %file.path, "Staged file");
            }
            self.event_bus.publish(DomainEvent::FileStaged {
                session_id: session.id().to_string(),
                path: file.path.clone(),
                bytes: file.content.len(),
            });
        }
    }

    async fn build_request(&self, session: &Session, mode: AgentMode) -> ProviderRequest {
        let project_name = session.project_name().await;
        let context = {
            let ws = session.workspace().read().await;
            let paths: Vec<String> = ws.files().keys().cloned().collect();
            format!(
                "{}\n\n{}",
                prompt::system_prompt(&project_name, &paths, mode),
                prompt::environment_snapshot(
                    ws.active_file(),
                    &project_index(ws.files()),
                    Utc::now()
                )
            )
        };

        let mut messages = vec![Message::system(context)];
        messages.extend(session.conversation().lock().await.messages.iter().cloned());

        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: true,
        }
    }

    /// Execute tool directives in order. Stops between tools once cancelled;
    /// a tool already running is allowed to finish.
    async fn run_tools(
        &self,
        session: &Session,
        tools: &[ToolDirective],
        cancel: &CancellationToken,
    ) -> Vec<(ToolDirective, String)> {
        let mut results = Vec::with_capacity(tools.len());
        for directive in tools {
            if cancel.is_cancelled() {
                break;
            }
            let started = Instant::now();
            let output = self.dispatcher.execute(directive, session.workspace()).await;
            self.event_bus.publish(DomainEvent::ToolExecuted {
                session_id: session.id().to_string(),
                kind: directive.kind,
                description: directive.description.clone(),
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });
            results.push((directive.clone(), output));
        }
        results
    }

    async fn name_project(&self, session: &Session, objective: &str) {
        if session.project_name().await != UNTITLED_PROJECT {
            return;
        }
        if let Some(name) = prompt::project_name_from_objective(objective) {
            debug!(session_id = session.id(), name = %name, "Named project");
            session.set_project_name(name).await;
        }
    }

    async fn save(&self, session: &Session) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = session.snapshot().await;
        match store.save(&snapshot).await {
            Ok(()) => debug!(project_id = %snapshot.id, store = store.name(), "Auto-saved project"),
            Err(e) => warn!(project_id = %snapshot.id, "Auto-save failed: {e}"),
        }
    }
}

fn failure_outcome(error: ProviderError) -> EpisodeOutcome {
    match error {
        ProviderError::QuotaExceeded(message) => EpisodeOutcome::FailedQuota(message),
        other => EpisodeOutcome::FailedTransport(other.to_string()),
    }
}
