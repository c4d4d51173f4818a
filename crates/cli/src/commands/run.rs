//! `boltstudio run`, `retry` and `fix`: drive one agent episode.

use super::load_config;
use crate::project_dir::ProjectDir;
use crate::render;
use boltstudio_agent::{AgentLoop, AgentMode, CancellationToken, EpisodeOutcome, EpisodeReport, Session};
use boltstudio_config::AppConfig;
use boltstudio_core::event::EventBus;
use boltstudio_providers::OpenAiCompatProvider;
use boltstudio_tools::{HttpProxy, LocalSandbox, ToolDispatcher, ToolLimits};
use boltstudio_workspace::diff_stats;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// What to ask the agent for.
pub enum Episode {
    Objective {
        text: String,
        mode: Option<AgentMode>,
    },
    Retry,
    Fix(String),
}

pub async fn run(dir: &Path, episode: Episode, max_turns: Option<u32>) -> anyhow::Result<()> {
    let config = load_config()?;
    let project = ProjectDir::new(dir, &config.workspace);
    let session = project.open_session().await?;

    let bus = Arc::new(EventBus::default());
    let agent = build_agent(&config, &project, bus.clone(), max_turns);
    let printer = render::spawn(bus.subscribe());

    let cancel = CancellationToken::new();
    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n  Cancelling...");
                cancel.cancel();
            }
        }
    });

    let report = match episode {
        Episode::Objective { text, mode } => {
            let mode = match mode {
                Some(mode) => mode,
                None => config
                    .agent
                    .default_mode
                    .parse()
                    .map_err(anyhow::Error::msg)?,
            };
            Some(agent.run(&session, &text, mode, cancel).await)
        }
        Episode::Retry => agent.retry(&session, cancel).await,
        Episode::Fix(error) => Some(agent.auto_fix(&session, &error, cancel).await),
    };

    ctrl_c.abort();
    drop(agent);
    drop(bus);
    let _ = printer.await;

    project.save_session(&session).await?;

    let Some(report) = report else {
        println!("  Nothing to retry yet. Run `boltstudio run <objective>` first.");
        return Ok(());
    };
    print_summary(&report, &session).await;

    if report.outcome.is_failure() {
        anyhow::bail!("{}", report.outcome);
    }
    Ok(())
}

/// Wire the agent loop to the configured endpoint, the project directory as
/// sandbox, and the project store.
pub(crate) fn build_agent(
    config: &AppConfig,
    project: &ProjectDir,
    bus: Arc<EventBus>,
    max_turns: Option<u32>,
) -> AgentLoop {
    let provider = Arc::new(OpenAiCompatProvider::from_config(config));
    let sandbox = Arc::new(LocalSandbox::new(
        project.root(),
        Duration::from_secs(config.tools.command_timeout_secs),
    ));
    let proxy = Arc::new(HttpProxy::new(config.tools.proxy_url.clone()));
    let dispatcher = Arc::new(
        ToolDispatcher::new(sandbox, proxy).with_limits(ToolLimits::from(&config.tools)),
    );

    AgentLoop::new(provider, &config.default_model, dispatcher, bus)
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens)
        .with_max_turns(max_turns.unwrap_or(config.agent.max_turns))
        .with_checkpoint_before_task(config.agent.checkpoint_before_task)
        .with_auto_save(config.agent.auto_save)
        .with_project_store(Arc::new(project.store()))
}

async fn print_summary(report: &EpisodeReport, session: &Session) {
    println!();
    println!();
    println!("  {}", report.outcome);
    println!("  Turns: {}", report.turns);

    if !report.files_changed.is_empty() {
        let ws = session.workspace().read().await;
        println!("  Staged {} file(s):", report.files_changed.len());
        for path in &report.files_changed {
            match ws.pending(path) {
                Some(proposed) => {
                    let stats = diff_stats(ws.original(path).flatten(), proposed);
                    println!("    {path}  +{} -{}", stats.additions, stats.deletions);
                }
                None => println!("    {path}"),
            }
        }
        println!("  Review with `boltstudio status`, then `boltstudio accept` or `boltstudio discard`.");
    }

    match &report.outcome {
        EpisodeOutcome::FailedQuota(_) => {
            println!("  Upgrade your plan or wait for the limit to reset, then `boltstudio retry`.");
        }
        EpisodeOutcome::FailedTransport(_) => println!("  Run `boltstudio retry` to try again."),
        _ => {}
    }
}
