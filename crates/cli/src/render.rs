//! Terminal rendering of episode events.
//!
//! Streamed model text goes to stdout; progress lines go to stderr.

use boltstudio_core::directive::StepStatus;
use boltstudio_core::event::DomainEvent;
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Print events until the bus closes.
pub fn spawn(mut events: broadcast::Receiver<Arc<DomainEvent>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut announced = HashSet::new();
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event, &mut announced),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    eprintln!("\n  ({n} events skipped)");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(event: &DomainEvent, announced: &mut HashSet<String>) {
    match event {
        DomainEvent::EpisodeStarted { mode, .. } => {
            eprintln!("  Agent [{}] is architecting a solution...", mode.to_uppercase());
        }
        DomainEvent::TurnStarted { turn, .. } if *turn > 1 => {
            eprintln!("\n  ── turn {turn} ──");
        }
        DomainEvent::ChunkReceived { delta, .. } => {
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(delta.as_bytes());
            let _ = stdout.flush();
        }
        DomainEvent::PlanUpdated { steps, .. } => {
            let done = steps
                .iter()
                .filter(|s| s.status == StepStatus::Completed)
                .count();
            if done == steps.len() {
                eprintln!("\n  ✓ plan complete ({done} steps)");
            } else {
                eprintln!("\n  plan: {} steps", steps.len());
            }
        }
        DomainEvent::FileStaged { path, .. } => {
            if announced.insert(path.clone()) {
                eprintln!("\n  staged {path}");
            }
        }
        DomainEvent::ToolExecuted {
            kind,
            description,
            duration_ms,
            ..
        } => {
            eprintln!("\n  [{kind}] {description} ({duration_ms} ms)");
        }
        DomainEvent::CorrectionInjected { .. } => {
            eprintln!("\n  No changes produced, asking the agent to act");
        }
        _ => {}
    }
}
