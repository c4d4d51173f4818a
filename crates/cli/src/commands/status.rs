//! `boltstudio status`: what is staged, what can be restored, what the plan
//! looks like.

use super::load_config;
use crate::project_dir::ProjectDir;
use boltstudio_core::directive::StepStatus;
use boltstudio_workspace::diff_stats;
use std::path::Path;

pub async fn run(dir: &Path) -> anyhow::Result<()> {
    let config = load_config()?;
    let project = ProjectDir::new(dir, &config.workspace);
    let session = project.open_session().await?;
    let ws = session.workspace().read().await;

    println!("BoltStudio Status");
    println!("=================");
    println!("  Project:   {}", session.project_name().await);
    println!("  Directory: {}", project.root().display());
    println!("  Files:     {}", ws.files().len());
    println!("  Model:     {} @ {}", config.default_model, config.api_url);
    if let Some(last) = session.last_episode().await {
        let outcome = last
            .outcome
            .map(|o| o.to_string())
            .unwrap_or_else(|| "unfinished".into());
        println!("  Last run:  [{}] {} ({outcome})", last.mode, last.objective);
    }

    let changes = ws.staged_changes();
    println!("\n  Staged changes ({}):", changes.len());
    if changes.is_empty() {
        println!("    (none)");
    }
    for change in &changes {
        let marker = if change.original.is_some() { "M" } else { "A" };
        let stats = diff_stats(change.original.as_deref(), &change.proposed);
        println!(
            "    {marker} {}  +{} -{}",
            change.path, stats.additions, stats.deletions
        );
    }

    println!("\n  Checkpoints ({}):", ws.checkpoints().len());
    for cp in ws.checkpoints() {
        println!(
            "    {}  {}  {} ({} files)",
            &cp.id[..cp.id.len().min(8)],
            cp.timestamp.format("%Y-%m-%d %H:%M"),
            cp.name,
            cp.files().len()
        );
    }

    if !ws.plan().is_empty() {
        println!("\n  Plan:");
        for step in ws.plan() {
            let mark = match step.status {
                StepStatus::Pending => " ",
                StepStatus::InProgress => "~",
                StepStatus::Completed => "x",
                StepStatus::Error => "!",
            };
            println!("    [{mark}] {}: {}", step.title, step.description);
        }
    }

    Ok(())
}
