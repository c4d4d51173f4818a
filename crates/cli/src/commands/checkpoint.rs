//! `boltstudio checkpoint` / `boltstudio restore`.

use super::load_config;
use crate::project_dir::ProjectDir;
use boltstudio_core::project::ProjectStore;
use boltstudio_workspace::Workspace;
use std::path::Path;

pub async fn create(dir: &Path, name: &str) -> anyhow::Result<()> {
    let config = load_config()?;
    let project = ProjectDir::new(dir, &config.workspace);
    let session = project.open_session().await?;

    let id = session.workspace().write().await.add_checkpoint(name);
    project.save_session(&session).await?;

    println!("  checkpoint {id}  {name}");
    Ok(())
}

/// Restore by full id or by an unambiguous id prefix. Rewrites the project
/// directory to match the checkpoint.
pub async fn restore(dir: &Path, id: &str) -> anyhow::Result<()> {
    let config = load_config()?;
    let project = ProjectDir::new(dir, &config.workspace);
    let session = project.open_session().await?;

    let (previous, restored) = {
        let mut ws = session.workspace().write().await;
        let full_id = resolve_checkpoint(&ws, id)?;
        let previous = ws.files().clone();
        ws.restore_checkpoint(&full_id)?;
        (previous, ws.files().clone())
    };

    project.sync_files(&restored, &previous).await?;
    project.save_session(&session).await?;
    project.store().save(&session.snapshot().await).await?;

    println!("  restored {} file(s) from checkpoint {id}", restored.len());
    Ok(())
}

fn resolve_checkpoint(ws: &Workspace, id: &str) -> anyhow::Result<String> {
    if ws.checkpoint(id).is_some() {
        return Ok(id.to_string());
    }
    let matches: Vec<&str> = ws
        .checkpoints()
        .iter()
        .map(|c| c.id.as_str())
        .filter(|c| c.starts_with(id))
        .collect();
    match matches.as_slice() {
        [only] => Ok(only.to_string()),
        [] => anyhow::bail!("Checkpoint not found: {id}"),
        _ => anyhow::bail!("Checkpoint id {id} is ambiguous ({} matches)", matches.len()),
    }
}
