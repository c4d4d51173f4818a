//! `boltstudio accept` / `boltstudio discard`: resolve staged changes.

use super::load_config;
use crate::project_dir::ProjectDir;
use boltstudio_core::project::ProjectStore;
use std::path::Path;

pub async fn accept(dir: &Path, path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config()?;
    let project = ProjectDir::new(dir, &config.workspace);
    let session = project.open_session().await?;

    let accepted: Vec<(String, String)> = {
        let mut ws = session.workspace().write().await;
        let paths = ws.accept(path);
        paths
            .into_iter()
            .filter_map(|p| ws.file(&p).map(|c| (p.clone(), c.to_string())))
            .collect()
    };
    if accepted.is_empty() {
        println!("  Nothing staged{}", for_path(path));
        return Ok(());
    }

    project
        .write_files(accepted.iter().map(|(p, c)| (p.as_str(), c.as_str())))
        .await?;
    project.save_session(&session).await?;
    project.store().save(&session.snapshot().await).await?;

    for (p, _) in &accepted {
        println!("  accepted {p}");
    }
    Ok(())
}

pub async fn discard(dir: &Path, path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config()?;
    let project = ProjectDir::new(dir, &config.workspace);
    let session = project.open_session().await?;

    let discarded = session.workspace().write().await.discard(path);
    if discarded.is_empty() {
        println!("  Nothing staged{}", for_path(path));
        return Ok(());
    }

    project.save_session(&session).await?;
    for p in &discarded {
        println!("  discarded {p}");
    }
    Ok(())
}

fn for_path(path: Option<&str>) -> String {
    path.map(|p| format!(" for {p}")).unwrap_or_default()
}
