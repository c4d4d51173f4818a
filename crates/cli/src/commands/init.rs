//! `boltstudio init`: write the default configuration.

use boltstudio_config::AppConfig;

pub async fn run() -> anyhow::Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("BoltStudio setup");
    println!("================\n");

    if !config_dir.exists() {
        tokio::fs::create_dir_all(&config_dir).await?;
        println!("  Created config directory: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and re-run init.\n");
        return Ok(());
    }

    tokio::fs::write(&config_path, AppConfig::default_toml()).await?;
    println!("  Created {}", config_path.display());
    println!("\n  Next steps:");
    println!("    1. Point api_url at your OpenAI-compatible endpoint and set api_key");
    println!("       (or export BOLTSTUDIO_API_KEY)");
    println!("    2. cd into a project and run: boltstudio run \"build a todo app\"");
    println!("    3. Review with `boltstudio status`, then `boltstudio accept`\n");

    Ok(())
}
