//! BoltStudio CLI: the main entry point.
//!
//! Commands:
//! - `init`        Write the default config
//! - `run`         Run one agent episode for an objective
//! - `retry`       Re-issue the last objective
//! - `fix`         Ask the agent to fix a reported error
//! - `status`      Show staged changes, checkpoints and the plan
//! - `accept`      Apply staged changes to the project
//! - `discard`     Drop staged changes
//! - `checkpoint`  Snapshot the project files
//! - `restore`     Roll the project files back to a checkpoint

use boltstudio_agent::AgentMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod project_dir;
mod render;

#[derive(Parser)]
#[command(
    name = "boltstudio",
    about = "BoltStudio: an AI coding agent that stages its changes for review",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory
    #[arg(short, long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init,

    /// Run the agent on an objective
    Run {
        /// build, fix, refactor, ui or deploy
        #[arg(short, long)]
        mode: Option<AgentMode>,

        /// Override the turn budget
        #[arg(long)]
        max_turns: Option<u32>,

        /// What the agent should do
        #[arg(required = true, num_args = 1..)]
        objective: Vec<String>,
    },

    /// Re-issue the last objective as a fresh episode
    Retry {
        #[arg(long)]
        max_turns: Option<u32>,
    },

    /// Ask the agent to fix an error message from your terminal
    Fix {
        #[arg(required = true, num_args = 1..)]
        error: Vec<String>,
    },

    /// Show staged changes, checkpoints and the current plan
    Status,

    /// Apply staged changes (all, or one path) and write them to disk
    Accept { path: Option<String> },

    /// Drop staged changes (all, or one path)
    Discard { path: Option<String> },

    /// Snapshot the current project files
    Checkpoint { name: String },

    /// Restore the project files from a checkpoint
    Restore { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let dir = cli.dir;
    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Run {
            mode,
            max_turns,
            objective,
        } => {
            let episode = commands::run::Episode::Objective {
                text: objective.join(" "),
                mode,
            };
            commands::run::run(&dir, episode, max_turns).await?
        }
        Commands::Retry { max_turns } => {
            commands::run::run(&dir, commands::run::Episode::Retry, max_turns).await?
        }
        Commands::Fix { error } => {
            commands::run::run(&dir, commands::run::Episode::Fix(error.join(" ")), None).await?
        }
        Commands::Status => commands::status::run(&dir).await?,
        Commands::Accept { path } => commands::review::accept(&dir, path.as_deref()).await?,
        Commands::Discard { path } => commands::review::discard(&dir, path.as_deref()).await?,
        Commands::Checkpoint { name } => commands::checkpoint::create(&dir, &name).await?,
        Commands::Restore { id } => commands::checkpoint::restore(&dir, &id).await?,
    }

    Ok(())
}
