use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "auditor")]
#[command(version, about = "Dependency-aware audit orchestration engine")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Directory holding auditor.toml (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate an audit manifest and print its execution phases
    Plan {
        /// Path to the audit manifest (TOML with [[audit]] entries)
        manifest: PathBuf,

        /// Print the phase plan as JSON
        #[arg(long)]
        json: bool,

        /// Leave these audit ids out (repeatable)
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// View, validate or create auditor.toml
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default auditor.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    auditor::logging::init_tracing(cli.log_json, auditor::logging::level_for(cli.verbose));

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Plan {
            manifest,
            json,
            exclude,
        } => cmd::cmd_plan(&project_dir, manifest, *json, exclude)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
