use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::BufReader;

use agentyard::cleanup::TerminalCleanupGuard;
use agentyard::domains::git;
use agentyard::domains::settings::{AppConfig, load_config};
use agentyard::domains::terminal::{TerminalBackend, replay};
use agentyard::events::event_channel;
use agentyard::services::AppServices;
use agentyard::transport;

/// Run several AI coding agents side by side, each in its own git worktree.
#[derive(Parser, Debug)]
#[command(name = "agentyard", version, about)]
pub struct Cli {
    /// Config file to load instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Session store file, overriding `store_path` from the config
    #[arg(long, global = true, value_name = "FILE")]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve JSON-lines requests on stdin, writing responses and events to stdout
    Serve,

    /// Print the worktrees registered in a repository
    Worktrees {
        /// Repository to inspect
        repo: PathBuf,
    },

    /// Replay a recorded terminal transcript through the output classifier
    Classify {
        /// Transcript file with raw terminal bytes
        file: PathBuf,

        /// Bytes fed per chunk
        #[arg(long, default_value_t = 256)]
        chunk: usize,
    },
}

impl Cli {
    fn load_config(&self) -> AppConfig {
        let mut config = load_config(self.config.as_deref());
        if let Some(store) = &self.store {
            config.store_path = Some(store.clone());
        }
        config
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Serve => serve(cli.load_config()).await,
        Commands::Worktrees { repo } => print_worktrees(repo.clone()).await,
        Commands::Classify { file, chunk } => classify(file, *chunk),
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    let (sink, events) = event_channel();
    let services = Arc::new(AppServices::new(config, Arc::new(sink)));
    let _cleanup =
        TerminalCleanupGuard::new(Arc::clone(&services.terminals) as Arc<dyn TerminalBackend>);

    log::info!("agentyard serving on stdio");
    let mut stdout = tokio::io::stdout();
    transport::serve(
        services,
        events,
        BufReader::new(tokio::io::stdin()),
        &mut stdout,
    )
    .await
}

async fn print_worktrees(repo: PathBuf) -> Result<()> {
    let records = tokio::task::spawn_blocking(move || git::list_worktrees(&repo))
        .await
        .context("Worktree listing task failed")??;
    for record in records {
        let branch = if record.branch_name.is_empty() {
            "(detached)"
        } else {
            record.branch_name.as_str()
        };
        let marker = if record.is_primary { " [primary]" } else { "" };
        println!("{}\t{branch}{marker}", record.path.display());
    }
    Ok(())
}

fn classify(file: &Path, chunk: usize) -> Result<()> {
    let transcript =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    for state in replay(&transcript, chunk) {
        println!("{}", serde_json::to_string(&state)?);
    }
    Ok(())
}
