//! bugtrail CLI - versioned hierarchical storage for bug tracking.

use bugtrail::cli::{Cli, Commands};
use bugtrail::commands;
use bugtrail::config::Config;
use clap::Parser;
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    // BUGTRAIL_LOG=debug surfaces every external command invocation.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("BUGTRAIL_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let repo = cli
        .repo_path
        .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(cli.command, &repo, cli.vcs.as_deref(), &config) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(
    command: Commands,
    repo: &Path,
    vcs: Option<&str>,
    config: &Config,
) -> bugtrail::Result<()> {
    match command {
        Commands::Init => commands::init(repo, vcs, config),
        Commands::Destroy => commands::destroy(repo, vcs, config),
        Commands::Add {
            id,
            parent,
            directory,
        } => commands::add(repo, vcs, config, &id, parent.as_deref(), directory),
        Commands::Get { id, revision } => {
            commands::get(repo, vcs, config, &id, revision.as_deref())
        }
        Commands::Set { id, value } => commands::set(repo, vcs, config, &id, value.as_deref()),
        Commands::Remove { id, recursive } => {
            commands::remove(repo, vcs, config, &id, recursive)
        }
        Commands::List { id, revision } => {
            commands::list(repo, vcs, config, id.as_deref(), revision.as_deref())
        }
        Commands::Commit {
            summary,
            body,
            allow_empty,
        } => commands::commit(repo, vcs, config, &summary, body.as_deref(), allow_empty),
        Commands::Revision { index } => commands::revision(repo, vcs, config, index),
        Commands::Changed { revision } => commands::changed(repo, vcs, config, &revision),
        Commands::User => commands::user(repo, vcs, config),
    }
}
