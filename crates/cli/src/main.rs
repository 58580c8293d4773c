//! Roadmap CLI - plan roadmaps, tracks, tasks and iterations.

mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use roadmap_events::{EventBus, EventEmittingRepository, LogEventBus, WebhookEventBus};
use roadmap_storage::{RepoError, Repository, SqliteRepository};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::Commands;

#[derive(Parser)]
#[command(name = "roadmap")]
#[command(about = "Roadmap, track, task and iteration planning", long_about = None)]
struct Cli {
    /// Database file [default: .roadmap/roadmap.db]
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = exit_code(&e);
            if code == 2 {
                eprintln!("fatal: storage failure: {e:#}");
            } else {
                eprintln!("error: {e:#}");
            }
            ExitCode::from(code)
        }
    }
}

fn init_logging() {
    let default_level = "info";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    let working_dir = std::env::current_dir().context("cannot determine working directory")?;
    let config = config::load(&working_dir)?;

    let db_path = cli
        .db
        .unwrap_or_else(|| working_dir.join(config::PROJECT_DIR).join("roadmap.db"));
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }

    let store = SqliteRepository::open(&db_path).await?.with_adr_config(config.adr);
    if let Some(code) = &config.project.code {
        if store.project_code().await? != *code {
            store.set_project_code(code).await?;
        }
    }

    let bus: Arc<dyn EventBus> = match &config.events.webhook_url {
        Some(url) => Arc::new(WebhookEventBus::new(url.clone(), config.events.publish_timeout())?),
        None => Arc::new(LogEventBus),
    };
    debug!(namespace = %config.events.namespace, "event emission enabled");
    let repo = EventEmittingRepository::new(Arc::new(store), Some(bus), &config.events);

    let result = commands::run(&repo, cli.command).await;
    repo.settle().await;
    result
}

/// 2 for storage failures, 1 for everything the user can correct.
fn exit_code(error: &anyhow::Error) -> u8 {
    let store_failure = error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<RepoError>())
        .any(|e| matches!(e, RepoError::Store(_)));
    if store_failure {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roadmap_core::ValidationError;

    #[test]
    fn test_exit_codes() {
        let store = anyhow::Error::new(RepoError::Store("disk I/O error".into()));
        assert_eq!(exit_code(&store), 2);

        let wrapped = anyhow::Error::new(RepoError::Store("locked".into())).context("creating task");
        assert_eq!(exit_code(&wrapped), 2);

        let missing = anyhow::Error::new(RepoError::NotFound("task P-task-9".into()));
        assert_eq!(exit_code(&missing), 1);

        let invalid = anyhow::Error::new(ValidationError::SelfDependency("track-a".into()));
        assert_eq!(exit_code(&invalid), 1);
    }

    #[test]
    fn test_cli_parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "roadmap",
            "--db",
            "/tmp/x.db",
            "task",
            "list",
            "--status",
            "in-progress",
            "--status",
            "todo",
        ])
        .unwrap();
        assert_eq!(cli.db.as_deref(), Some(std::path::Path::new("/tmp/x.db")));
        assert!(matches!(
            cli.command,
            Commands::Task(commands::TaskCommand::List { ref status, .. }) if status.len() == 2
        ));

        assert!(Cli::try_parse_from(["roadmap", "track", "list", "--status", "finished"]).is_err());
    }
}
