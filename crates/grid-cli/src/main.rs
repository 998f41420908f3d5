//! GRID Cloud CLI
//!
//! Logs in with an API key and keeps a local workspace in sync with its
//! cloud copy.

mod cli;
mod commands;
mod context;
mod error;
mod logging;

use std::time::Duration;

use clap::{CommandFactory, Parser};
use colored::Colorize;

use grid_core::ReleaseSpec;

use cli::{Cli, Commands, ConfigAction, WorkspaceAction};
use context::AppContext;
use error::Result;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    match cli.command {
        Some(cmd) => execute_command(cmd, cli.root, cli.config_dir).await,
        None => {
            println!("{} GRID Cloud CLI", "grid".green().bold());
            println!();
            println!("Run {} for available commands.", "grid --help".cyan());
            Ok(())
        }
    }
}

async fn execute_command(
    cmd: Commands,
    root: Option<std::path::PathBuf>,
    config_dir: Option<std::path::PathBuf>,
) -> Result<()> {
    // Commands that need no workspace or account context
    match cmd {
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "grid", &mut std::io::stdout());
            return Ok(());
        }
        Commands::PublishRelease {
            version,
            file,
            channel,
            platform,
            arch,
            repo,
        } => {
            let spec = ReleaseSpec {
                channel,
                platform,
                arch,
                repo,
                ..ReleaseSpec::new(version, file)
            };
            commands::run_publish(&spec).await?;
            return Ok(());
        }
        _ => {}
    }

    let ctx = AppContext::load(root, config_dir)?;
    let auth = ctx.auth()?;

    match cmd {
        Commands::Login { api_key } => {
            let config_sync = ctx.config_sync(auth.clone())?;
            commands::run_login(&auth, &config_sync, api_key).await?;
        }
        Commands::Logout => commands::run_logout(&auth)?,
        Commands::Whoami => {
            commands::run_whoami(&auth).await?;
        }
        Commands::Workspaces { action } => {
            let remote = ctx.remote()?;
            match action {
                WorkspaceAction::List => {
                    commands::run_list(&*remote, &*auth).await?;
                }
                WorkspaceAction::Create { name } => {
                    commands::run_create(&*remote, &*auth, &ctx.root, &name).await?;
                }
            }
        }
        Commands::Sync { create, json } => {
            let service = ctx.sync_service(auth, create)?;
            commands::run_sync(&service, json).await?;
        }
        Commands::Status { json } => {
            let service = ctx.sync_service(auth, false)?;
            commands::run_status(&service, json).await?;
        }
        Commands::Resync => {
            let service = ctx.sync_service(auth, false)?;
            commands::run_resync(&service, false).await?;
        }
        Commands::Watch { interval } => {
            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| ctx.config.sync_interval());
            if interval.is_zero() {
                return Err(error::CliError::user("--interval must be positive"));
            }
            let service = ctx.sync_service(auth.clone(), false)?;
            commands::run_watch(service, &auth, interval).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Pull => {
                let config_sync = ctx.config_sync(auth)?;
                commands::run_pull(&config_sync).await?;
            }
            ConfigAction::Show => commands::run_show(&ctx.config)?,
        },
        Commands::Completions { .. } | Commands::PublishRelease { .. } => {}
    }
    Ok(())
}
