//! Chroni CLI - offline-first health journal from the terminal
//!
//! Check-ins are saved locally first and synced whenever the journal
//! backend is reachable.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::{load_config, open_client, AppPaths};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chroni=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = AppPaths::resolve(cli.data_dir, cli.config)?;

    match cli.command {
        Commands::Config { command } => commands::config::run_config(command, &paths),
        Commands::Completions { shell, output } => {
            commands::completions::run_completions(shell, output.as_deref())
        }
        command => run_with_client(command, &paths).await,
    }
}

async fn run_with_client(command: Commands, paths: &AppPaths) -> Result<(), CliError> {
    let client = open_client(paths).await?;
    match command {
        Commands::Add(args) => commands::add::run_add(&args, &client).await,
        Commands::List {
            limit,
            from,
            to,
            entry_type,
            json,
        } => {
            let filter = commands::list::build_filter(limit, from, to, entry_type);
            commands::list::run_list(&filter, json, &client).await
        }
        Commands::Show { id } => commands::show::run_show(&id, &client).await,
        Commands::Delete { id } => commands::delete::run_delete(&id, &client).await,
        Commands::Sync {
            release_parked,
            watch,
        } => {
            let interval = if watch {
                Some(commands::sync::watch_interval(&load_config(paths)?))
            } else {
                None
            };
            commands::sync::run_sync(release_parked, interval, &client).await
        }
        Commands::Status { json } => commands::status::run_status(json, &client).await,
        Commands::Summary { json } => commands::summary::run_summary(json, &client).await,
        Commands::Trends { days, json } => commands::trends::run_trends(days, json, &client).await,
        Commands::Insight { command } => commands::insight::run_insight(command, &client).await,
        Commands::Import { owner, decision } => {
            commands::import::run_import(&owner, decision, &client).await
        }
        Commands::Config { .. } | Commands::Completions { .. } => Ok(()),
    }
}
