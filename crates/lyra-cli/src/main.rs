//! Lyra CLI - record listening state locally and sync it
//!
//! Every command works offline against the local database. `lyra sync`
//! pushes pending changes and pulls remote ones when a remote is configured.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use lyra_core::LyraConfig;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, SearchCommands, SettingCommands, SyncCommands};
use crate::commands::common::{open_store, resolve_db_path};
use crate::commands::like::run_like;
use crate::commands::search::{run_search_add, run_search_clear, run_search_list};
use crate::commands::setting::{
    run_setting_get, run_setting_list, run_setting_reset, run_setting_set,
};
use crate::commands::status::run_status;
use crate::commands::storage::run_storage;
use crate::commands::sync::{run_sync, run_sync_conflicts};
use crate::commands::view::{run_view, run_view_list};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("lyra=debug,lyra_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = LyraConfig::from_env()?;
    let db_path = resolve_db_path(cli.db_path);

    if let Commands::Storage { check, json } = cli.command {
        return run_storage(&db_path, &config.storage, check, json);
    }

    let store = open_store(&db_path, &config)?;
    match cli.command {
        Commands::Like {
            content_id,
            content_type,
            json,
        } => run_like(&store, &content_id, content_type, true, json)?,
        Commands::Unlike {
            content_id,
            content_type,
            json,
        } => run_like(&store, &content_id, content_type, false, json)?,
        Commands::View {
            content_id: Some(content_id),
            content_type,
            ..
        } => run_view(&store, &content_id, content_type)?,
        Commands::View {
            content_id: None,
            limit,
            json,
            ..
        } => run_view_list(&store, limit, json)?,
        Commands::Search { command } => match command {
            SearchCommands::Add {
                query,
                content_id,
                content_type,
            } => run_search_add(&store, &query, &content_id, content_type)?,
            SearchCommands::List { limit, json } => run_search_list(&store, limit, json)?,
            SearchCommands::Clear => run_search_clear(&store)?,
        },
        Commands::Setting { command } => match command {
            SettingCommands::Get { key, json } => run_setting_get(&store, key, json)?,
            SettingCommands::Set { key, value } => run_setting_set(&store, key, &value)?,
            SettingCommands::Reset { key } => run_setting_reset(&store, key)?,
            SettingCommands::List { json } => run_setting_list(&store, json)?,
        },
        Commands::Sync {
            command: Some(SyncCommands::Conflicts { limit, json }),
            ..
        } => run_sync_conflicts(&store, limit, json)?,
        Commands::Sync {
            command: None,
            watch,
            kind,
            json,
        } => run_sync(store, &config.sync, kind, watch, json).await?,
        Commands::Status { json } => run_status(&store, json)?,
        // Handled before the store is opened.
        Commands::Storage { .. } => {}
    }

    Ok(())
}
