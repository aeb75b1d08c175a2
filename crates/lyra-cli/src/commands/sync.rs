use std::sync::Arc;

use lyra_core::remote::HttpRemoteApi;
use lyra_core::{EntityKind, Store, SyncConfig, SyncEvent, Synchronizer};
use tokio::sync::broadcast::error::RecvError;

use crate::commands::common::{
    format_pass_report, format_sync_conflict_lines, print_json, sync_conflict_to_item,
    SyncConflictItem,
};
use crate::error::CliError;

pub fn build_synchronizer(store: Store, config: &SyncConfig) -> Result<Synchronizer, CliError> {
    if !config.is_configured() {
        return Err(CliError::SyncNotConfigured);
    }
    let remote = HttpRemoteApi::new(config)?;
    Ok(Synchronizer::new(store, Arc::new(remote), config.clone()))
}

pub async fn run_sync(
    store: Store,
    config: &SyncConfig,
    kind: Option<EntityKind>,
    watch: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let sync = build_synchronizer(store, config)?;
    if watch {
        return watch_sync(&sync).await;
    }

    let reports = match kind {
        Some(kind) => vec![sync.sync_now(kind).await?],
        None => sync.sync_all().await?,
    };

    if as_json {
        return print_json(&reports);
    }
    for report in &reports {
        println!("{}", format_pass_report(report));
    }
    Ok(())
}

/// Run the background workers until Ctrl-C
async fn watch_sync(sync: &Synchronizer) -> Result<(), CliError> {
    let mut events = sync.subscribe_events();
    sync.start();
    sync.wake_up();
    println!("Syncing in the background. Press Ctrl-C to stop.");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            event = events.recv() => match event {
                Ok(SyncEvent::PassCompleted { report, .. }) => {
                    if !report.is_idle() {
                        println!("{}", format_pass_report(&report));
                    }
                }
                Ok(SyncEvent::PassAborted { kind, error }) => {
                    eprintln!("{kind}: {error}");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Skipped {skipped} sync events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    sync.shutdown().await;
    println!("Sync stopped");
    Ok(())
}

pub fn run_sync_conflicts(store: &Store, limit: usize, as_json: bool) -> Result<(), CliError> {
    let conflicts = store.conflicts(limit)?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        return print_json(&json_items);
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}
