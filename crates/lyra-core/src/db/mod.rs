//! Database layer for Lyra

mod connection;
mod history_repository;
mod migrations;
mod store;
mod sync_state_repository;
mod synced_repository;
mod synced_table;

pub use connection::Database;
pub use history_repository::{SqliteSearchHistoryRepository, SqliteViewedContentRepository};
pub(crate) use store::Snapshot;
pub use store::{ApplyOutcome, Store};
pub use sync_state_repository::{ConflictRecord, SqliteSyncStateRepository};
pub use synced_repository::{SqliteSyncedRepository, SyncedRepository};
pub use synced_table::SyncedTable;
