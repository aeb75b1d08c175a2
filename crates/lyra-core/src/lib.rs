//! lyra-core - Core library for Lyra
//!
//! This crate contains the offline-first synchronization engine shared by all
//! Lyra clients: the synced entity store, the storage pressure monitor, the
//! remote API contract and the synchronizer that drives local pending state
//! towards the remote authority.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod util;

pub use config::{CachePolicy, ConfigError, LyraConfig, StorageConfig, SyncConfig};
pub use db::Store;
pub use error::{Error, Result};
pub use models::{
    ContentType, EntityKind, Like, LikedContent, SearchHistoryEntry, SettingKey, SyncConflict,
    SyncStatus, SyncedRecord, SyncedUserSetting, UserSetting, ViewedContent,
};
pub use storage::{PressureLevel, StorageInfo, StorageMonitor};
pub use sync::{PassReport, SyncError, SyncEvent, Synchronizer};
