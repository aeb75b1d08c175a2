//! Data models for Lyra

mod liked;
mod record;
mod search_history;
mod settings;
mod sync_conflict;
mod sync_status;
mod viewed;

pub use liked::{ContentType, Like, LikedContent};
pub use record::{EntityKind, PendingRecord, SyncPayload, SyncedRecord};
pub use search_history::SearchHistoryEntry;
pub use settings::{SettingKey, SyncedUserSetting, UserSetting};
pub use sync_conflict::{ConflictWinner, SyncConflict};
pub use sync_status::{StatusSummary, SyncStatus};
pub use viewed::ViewedContent;
