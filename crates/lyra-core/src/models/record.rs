//! Generic synced record shape

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::SyncStatus;
use crate::error::Error;

/// Payload of a record that is synchronized with the remote authority.
pub trait SyncPayload: Clone + Send + Sync + 'static {
    /// Stable key addressing the record locally and remotely.
    fn record_key(&self) -> String;
}

/// A payload plus the sync metadata every synchronized entity carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedRecord<T> {
    pub payload: T,
    /// Last local mutation (Unix ms), strictly increasing per key
    pub modified_at: i64,
    pub sync_status: SyncStatus,
}

impl<T: SyncPayload> SyncedRecord<T> {
    pub const fn new(payload: T, modified_at: i64, sync_status: SyncStatus) -> Self {
        Self {
            payload,
            modified_at,
            sync_status,
        }
    }

    /// Key of the wrapped payload
    pub fn key(&self) -> String {
        self.payload.record_key()
    }
}

/// A record read for pushing, with the retry bookkeeping stored next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord<T> {
    pub record: SyncedRecord<T>,
    /// Failed push attempts since the last successful sync
    pub attempts: u32,
    /// Whether the row is a tombstone (push as delete)
    pub tombstone: bool,
}

/// Synchronized entity types. Each kind has its own sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    LikedContent,
    Settings,
    ViewedContent,
}

impl EntityKind {
    pub const ALL: [Self; 3] = [Self::LikedContent, Self::Settings, Self::ViewedContent];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LikedContent => "liked_content",
            Self::Settings => "settings",
            Self::ViewedContent => "viewed_content",
        }
    }

    /// Whether remote changes are pulled for this kind.
    pub const fn is_pulled(self) -> bool {
        !matches!(self, Self::ViewedContent)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown entity kind: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_parses_storage_names() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("likes".parse::<EntityKind>().is_err());
    }

    #[test]
    fn viewed_content_is_push_only() {
        assert!(EntityKind::LikedContent.is_pulled());
        assert!(EntityKind::Settings.is_pulled());
        assert!(!EntityKind::ViewedContent.is_pulled());
    }
}
