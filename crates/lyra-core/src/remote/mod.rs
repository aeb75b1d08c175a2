//! Remote API contract.
//!
//! The synchronizer talks to the remote authority only through [`RemoteApi`].
//! Every push carries the record's `modified_at`; the remote rejects a write
//! older than what it already holds with [`RemoteError::StaleWrite`].
//!
//! Pulls are incremental over a per-kind checkpoint (the server's event
//! sequence). A checkpoint of 0 asks for everything the remote still has.

mod http;
mod mock;

pub use http::HttpRemoteApi;
pub use mock::{MockRemote, PushGate, PushedCall};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    EntityKind, Like, LikedContent, SettingKey, SyncPayload, UserSetting, ViewedContent,
};

/// Remote call outcomes other than success.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The remote holds a newer version of the record.
    #[error("stale write: server has modified_at {server_modified_at}")]
    StaleWrite { server_modified_at: i64 },

    /// Network or server failure worth retrying.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// Too many requests; retry no sooner than `retry_after` when given.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Credentials were rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The remote pruned the events after the requested checkpoint.
    #[error("sync checkpoint expired")]
    CheckpointExpired,
}

impl RemoteError {
    /// Whether the same request may succeed later without local changes.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::RateLimited { .. } | Self::Timeout
        )
    }

    /// Minimum wait the remote asked for before the next attempt
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// A change made on the remote, with the version that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteChange {
    Like { like: Like, modified_at: i64 },
    Setting { setting: UserSetting, modified_at: i64 },
    /// The setting went back to its default value.
    SettingReset { key: SettingKey, modified_at: i64 },
}

impl RemoteChange {
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Like { .. } => EntityKind::LikedContent,
            Self::Setting { .. } | Self::SettingReset { .. } => EntityKind::Settings,
        }
    }

    pub const fn modified_at(&self) -> i64 {
        match self {
            Self::Like { modified_at, .. }
            | Self::Setting { modified_at, .. }
            | Self::SettingReset { modified_at, .. } => *modified_at,
        }
    }

    pub fn record_key(&self) -> String {
        match self {
            Self::Like { like, .. } => like.record_key(),
            Self::Setting { setting, .. } => setting.record_key(),
            Self::SettingReset { key, .. } => key.as_str().to_string(),
        }
    }

    /// Whether the change resets a setting to its default
    pub const fn is_reset(&self) -> bool {
        matches!(self, Self::SettingReset { .. })
    }

    pub fn as_like(&self) -> Option<(Like, i64)> {
        match self {
            Self::Like { like, modified_at } => Some((like.clone(), *modified_at)),
            _ => None,
        }
    }

    /// The setting value this change leaves in place; a reset yields the default.
    pub const fn as_setting(&self) -> Option<(UserSetting, i64)> {
        match self {
            Self::Setting {
                setting,
                modified_at,
            } => Some((*setting, *modified_at)),
            Self::SettingReset { key, modified_at } => {
                Some((key.default_setting(), *modified_at))
            }
            Self::Like { .. } => None,
        }
    }
}

/// Changes after a checkpoint plus the checkpoint to resume from next time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub changes: Vec<RemoteChange>,
    pub checkpoint: i64,
}

/// Remote authority for synced entities.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Push the current like flag of one piece of content.
    async fn push_liked_content(&self, record: &LikedContent) -> Result<(), RemoteError>;

    /// Push a setting value; `None` resets the key to its default.
    async fn push_setting(
        &self,
        key: SettingKey,
        setting: Option<&UserSetting>,
        modified_at: i64,
    ) -> Result<(), RemoteError>;

    /// Append one viewed content entry.
    async fn push_viewed_content(&self, entry: &ViewedContent) -> Result<(), RemoteError>;

    /// Changes of one kind after `checkpoint`.
    async fn pull_changes_since(
        &self,
        kind: EntityKind,
        checkpoint: i64,
    ) -> Result<ChangeBatch, RemoteError>;
}
