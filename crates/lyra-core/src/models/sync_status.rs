//! Sync status model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Lifecycle of a locally-owned record relative to its remote copy.
///
/// Transitions only move forward, except `Failed -> PendingSync` when a
/// retry comes due and `Conflict -> Synced` once the conflict is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local and remote agree
    Synced,
    /// Local holds a change the remote does not have yet
    PendingSync,
    /// Tombstone waiting to be propagated
    PendingDelete,
    /// Remote holds newer data than the local write
    Conflict,
    /// Last attempt errored; retried with backoff
    Failed,
}

impl SyncStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Synced,
        Self::PendingSync,
        Self::PendingDelete,
        Self::Conflict,
        Self::Failed,
    ];

    /// Storage representation of this status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::PendingSync => "pending_sync",
            Self::PendingDelete => "pending_delete",
            Self::Conflict => "conflict",
            Self::Failed => "failed",
        }
    }

    /// Whether the status is picked up by the next push.
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::PendingSync | Self::PendingDelete)
    }

    /// Whether the record carries a user change the remote has not acknowledged.
    ///
    /// This side wins an exact `modified_at` tie during reconciliation.
    pub const fn has_local_intent(self) -> bool {
        matches!(self, Self::PendingSync | Self::PendingDelete | Self::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown sync status: {s}")))
    }
}

/// Number of records per status for one entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub synced: usize,
    pub pending_sync: usize,
    pub pending_delete: usize,
    pub conflict: usize,
    pub failed: usize,
}

impl StatusSummary {
    /// Add `count` records with the given status.
    pub fn add(&mut self, status: SyncStatus, count: usize) {
        let slot = match status {
            SyncStatus::Synced => &mut self.synced,
            SyncStatus::PendingSync => &mut self.pending_sync,
            SyncStatus::PendingDelete => &mut self.pending_delete,
            SyncStatus::Conflict => &mut self.conflict,
            SyncStatus::Failed => &mut self.failed,
        };
        *slot += count;
    }

    /// Records that still need to reach the remote.
    pub const fn outstanding(&self) -> usize {
        self.pending_sync + self.pending_delete + self.conflict + self.failed
    }

    pub const fn total(&self) -> usize {
        self.synced + self.outstanding()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_string() {
        for status in SyncStatus::ALL {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("pending".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn local_intent_covers_unacknowledged_changes() {
        assert!(SyncStatus::PendingSync.has_local_intent());
        assert!(SyncStatus::PendingDelete.has_local_intent());
        assert!(SyncStatus::Failed.has_local_intent());
        assert!(!SyncStatus::Synced.has_local_intent());
        assert!(!SyncStatus::Conflict.has_local_intent());
    }

    #[test]
    fn summary_counts_outstanding_records() {
        let mut summary = StatusSummary::default();
        summary.add(SyncStatus::Synced, 3);
        summary.add(SyncStatus::Failed, 1);
        summary.add(SyncStatus::PendingSync, 2);
        assert_eq!(summary.outstanding(), 3);
        assert_eq!(summary.total(), 6);
    }
}
