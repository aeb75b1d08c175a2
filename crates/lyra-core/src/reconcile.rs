//! Last-writer-wins reconciliation between a local row and a remote change.
//!
//! A strictly greater `modified_at` wins. On an exact tie the local side wins
//! only while it still carries an unacknowledged change of its own; otherwise
//! the remote value is taken. Re-running with no new writes therefore
//! converges: every row ends up `Synced` with the winning value.

use crate::models::{ConflictWinner, SyncStatus};

/// Strategy name recorded in the conflict log
pub const LWW_STRATEGY: &str = "lww";

/// Local version of a record as seen by reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVersion {
    pub modified_at: i64,
    pub status: SyncStatus,
}

/// Outcome of comparing a local row with a remote change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Keep the local value; a pending row is resent as is, a conflicting one is requeued
    KeepLocal,
    /// Overwrite local with the remote value and mark it `Synced`
    TakeRemote,
}

impl Resolution {
    pub const fn winner(self) -> ConflictWinner {
        match self {
            Self::KeepLocal => ConflictWinner::Local,
            Self::TakeRemote => ConflictWinner::Remote,
        }
    }
}

/// Decide which side wins for one key.
pub fn resolve(local: Option<LocalVersion>, remote_modified_at: i64) -> Resolution {
    let Some(local) = local else {
        return Resolution::TakeRemote;
    };

    match local.modified_at.cmp(&remote_modified_at) {
        std::cmp::Ordering::Greater => Resolution::KeepLocal,
        std::cmp::Ordering::Less => Resolution::TakeRemote,
        std::cmp::Ordering::Equal if local.status.has_local_intent() => Resolution::KeepLocal,
        std::cmp::Ordering::Equal => Resolution::TakeRemote,
    }
}

/// Whether a decision overrode a diverged row and belongs in the conflict log.
///
/// Plain refreshes of `Synced` rows are not conflicts.
pub fn is_conflict(local: Option<LocalVersion>) -> bool {
    local.is_some_and(|local| {
        local.status.has_local_intent() || local.status == SyncStatus::Conflict
    })
}
