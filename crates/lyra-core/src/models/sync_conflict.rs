//! Sync conflict model

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::EntityKind;
use crate::error::Error;

/// Side that won a reconciled conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictWinner {
    Local,
    Remote,
}

impl ConflictWinner {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl FromStr for ConflictWinner {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(Error::InvalidInput(format!("Unknown conflict winner: {other}"))),
        }
    }
}

/// Recorded sync conflict resolved by strategy (e.g., LWW)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Entity kind the record belongs to
    pub entity_kind: EntityKind,
    /// Key of the record involved in the conflict
    pub record_key: String,
    /// Local row's timestamp when the conflict was resolved
    pub local_modified_at: i64,
    /// Incoming remote timestamp
    pub incoming_modified_at: i64,
    /// Which side's value was kept
    pub winner: ConflictWinner,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
    /// Resolution strategy name
    pub strategy: String,
}
