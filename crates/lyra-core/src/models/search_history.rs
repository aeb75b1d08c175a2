//! Search history model (local only, never synced)

use serde::{Deserialize, Serialize};

use super::ContentType;

/// A search the user followed through to a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub id: i64,
    pub query: String,
    pub content_type: ContentType,
    pub content_id: String,
    /// Creation timestamp (Unix ms)
    pub created: i64,
}
