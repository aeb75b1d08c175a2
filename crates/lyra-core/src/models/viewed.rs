//! Viewed content model

use serde::{Deserialize, Serialize};

use super::ContentType;

/// Append-only history entry of content the user opened.
///
/// Entries never change after creation apart from `synced`, which only
/// flips to `true` once the remote accepts the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewedContent {
    /// Monotonic local id
    pub id: i64,
    pub content_type: ContentType,
    pub content_id: String,
    /// Creation timestamp (Unix ms)
    pub created: i64,
    pub synced: bool,
}
