//! Liked content model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{SyncPayload, SyncedRecord};
use crate::error::Error;

/// Type of catalog content a user can like or view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Artist,
    Album,
    Track,
    #[default]
    Unknown,
}

impl ContentType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::Album => "album",
            Self::Track => "track",
            Self::Unknown => "unknown",
        }
    }

    /// Infer the content type from a catalog id prefix (`R`, `A`, `T`).
    pub fn from_id(id: &str) -> Self {
        match id.chars().next() {
            Some('R') => Self::Artist,
            Some('A') => Self::Album,
            Some('T') => Self::Track,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "artist" => Ok(Self::Artist),
            "album" => Ok(Self::Album),
            "track" => Ok(Self::Track),
            "unknown" => Ok(Self::Unknown),
            other => Err(Error::InvalidInput(format!("Unknown content type: {other}"))),
        }
    }
}

/// Like flag for one piece of content, keyed by `content_id`.
///
/// Rows are never hard-deleted; unliking flips `is_liked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub content_id: String,
    pub content_type: ContentType,
    pub is_liked: bool,
}

impl Like {
    pub fn new(content_id: impl Into<String>, content_type: ContentType, is_liked: bool) -> Self {
        Self {
            content_id: content_id.into(),
            content_type,
            is_liked,
        }
    }
}

impl SyncPayload for Like {
    fn record_key(&self) -> String {
        self.content_id.clone()
    }
}

/// Liked content row with sync metadata
pub type LikedContent = SyncedRecord<Like>;
