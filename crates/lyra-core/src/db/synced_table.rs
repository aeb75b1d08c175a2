//! Table mapping for synchronized entity kinds

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};

use crate::error::Error;
use crate::models::{EntityKind, Like, SyncPayload, SyncStatus, UserSetting};

/// Describes how a synced payload is stored.
///
/// Every synced table shares the same metadata columns: `modified_at`,
/// `sync_status`, `tombstone`, `attempts` and `next_retry_at`.
pub trait SyncedTable: SyncPayload + Sized {
    const KIND: EntityKind;
    const TABLE: &'static str;
    const KEY_COLUMN: &'static str;
    /// Payload columns selected before the metadata columns
    const PAYLOAD_COLUMNS: &'static str;

    /// Read the payload from a row selected with `PAYLOAD_COLUMNS`
    fn read_payload(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Insert or overwrite the row for this payload's key.
    ///
    /// Retry bookkeeping is cleared: a new write starts a fresh attempt count.
    fn write(
        &self,
        conn: &Connection,
        modified_at: i64,
        status: SyncStatus,
        tombstone: bool,
    ) -> rusqlite::Result<()>;
}

impl SyncedTable for Like {
    const KIND: EntityKind = EntityKind::LikedContent;
    const TABLE: &'static str = "liked_content";
    const KEY_COLUMN: &'static str = "content_id";
    const PAYLOAD_COLUMNS: &'static str = "content_id, content_type, is_liked";

    fn read_payload(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            content_id: row.get("content_id")?,
            content_type: parse_text(row, "content_type")?,
            is_liked: row.get("is_liked")?,
        })
    }

    fn write(
        &self,
        conn: &Connection,
        modified_at: i64,
        status: SyncStatus,
        tombstone: bool,
    ) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO liked_content
                (content_id, content_type, is_liked, modified_at, sync_status, tombstone, attempts, next_retry_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL)
             ON CONFLICT(content_id) DO UPDATE SET
                content_type = excluded.content_type,
                is_liked = excluded.is_liked,
                modified_at = excluded.modified_at,
                sync_status = excluded.sync_status,
                tombstone = excluded.tombstone,
                attempts = 0,
                next_retry_at = NULL",
            params![
                self.content_id,
                self.content_type.as_str(),
                self.is_liked,
                modified_at,
                status.as_str(),
                tombstone,
            ],
        )?;
        Ok(())
    }
}

impl SyncedTable for UserSetting {
    const KIND: EntityKind = EntityKind::Settings;
    const TABLE: &'static str = "user_settings";
    const KEY_COLUMN: &'static str = "key";
    const PAYLOAD_COLUMNS: &'static str = "key, value";

    fn read_payload(row: &Row<'_>) -> rusqlite::Result<Self> {
        let key: String = row.get("key")?;
        let value: String = row.get("value")?;
        Self::from_key_value(&key, &value).map_err(|error| conversion_error(row, "value", error))
    }

    fn write(
        &self,
        conn: &Connection,
        modified_at: i64,
        status: SyncStatus,
        tombstone: bool,
    ) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO user_settings
                (key, value, modified_at, sync_status, tombstone, attempts, next_retry_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                modified_at = excluded.modified_at,
                sync_status = excluded.sync_status,
                tombstone = excluded.tombstone,
                attempts = 0,
                next_retry_at = NULL",
            params![
                self.key().as_str(),
                self.value_to_string(),
                modified_at,
                status.as_str(),
                tombstone,
            ],
        )?;
        Ok(())
    }
}

/// Parse a text column through `FromStr`, reporting bad values as conversion failures
pub(crate) fn parse_text<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = Error>,
{
    let raw: String = row.get(column)?;
    raw.parse()
        .map_err(|error| conversion_error(row, column, error))
}

fn conversion_error(row: &Row<'_>, column: &str, error: Error) -> rusqlite::Error {
    let index = row.as_ref().column_index(column).unwrap_or_default();
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
}
