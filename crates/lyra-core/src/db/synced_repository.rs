//! Synced entity repository implementation
//!
//! One generic repository serves every synced kind. Status transitions made on
//! behalf of the synchronizer are compare-and-set on `(key, modified_at,
//! status)`: if a newer local write landed in between, the update matches no
//! row and the newer write stays pending.

use std::marker::PhantomData;

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::synced_table::{parse_text, SyncedTable};
use crate::error::{Error, Result};
use crate::models::{PendingRecord, StatusSummary, SyncStatus, SyncedRecord};
use crate::reconcile::LocalVersion;
use crate::util::now_millis;

/// Trait for synced entity storage operations
pub trait SyncedRepository<T> {
    /// All rows ordered by key
    fn get_all(&self) -> Result<Vec<SyncedRecord<T>>>;

    /// Get a row by key
    fn get(&self, key: &str) -> Result<Option<SyncedRecord<T>>>;

    /// Overwrite by key with status `PendingSync` and a monotonic `modified_at`
    fn upsert(&self, payload: &T, modified_at: Option<i64>) -> Result<SyncedRecord<T>>;

    /// Set the status of a row regardless of its version
    fn set_sync_status(&self, key: &str, status: SyncStatus) -> Result<()>;

    /// Remove a row whose delete was acknowledged (status `PendingDelete`)
    fn delete(&self, key: &str) -> Result<()>;
}

/// `SQLite` implementation of `SyncedRepository`
pub struct SqliteSyncedRepository<'a, T> {
    conn: &'a Connection,
    _payload: PhantomData<T>,
}

impl<'a, T: SyncedTable> SqliteSyncedRepository<'a, T> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            _payload: PhantomData,
        }
    }

    fn select_sql(filter: &str) -> String {
        format!(
            "SELECT {}, modified_at, sync_status, attempts, tombstone FROM {} {filter}",
            T::PAYLOAD_COLUMNS,
            T::TABLE
        )
    }

    /// Parse a row selected with `select_sql`
    fn parse_row(row: &Row<'_>) -> rusqlite::Result<PendingRecord<T>> {
        let payload = T::read_payload(row)?;
        Ok(PendingRecord {
            record: SyncedRecord::new(
                payload,
                row.get("modified_at")?,
                parse_text(row, "sync_status")?,
            ),
            attempts: row.get("attempts")?,
            tombstone: row.get("tombstone")?,
        })
    }

    fn get_row(&self, key: &str) -> Result<Option<PendingRecord<T>>> {
        let sql = Self::select_sql(&format!("WHERE {} = ?1", T::KEY_COLUMN));
        let row = self
            .conn
            .query_row(&sql, params![key], Self::parse_row)
            .optional()?;
        Ok(row)
    }

    /// Pick the next `modified_at` for a key: strictly greater than the stored one
    fn next_modified_at(&self, key: &str, requested: Option<i64>) -> Result<i64> {
        let previous: Option<i64> = self
            .conn
            .query_row(
                &format!(
                    "SELECT modified_at FROM {} WHERE {} = ?1",
                    T::TABLE,
                    T::KEY_COLUMN
                ),
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let candidate = requested.unwrap_or_else(now_millis);
        Ok(match previous {
            Some(previous) if candidate <= previous => previous + 1,
            _ => candidate,
        })
    }

    /// Write a tombstone with status `PendingDelete`
    pub fn upsert_tombstone(
        &self,
        payload: &T,
        modified_at: Option<i64>,
    ) -> Result<SyncedRecord<T>> {
        let modified_at = self.next_modified_at(&payload.record_key(), modified_at)?;
        payload.write(self.conn, modified_at, SyncStatus::PendingDelete, true)?;
        Ok(SyncedRecord::new(
            payload.clone(),
            modified_at,
            SyncStatus::PendingDelete,
        ))
    }

    /// Row with its retry bookkeeping
    pub fn get_pending_record(&self, key: &str) -> Result<Option<PendingRecord<T>>> {
        self.get_row(key)
    }

    /// Rows waiting to be pushed, oldest change first
    pub fn pending(&self) -> Result<Vec<PendingRecord<T>>> {
        let sql = Self::select_sql(&format!(
            "WHERE sync_status IN ('pending_sync', 'pending_delete') ORDER BY modified_at ASC, {} ASC",
            T::KEY_COLUMN
        ));
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], Self::parse_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Move `Failed` rows whose retry time has come back into the push queue.
    ///
    /// Tombstones return to `PendingDelete` so the delete intent survives.
    pub fn promote_due_failures(&self, now: i64) -> Result<usize> {
        let promoted = self.conn.execute(
            &format!(
                "UPDATE {} SET sync_status = CASE WHEN tombstone = 1 THEN 'pending_delete' ELSE 'pending_sync' END
                 WHERE sync_status = 'failed' AND (next_retry_at IS NULL OR next_retry_at <= ?1)",
                T::TABLE
            ),
            params![now],
        )?;
        Ok(promoted)
    }

    /// Earliest retry time among `Failed` rows
    pub fn next_retry_at(&self) -> Result<Option<i64>> {
        let next = self.conn.query_row(
            &format!(
                "SELECT MIN(next_retry_at) FROM {} WHERE sync_status = 'failed'",
                T::TABLE
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    /// Acknowledge a pushed version.
    ///
    /// `PendingSync` becomes `Synced`; an acknowledged `PendingDelete` row is
    /// removed. Returns `false` when the row changed since it was read.
    pub fn mark_synced(&self, key: &str, modified_at: i64) -> Result<bool> {
        let updated = self.conn.execute(
            &format!(
                "UPDATE {} SET sync_status = 'synced', attempts = 0, next_retry_at = NULL
                 WHERE {} = ?1 AND modified_at = ?2 AND sync_status = 'pending_sync'",
                T::TABLE,
                T::KEY_COLUMN
            ),
            params![key, modified_at],
        )?;
        if updated > 0 {
            return Ok(true);
        }

        let deleted = self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1 AND modified_at = ?2 AND sync_status = 'pending_delete'",
                T::TABLE,
                T::KEY_COLUMN
            ),
            params![key, modified_at],
        )?;
        Ok(deleted > 0)
    }

    /// Record a transient push failure for the version that was sent
    pub fn mark_failed(
        &self,
        key: &str,
        modified_at: i64,
        attempts: u32,
        next_retry_at: i64,
    ) -> Result<bool> {
        let updated = self.conn.execute(
            &format!(
                "UPDATE {} SET sync_status = 'failed', attempts = ?3, next_retry_at = ?4
                 WHERE {} = ?1 AND modified_at = ?2 AND sync_status IN ('pending_sync', 'pending_delete')",
                T::TABLE,
                T::KEY_COLUMN
            ),
            params![key, modified_at, attempts, next_retry_at],
        )?;
        Ok(updated > 0)
    }

    /// Mark the sent version as rejected by a newer remote write
    pub fn mark_conflict(&self, key: &str, modified_at: i64) -> Result<bool> {
        let updated = self.conn.execute(
            &format!(
                "UPDATE {} SET sync_status = 'conflict'
                 WHERE {} = ?1 AND modified_at = ?2 AND sync_status IN ('pending_sync', 'pending_delete')",
                T::TABLE,
                T::KEY_COLUMN
            ),
            params![key, modified_at],
        )?;
        Ok(updated > 0)
    }

    /// Put a conflicting version whose local copy won back into the push queue.
    ///
    /// Tombstones return to `PendingDelete`. Returns `false` when the row
    /// changed since it was read.
    pub fn requeue_conflict(&self, key: &str, modified_at: i64) -> Result<bool> {
        let updated = self.conn.execute(
            &format!(
                "UPDATE {} SET sync_status = CASE WHEN tombstone = 1 THEN 'pending_delete' ELSE 'pending_sync' END
                 WHERE {} = ?1 AND modified_at = ?2 AND sync_status = 'conflict'",
                T::TABLE,
                T::KEY_COLUMN
            ),
            params![key, modified_at],
        )?;
        Ok(updated > 0)
    }

    /// Requeue every `Conflict` row; used once a full pull has nothing newer for them
    pub fn requeue_all_conflicts(&self) -> Result<usize> {
        let updated = self.conn.execute(
            &format!(
                "UPDATE {} SET sync_status = CASE WHEN tombstone = 1 THEN 'pending_delete' ELSE 'pending_sync' END
                 WHERE sync_status = 'conflict'",
                T::TABLE
            ),
            [],
        )?;
        Ok(updated)
    }

    /// Overwrite with a remote winner; the row lands `Synced`
    pub fn apply_remote(&self, payload: &T, modified_at: i64) -> Result<()> {
        payload.write(self.conn, modified_at, SyncStatus::Synced, false)?;
        Ok(())
    }

    /// Drop a row regardless of its status (a reset accepted from the remote)
    pub fn remove(&self, key: &str) -> Result<bool> {
        let deleted = self.conn.execute(
            &format!("DELETE FROM {} WHERE {} = ?1", T::TABLE, T::KEY_COLUMN),
            params![key],
        )?;
        Ok(deleted > 0)
    }

    /// Version and status used by reconciliation
    pub fn local_version(&self, key: &str) -> Result<Option<LocalVersion>> {
        Ok(self.get_row(key)?.map(|row| LocalVersion {
            modified_at: row.record.modified_at,
            status: row.record.sync_status,
        }))
    }

    pub fn count_with_status(&self, status: SyncStatus) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE sync_status = ?1", T::TABLE),
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Row counts per status
    pub fn status_summary(&self) -> Result<StatusSummary> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT sync_status, COUNT(*) FROM {} GROUP BY sync_status",
            T::TABLE
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((parse_text::<SyncStatus>(row, "sync_status")?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut summary = StatusSummary::default();
        for (status, count) in rows {
            summary.add(status, usize::try_from(count).unwrap_or_default());
        }
        Ok(summary)
    }
}

impl<T: SyncedTable> SyncedRepository<T> for SqliteSyncedRepository<'_, T> {
    fn get_all(&self) -> Result<Vec<SyncedRecord<T>>> {
        let sql = Self::select_sql(&format!("ORDER BY {} ASC", T::KEY_COLUMN));
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([], Self::parse_row)?
            .map(|row| row.map(|pending| pending.record))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn get(&self, key: &str) -> Result<Option<SyncedRecord<T>>> {
        Ok(self.get_row(key)?.map(|row| row.record))
    }

    fn upsert(&self, payload: &T, modified_at: Option<i64>) -> Result<SyncedRecord<T>> {
        let modified_at = self.next_modified_at(&payload.record_key(), modified_at)?;
        payload.write(self.conn, modified_at, SyncStatus::PendingSync, false)?;
        Ok(SyncedRecord::new(
            payload.clone(),
            modified_at,
            SyncStatus::PendingSync,
        ))
    }

    fn set_sync_status(&self, key: &str, status: SyncStatus) -> Result<()> {
        let updated = self.conn.execute(
            &format!(
                "UPDATE {} SET sync_status = ?2 WHERE {} = ?1",
                T::TABLE,
                T::KEY_COLUMN
            ),
            params![key, status.as_str()],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("{} {key}", T::KIND)));
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let deleted = self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1 AND sync_status = 'pending_delete'",
                T::TABLE,
                T::KEY_COLUMN
            ),
            params![key],
        )?;
        if deleted > 0 {
            return Ok(());
        }

        match self.get(key)? {
            Some(record) => Err(Error::InvalidInput(format!(
                "Cannot delete {} {key} with status {}",
                T::KIND,
                record.sync_status
            ))),
            None => Err(Error::NotFound(format!("{} {key}", T::KIND))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{ContentType, Like, SettingKey, UserSetting};
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn like(id: &str) -> Like {
        Like::new(id, ContentType::Track, true)
    }

    #[test]
    fn test_upsert_and_get() {
        let db = setup();
        let repo = SqliteSyncedRepository::<Like>::new(db.connection());

        let record = repo.upsert(&like("T1"), Some(100)).unwrap();
        assert_eq!(record.sync_status, SyncStatus::PendingSync);
        assert_eq!(record.modified_at, 100);

        let fetched = repo.get("T1").unwrap().unwrap();
        assert_eq!(fetched, record);
        assert!(repo.get("T2").unwrap().is_none());
    }

    #[test]
    fn test_modified_at_is_strictly_increasing() {
        let db = setup();
        let repo = SqliteSyncedRepository::<Like>::new(db.connection());

        repo.upsert(&like("T1"), Some(100)).unwrap();
        let stale = repo.upsert(&like("T1"), Some(50)).unwrap();
        assert_eq!(stale.modified_at, 101);
        let same = repo.upsert(&like("T1"), Some(101)).unwrap();
        assert_eq!(same.modified_at, 102);
        let newer = repo.upsert(&like("T1"), Some(500)).unwrap();
        assert_eq!(newer.modified_at, 500);
    }

    #[test]
    fn test_mark_synced_is_compare_and_set() {
        let db = setup();
        let repo = SqliteSyncedRepository::<Like>::new(db.connection());

        repo.upsert(&like("T1"), Some(100)).unwrap();
        // A newer write lands while version 100 is in flight.
        repo.upsert(&Like::new("T1", ContentType::Track, false), Some(200))
            .unwrap();

        assert!(!repo.mark_synced("T1", 100).unwrap());
        let row = repo.get("T1").unwrap().unwrap();
        assert_eq!(row.sync_status, SyncStatus::PendingSync);
        assert!(!row.payload.is_liked);

        assert!(repo.mark_synced("T1", 200).unwrap());
        assert_eq!(
            repo.get("T1").unwrap().unwrap().sync_status,
            SyncStatus::Synced
        );
    }

    #[test]
    fn test_acknowledged_tombstone_is_removed() {
        let db = setup();
        let repo = SqliteSyncedRepository::<UserSetting>::new(db.connection());

        let setting = UserSetting::ExternalSearchEnabled(true);
        repo.upsert(&setting, Some(10)).unwrap();
        let tombstone = repo
            .upsert_tombstone(&SettingKey::ExternalSearchEnabled.default_setting(), None)
            .unwrap();
        assert_eq!(tombstone.sync_status, SyncStatus::PendingDelete);

        assert!(repo
            .mark_synced("enable_external_search", tombstone.modified_at)
            .unwrap());
        assert!(repo.get("enable_external_search").unwrap().is_none());
    }

    #[test]
    fn test_delete_requires_pending_delete() {
        let db = setup();
        let repo = SqliteSyncedRepository::<Like>::new(db.connection());

        repo.upsert(&like("T1"), Some(1)).unwrap();
        assert!(matches!(repo.delete("T1"), Err(Error::InvalidInput(_))));
        assert!(matches!(repo.delete("T9"), Err(Error::NotFound(_))));

        repo.set_sync_status("T1", SyncStatus::PendingDelete)
            .unwrap();
        repo.delete("T1").unwrap();
        assert!(repo.get("T1").unwrap().is_none());
    }

    #[test]
    fn test_failed_rows_promote_only_when_due() {
        let db = setup();
        let repo = SqliteSyncedRepository::<UserSetting>::new(db.connection());

        repo.upsert(&UserSetting::DirectDownloadsEnabled(true), Some(1))
            .unwrap();
        let tombstone = repo
            .upsert_tombstone(&UserSetting::ExternalSearchEnabled(false), Some(1))
            .unwrap();
        assert!(repo
            .mark_failed("enable_direct_downloads", 1, 1, 5_000)
            .unwrap());
        assert!(repo
            .mark_failed("enable_external_search", tombstone.modified_at, 2, 9_000)
            .unwrap());
        assert_eq!(repo.next_retry_at().unwrap(), Some(5_000));
        assert!(repo.pending().unwrap().is_empty());

        assert_eq!(repo.promote_due_failures(4_999).unwrap(), 0);
        assert_eq!(repo.promote_due_failures(5_000).unwrap(), 1);
        assert_eq!(repo.promote_due_failures(10_000).unwrap(), 1);

        let pending = repo.pending().unwrap();
        assert_eq!(pending.len(), 2);
        let tombstone = pending
            .iter()
            .find(|row| row.tombstone)
            .unwrap();
        assert_eq!(tombstone.record.sync_status, SyncStatus::PendingDelete);
        assert_eq!(tombstone.attempts, 2);
    }

    #[test]
    fn test_pending_is_ordered_oldest_first() {
        let db = setup();
        let repo = SqliteSyncedRepository::<Like>::new(db.connection());

        repo.upsert(&like("T3"), Some(30)).unwrap();
        repo.upsert(&like("T1"), Some(10)).unwrap();
        repo.upsert(&like("T2"), Some(10)).unwrap();

        let keys: Vec<String> = repo
            .pending()
            .unwrap()
            .into_iter()
            .map(|row| row.record.key())
            .collect();
        assert_eq!(keys, vec!["T1", "T2", "T3"]);
    }

    #[test]
    fn test_status_summary_counts_rows() {
        let db = setup();
        let repo = SqliteSyncedRepository::<Like>::new(db.connection());

        repo.upsert(&like("T1"), Some(1)).unwrap();
        repo.upsert(&like("T2"), Some(1)).unwrap();
        repo.apply_remote(&like("T3"), 5).unwrap();
        repo.mark_conflict("T2", 1).unwrap();

        let summary = repo.status_summary().unwrap();
        assert_eq!(summary.pending_sync, 1);
        assert_eq!(summary.conflict, 1);
        assert_eq!(summary.synced, 1);
        assert_eq!(summary.total(), 3);
        assert_eq!(repo.count_with_status(SyncStatus::Synced).unwrap(), 1);
    }
}
