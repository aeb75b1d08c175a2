//! Pull checkpoints and the conflict log

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::synced_table::parse_text;
use crate::error::Result;
use crate::models::{ConflictWinner, EntityKind, SyncConflict};
use crate::reconcile::LWW_STRATEGY;

/// Conflict resolution about to be logged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRecord<'k> {
    pub entity_kind: EntityKind,
    pub record_key: &'k str,
    pub local_modified_at: i64,
    pub incoming_modified_at: i64,
    pub winner: ConflictWinner,
    pub resolved_at: i64,
}

pub struct SqliteSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Last pulled server sequence for a kind (0 when never pulled)
    pub fn checkpoint(&self, kind: EntityKind) -> Result<i64> {
        let checkpoint = self
            .conn
            .query_row(
                "SELECT checkpoint FROM sync_checkpoints WHERE entity_kind = ?1",
                params![kind.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(checkpoint.unwrap_or(0))
    }

    pub fn set_checkpoint(&self, kind: EntityKind, checkpoint: i64, now: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_checkpoints (entity_kind, checkpoint, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(entity_kind) DO UPDATE SET
                checkpoint = excluded.checkpoint,
                updated_at = excluded.updated_at",
            params![kind.as_str(), checkpoint, now],
        )?;
        Ok(())
    }

    pub fn record_conflict(&self, conflict: &ConflictRecord<'_>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_conflicts
                (entity_kind, record_key, local_modified_at, incoming_modified_at, winner, resolved_at, strategy)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                conflict.entity_kind.as_str(),
                conflict.record_key,
                conflict.local_modified_at,
                conflict.incoming_modified_at,
                conflict.winner.as_str(),
                conflict.resolved_at,
                LWW_STRATEGY,
            ],
        )?;
        Ok(())
    }

    fn parse_conflict(row: &Row<'_>) -> rusqlite::Result<SyncConflict> {
        Ok(SyncConflict {
            id: row.get("id")?,
            entity_kind: parse_text(row, "entity_kind")?,
            record_key: row.get("record_key")?,
            local_modified_at: row.get("local_modified_at")?,
            incoming_modified_at: row.get("incoming_modified_at")?,
            winner: parse_text(row, "winner")?,
            resolved_at: row.get("resolved_at")?,
            strategy: row.get("strategy")?,
        })
    }

    /// Logged conflicts, most recent first
    pub fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, entity_kind, record_key, local_modified_at, incoming_modified_at, winner, resolved_at, strategy
             FROM sync_conflicts ORDER BY resolved_at DESC, id DESC LIMIT ?1",
        )?;
        let conflicts = stmt
            .query_map(params![limit as i64], Self::parse_conflict)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(conflicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_checkpoint_defaults_to_zero_and_updates() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteSyncStateRepository::new(db.connection());

        assert_eq!(repo.checkpoint(EntityKind::Settings).unwrap(), 0);
        repo.set_checkpoint(EntityKind::Settings, 42, 1).unwrap();
        repo.set_checkpoint(EntityKind::Settings, 43, 2).unwrap();
        assert_eq!(repo.checkpoint(EntityKind::Settings).unwrap(), 43);
        assert_eq!(repo.checkpoint(EntityKind::LikedContent).unwrap(), 0);
    }

    #[test]
    fn test_conflicts_are_listed_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteSyncStateRepository::new(db.connection());

        for (key, resolved_at) in [("T1", 10), ("T2", 20)] {
            repo.record_conflict(&ConflictRecord {
                entity_kind: EntityKind::LikedContent,
                record_key: key,
                local_modified_at: 100,
                incoming_modified_at: 150,
                winner: ConflictWinner::Remote,
                resolved_at,
            })
            .unwrap();
        }

        let conflicts = repo.list_conflicts(10).unwrap();
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[0].record_key, "T2");
        assert_eq!(conflicts[0].winner, ConflictWinner::Remote);
        assert_eq!(conflicts[0].strategy, "lww");
        assert_eq!(conflicts[1].entity_kind, EntityKind::LikedContent);
    }
}
