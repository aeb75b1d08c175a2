//! Viewed content and search history repositories

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use rusqlite::{params, Connection, Row};

use super::synced_table::parse_text;
use crate::error::Result;
use crate::models::{ContentType, SearchHistoryEntry, ViewedContent};

/// Append-only viewed content log
pub struct SqliteViewedContentRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteViewedContentRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &Row<'_>) -> rusqlite::Result<ViewedContent> {
        Ok(ViewedContent {
            id: row.get("id")?,
            content_type: parse_text(row, "content_type")?,
            content_id: row.get("content_id")?,
            created: row.get("created")?,
            synced: row.get("synced")?,
        })
    }

    fn query(&self, sql: &str, limit: usize) -> Result<Vec<ViewedContent>> {
        let mut stmt = self.conn.prepare(sql)?;
        let entries = stmt
            .query_map(params![limit as i64], Self::parse_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Append a new entry (unsynced)
    pub fn record(
        &self,
        content_type: ContentType,
        content_id: &str,
        created: i64,
    ) -> Result<ViewedContent> {
        self.conn.execute(
            "INSERT INTO viewed_content (content_type, content_id, created, synced) VALUES (?1, ?2, ?3, 0)",
            params![content_type.as_str(), content_id, created],
        )?;

        Ok(ViewedContent {
            id: self.conn.last_insert_rowid(),
            content_type,
            content_id: content_id.to_string(),
            created,
            synced: false,
        })
    }

    /// Every entry, oldest first
    pub fn get_all(&self) -> Result<Vec<ViewedContent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, content_type, content_id, created, synced FROM viewed_content ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map([], Self::parse_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Entries, newest first
    pub fn list(&self, limit: usize) -> Result<Vec<ViewedContent>> {
        self.query(
            "SELECT id, content_type, content_id, created, synced FROM viewed_content
             ORDER BY id DESC LIMIT ?1",
            limit,
        )
    }

    /// Entries not yet accepted by the remote, oldest first
    pub fn unsynced(&self, limit: usize) -> Result<Vec<ViewedContent>> {
        self.query(
            "SELECT id, content_type, content_id, created, synced FROM viewed_content
             WHERE synced = 0 ORDER BY id ASC LIMIT ?1",
            limit,
        )
    }

    /// Flip `synced` to true. The flag never goes back.
    pub fn mark_synced(&self, id: i64) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE viewed_content SET synced = 1 WHERE id = ?1 AND synced = 0",
            params![id],
        )?;
        Ok(updated > 0)
    }

    pub fn count_unsynced(&self) -> Result<usize> {
        self.count_where(false)
    }

    pub fn count_synced(&self) -> Result<usize> {
        self.count_where(true)
    }

    fn count_where(&self, synced: bool) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM viewed_content WHERE synced = ?1",
            params![synced],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

/// Local-only search history
pub struct SqliteSearchHistoryRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSearchHistoryRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &Row<'_>) -> rusqlite::Result<SearchHistoryEntry> {
        Ok(SearchHistoryEntry {
            id: row.get("id")?,
            query: row.get("query")?,
            content_type: parse_text(row, "content_type")?,
            content_id: row.get("content_id")?,
            created: row.get("created")?,
        })
    }

    /// Add an entry, replacing an older one for the same query and result,
    /// then prune everything beyond `limit`.
    ///
    /// Callers run this inside a transaction.
    pub fn add(
        &self,
        query: &str,
        content_type: ContentType,
        content_id: &str,
        created: i64,
        limit: usize,
    ) -> Result<SearchHistoryEntry> {
        self.conn.execute(
            "DELETE FROM search_history WHERE query = ?1 AND content_id = ?2",
            params![query, content_id],
        )?;
        self.conn.execute(
            "INSERT INTO search_history (query, content_type, content_id, created) VALUES (?1, ?2, ?3, ?4)",
            params![query, content_type.as_str(), content_id, created],
        )?;
        let id = self.conn.last_insert_rowid();

        let pruned = self.conn.execute(
            "DELETE FROM search_history WHERE id NOT IN
                (SELECT id FROM search_history ORDER BY id DESC LIMIT ?1)",
            params![limit as i64],
        )?;
        if pruned > 0 {
            tracing::debug!("Pruned {pruned} search history entries");
        }

        Ok(SearchHistoryEntry {
            id,
            query: query.to_string(),
            content_type,
            content_id: content_id.to_string(),
            created,
        })
    }

    /// Entries, newest first
    pub fn list(&self, limit: usize) -> Result<Vec<SearchHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, query, content_type, content_id, created FROM search_history
             ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit as i64], Self::parse_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn clear(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM search_history", [])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_viewed_ids_are_monotonic_and_sync_is_one_way() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteViewedContentRepository::new(db.connection());

        let first = repo.record(ContentType::Track, "T1", 10).unwrap();
        let second = repo.record(ContentType::Album, "A1", 20).unwrap();
        assert!(second.id > first.id);

        let unsynced = repo.unsynced(10).unwrap();
        assert_eq!(unsynced, vec![first.clone(), second.clone()]);

        assert!(repo.mark_synced(first.id).unwrap());
        assert!(!repo.mark_synced(first.id).unwrap());
        assert_eq!(repo.count_unsynced().unwrap(), 1);

        let listed = repo.list(10).unwrap();
        assert_eq!(listed[0].id, second.id);
        assert!(listed[1].synced);
    }

    #[test]
    fn test_search_history_prunes_to_limit() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteSearchHistoryRepository::new(db.connection());

        for index in 0..5 {
            repo.add(
                &format!("query {index}"),
                ContentType::Artist,
                &format!("R{index}"),
                index,
                3,
            )
            .unwrap();
        }

        let queries: Vec<String> = repo
            .list(10)
            .unwrap()
            .into_iter()
            .map(|entry| entry.query)
            .collect();
        assert_eq!(queries, vec!["query 4", "query 3", "query 2"]);
    }

    #[test]
    fn test_search_history_replaces_duplicates() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteSearchHistoryRepository::new(db.connection());

        repo.add("beatles", ContentType::Artist, "R1", 1, 10)
            .unwrap();
        repo.add("abbey", ContentType::Album, "A1", 2, 10).unwrap();
        repo.add("beatles", ContentType::Artist, "R1", 3, 10)
            .unwrap();

        let entries = repo.list(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].query, "beatles");
        assert_eq!(entries[0].created, 3);

        assert_eq!(repo.clear().unwrap(), 2);
        assert!(repo.list(10).unwrap().is_empty());
    }
}
