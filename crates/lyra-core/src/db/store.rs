//! Shared store handle.
//!
//! `Store` is the single owner of persisted rows. It serialises access through
//! one connection mutex, commits every multi-row change in a transaction and
//! publishes a fresh snapshot to the matching watch channel after each commit.
//! Snapshots are published while the lock is held, so subscribers observe them
//! in commit order.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, Transaction};
use tokio::sync::watch;

use super::history_repository::{SqliteSearchHistoryRepository, SqliteViewedContentRepository};
use super::sync_state_repository::{ConflictRecord, SqliteSyncStateRepository};
use super::synced_repository::{SqliteSyncedRepository, SyncedRepository};
use super::synced_table::SyncedTable;
use super::Database;
use crate::config::DEFAULT_SEARCH_HISTORY_LIMIT;
use crate::error::{Error, Result};
use crate::models::{
    ContentType, EntityKind, Like, LikedContent, PendingRecord, SearchHistoryEntry, SettingKey,
    StatusSummary, SyncConflict, SyncStatus, SyncedRecord, SyncedUserSetting, UserSetting,
    ViewedContent,
};
use crate::reconcile::{self, Resolution};
use crate::remote::RemoteChange;
use crate::util::{normalize_text_option, now_millis};

/// Counts from applying one pulled batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Remote values written locally
    pub applied: usize,
    /// Remote changes older than (or tied with) pending local intent
    pub kept_local: usize,
    /// Decisions written to the conflict log
    pub conflicts_logged: usize,
    /// Conflicting rows whose newer local copy goes back into the push queue
    pub requeued: usize,
}

pub(crate) struct Channels {
    liked: watch::Sender<Vec<LikedContent>>,
    settings: watch::Sender<Vec<SyncedUserSetting>>,
    viewed: watch::Sender<Vec<ViewedContent>>,
    search: watch::Sender<Vec<SearchHistoryEntry>>,
}

/// Synced kinds with a snapshot channel
pub(crate) trait Snapshot: SyncedTable {
    fn channel(channels: &Channels) -> &watch::Sender<Vec<SyncedRecord<Self>>>;
}

impl Snapshot for Like {
    fn channel(channels: &Channels) -> &watch::Sender<Vec<LikedContent>> {
        &channels.liked
    }
}

impl Snapshot for UserSetting {
    fn channel(channels: &Channels) -> &watch::Sender<Vec<SyncedUserSetting>> {
        &channels.settings
    }
}

struct StoreInner {
    db: Mutex<Database>,
    channels: Channels,
    search_history_limit: usize,
}

/// Cloneable handle to the local entity store
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Store")
            .field("search_history_limit", &self.inner.search_history_limit)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Wrap an opened database and load the initial snapshots
    pub fn new(db: Database, search_history_limit: usize) -> Result<Self> {
        if search_history_limit == 0 {
            return Err(Error::InvalidInput(
                "search history limit must be at least 1".to_string(),
            ));
        }

        let conn = db.connection();
        let channels = Channels {
            liked: watch::channel(SqliteSyncedRepository::<Like>::new(conn).get_all()?).0,
            settings: watch::channel(SqliteSyncedRepository::<UserSetting>::new(conn).get_all()?)
                .0,
            viewed: watch::channel(SqliteViewedContentRepository::new(conn).get_all()?).0,
            search: watch::channel(
                SqliteSearchHistoryRepository::new(conn).list(search_history_limit)?,
            )
            .0,
        };

        Ok(Self {
            inner: Arc::new(StoreInner {
                db: Mutex::new(db),
                channels,
                search_history_limit,
            }),
        })
    }

    /// Open (or create) the store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Database::open(path)?, DEFAULT_SEARCH_HISTORY_LIMIT)
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::new(Database::open_in_memory()?, DEFAULT_SEARCH_HISTORY_LIMIT)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.inner
            .db
            .lock()
            .map_err(|_| Error::Database("store connection lock poisoned".to_string()))
    }

    fn read<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let db = self.lock()?;
        f(db.connection())
    }

    /// Run `f` in a transaction, then publish with the lock still held
    fn transact<R>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<R>,
        publish: impl FnOnce(&Connection, &Channels) -> Result<()>,
    ) -> Result<R> {
        let mut db = self.lock()?;
        let tx = db.connection_mut().transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        publish(db.connection(), &self.inner.channels)?;
        Ok(result)
    }

    fn write_synced<T: Snapshot, R>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<R>,
    ) -> Result<R> {
        self.transact(f, |conn, channels| {
            let snapshot = SqliteSyncedRepository::<T>::new(conn).get_all()?;
            T::channel(channels).send_replace(snapshot);
            Ok(())
        })
    }

    fn write_viewed<R>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<R>) -> Result<R> {
        self.transact(f, |conn, channels| {
            let snapshot = SqliteViewedContentRepository::new(conn).get_all()?;
            channels.viewed.send_replace(snapshot);
            Ok(())
        })
    }

    fn write_search<R>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<R>) -> Result<R> {
        let limit = self.inner.search_history_limit;
        self.transact(f, |conn, channels| {
            let snapshot = SqliteSearchHistoryRepository::new(conn).list(limit)?;
            channels.search.send_replace(snapshot);
            Ok(())
        })
    }

    // ---------------------------------------------------------------------
    // Liked content
    // ---------------------------------------------------------------------

    pub fn liked_content(&self) -> Result<Vec<LikedContent>> {
        self.read(|conn| SqliteSyncedRepository::<Like>::new(conn).get_all())
    }

    pub fn liked(&self, content_id: &str) -> Result<Option<LikedContent>> {
        self.read(|conn| SqliteSyncedRepository::<Like>::new(conn).get(content_id))
    }

    /// Like or unlike content; the row is kept either way
    pub fn set_liked(
        &self,
        content_id: &str,
        content_type: ContentType,
        is_liked: bool,
    ) -> Result<LikedContent> {
        self.upsert_like(&Like::new(content_id, content_type, is_liked))
    }

    pub fn upsert_like(&self, like: &Like) -> Result<LikedContent> {
        let like = validate_like(like)?;
        self.write_synced::<Like, _>(|tx| SqliteSyncedRepository::new(tx).upsert(&like, None))
    }

    /// Write several likes in one transaction
    pub fn upsert_likes(&self, likes: &[Like]) -> Result<Vec<LikedContent>> {
        let likes = likes
            .iter()
            .map(validate_like)
            .collect::<Result<Vec<_>>>()?;
        self.write_synced::<Like, _>(|tx| {
            let repo = SqliteSyncedRepository::<Like>::new(tx);
            likes.iter().map(|like| repo.upsert(like, None)).collect()
        })
    }

    pub fn set_like_status(&self, content_id: &str, status: SyncStatus) -> Result<()> {
        self.write_synced::<Like, _>(|tx| {
            SqliteSyncedRepository::<Like>::new(tx).set_sync_status(content_id, status)
        })
    }

    /// Current liked content snapshot, updated after every commit
    pub fn subscribe_liked(&self) -> watch::Receiver<Vec<LikedContent>> {
        self.inner.channels.liked.subscribe()
    }

    // ---------------------------------------------------------------------
    // Settings
    // ---------------------------------------------------------------------

    pub fn settings(&self) -> Result<Vec<SyncedUserSetting>> {
        self.read(|conn| SqliteSyncedRepository::<UserSetting>::new(conn).get_all())
    }

    pub fn setting(&self, key: SettingKey) -> Result<Option<SyncedUserSetting>> {
        self.read(|conn| SqliteSyncedRepository::<UserSetting>::new(conn).get(key.as_str()))
    }

    /// Stored value, or the default when the key was never set or was reset
    pub fn effective_setting(&self, key: SettingKey) -> Result<UserSetting> {
        Ok(self
            .setting(key)?
            .map_or_else(|| key.default_setting(), |record| record.payload))
    }

    pub fn set_setting(&self, setting: UserSetting) -> Result<SyncedUserSetting> {
        self.write_synced::<UserSetting, _>(|tx| {
            SqliteSyncedRepository::new(tx).upsert(&setting, None)
        })
    }

    /// Reset a key to its default with a `PendingDelete` tombstone
    pub fn reset_setting(&self, key: SettingKey) -> Result<SyncedUserSetting> {
        self.write_synced::<UserSetting, _>(|tx| {
            SqliteSyncedRepository::new(tx).upsert_tombstone(&key.default_setting(), None)
        })
    }

    /// Remove a setting row whose reset was acknowledged
    pub fn delete_setting(&self, key: SettingKey) -> Result<()> {
        self.write_synced::<UserSetting, _>(|tx| {
            SqliteSyncedRepository::<UserSetting>::new(tx).delete(key.as_str())
        })
    }

    pub fn set_setting_status(&self, key: SettingKey, status: SyncStatus) -> Result<()> {
        self.write_synced::<UserSetting, _>(|tx| {
            SqliteSyncedRepository::<UserSetting>::new(tx).set_sync_status(key.as_str(), status)
        })
    }

    pub fn subscribe_settings(&self) -> watch::Receiver<Vec<SyncedUserSetting>> {
        self.inner.channels.settings.subscribe()
    }

    // ---------------------------------------------------------------------
    // Viewed content
    // ---------------------------------------------------------------------

    pub fn record_view(&self, content_type: ContentType, content_id: &str) -> Result<ViewedContent> {
        let content_id = required_text(content_id, "content id")?;
        self.write_viewed(|tx| {
            SqliteViewedContentRepository::new(tx).record(content_type, &content_id, now_millis())
        })
    }

    /// Most recent views first
    pub fn viewed_content(&self, limit: usize) -> Result<Vec<ViewedContent>> {
        self.read(|conn| SqliteViewedContentRepository::new(conn).list(limit))
    }

    /// Views the remote has not accepted yet, oldest first
    pub fn unsynced_views(&self, limit: usize) -> Result<Vec<ViewedContent>> {
        self.read(|conn| SqliteViewedContentRepository::new(conn).unsynced(limit))
    }

    pub fn mark_view_synced(&self, id: i64) -> Result<bool> {
        self.write_viewed(|tx| SqliteViewedContentRepository::new(tx).mark_synced(id))
    }

    pub fn subscribe_viewed(&self) -> watch::Receiver<Vec<ViewedContent>> {
        self.inner.channels.viewed.subscribe()
    }

    // ---------------------------------------------------------------------
    // Search history
    // ---------------------------------------------------------------------

    pub fn add_search(
        &self,
        query: &str,
        content_type: ContentType,
        content_id: &str,
    ) -> Result<SearchHistoryEntry> {
        let query = required_text(query, "search query")?;
        let content_id = required_text(content_id, "content id")?;
        let limit = self.inner.search_history_limit;
        self.write_search(|tx| {
            SqliteSearchHistoryRepository::new(tx).add(
                &query,
                content_type,
                &content_id,
                now_millis(),
                limit,
            )
        })
    }

    /// Most recent searches first
    pub fn search_history(&self, limit: usize) -> Result<Vec<SearchHistoryEntry>> {
        self.read(|conn| SqliteSearchHistoryRepository::new(conn).list(limit))
    }

    pub fn clear_search_history(&self) -> Result<usize> {
        self.write_search(|tx| SqliteSearchHistoryRepository::new(tx).clear())
    }

    pub fn subscribe_search_history(&self) -> watch::Receiver<Vec<SearchHistoryEntry>> {
        self.inner.channels.search.subscribe()
    }

    // ---------------------------------------------------------------------
    // Sync state
    // ---------------------------------------------------------------------

    pub fn checkpoint(&self, kind: EntityKind) -> Result<i64> {
        self.read(|conn| SqliteSyncStateRepository::new(conn).checkpoint(kind))
    }

    pub(crate) fn reset_checkpoint(&self, kind: EntityKind) -> Result<()> {
        self.read(|conn| SqliteSyncStateRepository::new(conn).set_checkpoint(kind, 0, now_millis()))
    }

    /// Logged conflict resolutions, most recent first
    pub fn conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        self.read(|conn| SqliteSyncStateRepository::new(conn).list_conflicts(limit))
    }

    /// Row counts per status. Viewed entries count as synced or pending sync.
    pub fn status_summary(&self, kind: EntityKind) -> Result<StatusSummary> {
        self.read(|conn| match kind {
            EntityKind::LikedContent => SqliteSyncedRepository::<Like>::new(conn).status_summary(),
            EntityKind::Settings => {
                SqliteSyncedRepository::<UserSetting>::new(conn).status_summary()
            }
            EntityKind::ViewedContent => {
                let repo = SqliteViewedContentRepository::new(conn);
                let mut summary = StatusSummary::default();
                summary.add(SyncStatus::Synced, repo.count_synced()?);
                summary.add(SyncStatus::PendingSync, repo.count_unsynced()?);
                Ok(summary)
            }
        })
    }

    // ---------------------------------------------------------------------
    // Synchronizer transitions
    // ---------------------------------------------------------------------

    /// Local write with an explicit `modified_at`
    #[cfg(test)]
    pub(crate) fn upsert_at<T: Snapshot>(
        &self,
        payload: &T,
        modified_at: i64,
    ) -> Result<SyncedRecord<T>> {
        self.write_synced::<T, _>(|tx| {
            SqliteSyncedRepository::new(tx).upsert(payload, Some(modified_at))
        })
    }

    pub(crate) fn pending<T: Snapshot>(&self) -> Result<Vec<PendingRecord<T>>> {
        self.read(|conn| SqliteSyncedRepository::<T>::new(conn).pending())
    }

    pub(crate) fn promote_due_failures<T: Snapshot>(&self, now: i64) -> Result<usize> {
        self.write_synced::<T, _>(|tx| SqliteSyncedRepository::<T>::new(tx).promote_due_failures(now))
    }

    pub(crate) fn next_retry_at<T: Snapshot>(&self) -> Result<Option<i64>> {
        self.read(|conn| SqliteSyncedRepository::<T>::new(conn).next_retry_at())
    }

    pub(crate) fn count_with_status<T: Snapshot>(&self, status: SyncStatus) -> Result<usize> {
        self.read(|conn| SqliteSyncedRepository::<T>::new(conn).count_with_status(status))
    }

    pub(crate) fn mark_synced<T: Snapshot>(&self, key: &str, modified_at: i64) -> Result<bool> {
        self.write_synced::<T, _>(|tx| {
            SqliteSyncedRepository::<T>::new(tx).mark_synced(key, modified_at)
        })
    }

    pub(crate) fn mark_failed<T: Snapshot>(
        &self,
        key: &str,
        modified_at: i64,
        attempts: u32,
        next_retry_at: i64,
    ) -> Result<bool> {
        self.write_synced::<T, _>(|tx| {
            SqliteSyncedRepository::<T>::new(tx).mark_failed(key, modified_at, attempts, next_retry_at)
        })
    }

    pub(crate) fn requeue_conflicts<T: Snapshot>(&self) -> Result<usize> {
        self.write_synced::<T, _>(|tx| {
            SqliteSyncedRepository::<T>::new(tx).requeue_all_conflicts()
        })
    }

    pub(crate) fn mark_conflict<T: Snapshot>(&self, key: &str, modified_at: i64) -> Result<bool> {
        self.write_synced::<T, _>(|tx| {
            SqliteSyncedRepository::<T>::new(tx).mark_conflict(key, modified_at)
        })
    }

    /// Reconcile a pulled batch and store its checkpoint in one transaction
    pub fn apply_remote_changes(
        &self,
        kind: EntityKind,
        changes: &[RemoteChange],
        checkpoint: i64,
    ) -> Result<ApplyOutcome> {
        match kind {
            EntityKind::LikedContent => self.write_synced::<Like, _>(|tx| {
                let likes = changes.iter().filter_map(|change| {
                    change
                        .as_like()
                        .map(|(like, modified_at)| (like, modified_at, false))
                });
                apply_batch(tx, likes, checkpoint)
            }),
            EntityKind::Settings => self.write_synced::<UserSetting, _>(|tx| {
                let settings = changes.iter().filter_map(|change| {
                    change
                        .as_setting()
                        .map(|(setting, modified_at)| (setting, modified_at, change.is_reset()))
                });
                apply_batch(tx, settings, checkpoint)
            }),
            EntityKind::ViewedContent => Err(Error::InvalidInput(
                "viewed content is never pulled".to_string(),
            )),
        }
    }
}

/// Changes arrive as `(payload, modified_at, reset)`; a winning reset removes the row.
fn apply_batch<T: SyncedTable>(
    conn: &Connection,
    changes: impl Iterator<Item = (T, i64, bool)>,
    checkpoint: i64,
) -> Result<ApplyOutcome> {
    let repo = SqliteSyncedRepository::<T>::new(conn);
    let state = SqliteSyncStateRepository::new(conn);
    let now = now_millis();
    let mut outcome = ApplyOutcome::default();

    for (payload, remote_modified_at, reset) in changes {
        let key = payload.record_key();
        let local = repo.local_version(&key)?;
        let resolution = reconcile::resolve(local, remote_modified_at);

        if reconcile::is_conflict(local) {
            if let Some(local) = local {
                state.record_conflict(&ConflictRecord {
                    entity_kind: T::KIND,
                    record_key: &key,
                    local_modified_at: local.modified_at,
                    incoming_modified_at: remote_modified_at,
                    winner: resolution.winner(),
                    resolved_at: now,
                })?;
                outcome.conflicts_logged += 1;
                tracing::debug!(
                    "Resolved {} {key}: local {} vs remote {remote_modified_at}, {} wins",
                    T::KIND,
                    local.modified_at,
                    resolution.winner().as_str()
                );
            }
        }

        match resolution {
            Resolution::TakeRemote if reset => {
                repo.remove(&key)?;
                outcome.applied += 1;
            }
            Resolution::TakeRemote => {
                repo.apply_remote(&payload, remote_modified_at)?;
                outcome.applied += 1;
            }
            Resolution::KeepLocal => {
                outcome.kept_local += 1;
                // Nothing newer exists remotely, so the local copy is resent.
                if let Some(local) = local.filter(|local| local.status == SyncStatus::Conflict) {
                    if repo.requeue_conflict(&key, local.modified_at)? {
                        outcome.requeued += 1;
                    }
                }
            }
        }
    }

    state.set_checkpoint(T::KIND, checkpoint, now)?;
    Ok(outcome)
}

fn required_text(value: &str, what: &str) -> Result<String> {
    normalize_text_option(Some(value.to_string()))
        .ok_or_else(|| Error::InvalidInput(format!("{what} must not be empty")))
}

fn validate_like(like: &Like) -> Result<Like> {
    Ok(Like {
        content_id: required_text(&like.content_id, "content id")?,
        ..like.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConflictWinner;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn test_like_round_trip_and_flip() {
        let store = store();
        let liked = store.set_liked("T1", ContentType::Track, true).unwrap();
        assert_eq!(liked.sync_status, SyncStatus::PendingSync);

        let unliked = store.set_liked("T1", ContentType::Track, false).unwrap();
        assert!(unliked.modified_at > liked.modified_at);
        assert_eq!(store.liked_content().unwrap(), vec![unliked]);
        assert!(matches!(
            store.set_liked("  ", ContentType::Track, true),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_upsert_likes_is_atomic() {
        let store = store();
        let likes = vec![
            Like::new("A1", ContentType::Album, true),
            Like::new("", ContentType::Album, true),
        ];
        assert!(store.upsert_likes(&likes).is_err());
        assert!(store.liked_content().unwrap().is_empty());

        let written = store
            .upsert_likes(&[
                Like::new("A1", ContentType::Album, true),
                Like::new("R1", ContentType::Artist, true),
            ])
            .unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(
            store.status_summary(EntityKind::LikedContent).unwrap().pending_sync,
            2
        );
    }

    #[test]
    fn test_setting_reset_falls_back_to_default() {
        let store = store();
        let key = SettingKey::ExternalSearchEnabled;
        assert_eq!(
            store.effective_setting(key).unwrap(),
            UserSetting::ExternalSearchEnabled(false)
        );

        store
            .set_setting(UserSetting::ExternalSearchEnabled(true))
            .unwrap();
        assert_eq!(
            store.effective_setting(key).unwrap(),
            UserSetting::ExternalSearchEnabled(true)
        );

        let tombstone = store.reset_setting(key).unwrap();
        assert_eq!(tombstone.sync_status, SyncStatus::PendingDelete);
        assert_eq!(
            store.effective_setting(key).unwrap(),
            UserSetting::ExternalSearchEnabled(false)
        );

        assert!(store
            .mark_synced::<UserSetting>(key.as_str(), tombstone.modified_at)
            .unwrap());
        assert!(store.setting(key).unwrap().is_none());
    }

    #[test]
    fn test_delete_setting_requires_acknowledged_reset() {
        let store = store();
        let key = SettingKey::DirectDownloadsEnabled;
        store
            .set_setting(UserSetting::DirectDownloadsEnabled(true))
            .unwrap();
        assert!(matches!(
            store.delete_setting(key),
            Err(Error::InvalidInput(_))
        ));

        store.set_setting_status(key, SyncStatus::PendingDelete).unwrap();
        store.delete_setting(key).unwrap();
        assert!(store.setting(key).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_get_replay_and_updates() {
        let store = store();
        store.set_liked("T1", ContentType::Track, true).unwrap();

        let mut receiver = store.subscribe_liked();
        assert_eq!(receiver.borrow_and_update().len(), 1);

        store.set_liked("T2", ContentType::Track, true).unwrap();
        receiver.changed().await.unwrap();
        let keys: Vec<String> = receiver
            .borrow_and_update()
            .iter()
            .map(LikedContent::key)
            .collect();
        assert_eq!(keys, vec!["T1", "T2"]);

        let late = store.subscribe_liked();
        assert_eq!(late.borrow().len(), 2);
    }

    #[test]
    fn test_local_newer_than_remote_is_kept() {
        let store = store();
        let local = store
            .upsert_like(&Like::new("T1", ContentType::Track, true))
            .unwrap();

        let outcome = store
            .apply_remote_changes(
                EntityKind::LikedContent,
                &[RemoteChange::Like {
                    like: Like::new("T1", ContentType::Track, false),
                    modified_at: local.modified_at - 10,
                }],
                5,
            )
            .unwrap();

        assert_eq!(outcome.kept_local, 1);
        assert_eq!(outcome.conflicts_logged, 1);
        let row = store.liked("T1").unwrap().unwrap();
        assert!(row.payload.is_liked);
        assert_eq!(row.sync_status, SyncStatus::PendingSync);
        assert_eq!(store.checkpoint(EntityKind::LikedContent).unwrap(), 5);
        assert_eq!(store.conflicts(10).unwrap()[0].winner, ConflictWinner::Local);
    }

    #[test]
    fn test_remote_newer_overwrites_conflict() {
        let store = store();
        let local = store
            .upsert_like(&Like::new("T1", ContentType::Track, true))
            .unwrap();
        store
            .mark_conflict::<Like>("T1", local.modified_at)
            .unwrap();

        let remote_modified_at = local.modified_at + 50;
        let outcome = store
            .apply_remote_changes(
                EntityKind::LikedContent,
                &[RemoteChange::Like {
                    like: Like::new("T1", ContentType::Track, false),
                    modified_at: remote_modified_at,
                }],
                9,
            )
            .unwrap();

        assert_eq!(outcome.applied, 1);
        let row = store.liked("T1").unwrap().unwrap();
        assert_eq!(row.sync_status, SyncStatus::Synced);
        assert_eq!(row.modified_at, remote_modified_at);
        assert!(!row.payload.is_liked);

        let conflicts = store.conflicts(10).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].winner, ConflictWinner::Remote);
        assert_eq!(conflicts[0].incoming_modified_at, remote_modified_at);
    }

    #[test]
    fn test_tie_keeps_pending_local_write() {
        let store = store();
        store
            .upsert_at(&Like::new("T1", ContentType::Track, true), 100)
            .unwrap();

        let outcome = store
            .apply_remote_changes(
                EntityKind::LikedContent,
                &[RemoteChange::Like {
                    like: Like::new("T1", ContentType::Track, false),
                    modified_at: 100,
                }],
                3,
            )
            .unwrap();

        assert_eq!(outcome.kept_local, 1);
        assert_eq!(outcome.applied, 0);
        let row = store.liked("T1").unwrap().unwrap();
        assert!(row.payload.is_liked);
        assert_eq!(row.sync_status, SyncStatus::PendingSync);
        assert_eq!(store.pending::<Like>().unwrap().len(), 1);
        assert_eq!(store.conflicts(10).unwrap()[0].winner, ConflictWinner::Local);
    }

    #[test]
    fn test_newer_local_conflict_is_requeued() {
        let store = store();
        store
            .upsert_at(&Like::new("T1", ContentType::Track, true), 100)
            .unwrap();
        store.mark_conflict::<Like>("T1", 100).unwrap();
        let reset = store
            .reset_setting(SettingKey::ExternalSearchEnabled)
            .unwrap();
        store
            .mark_conflict::<UserSetting>(
                SettingKey::ExternalSearchEnabled.as_str(),
                reset.modified_at,
            )
            .unwrap();

        let likes = store
            .apply_remote_changes(
                EntityKind::LikedContent,
                &[RemoteChange::Like {
                    like: Like::new("T1", ContentType::Track, false),
                    modified_at: 90,
                }],
                4,
            )
            .unwrap();
        assert_eq!(likes.kept_local, 1);
        assert_eq!(likes.requeued, 1);
        assert_eq!(likes.conflicts_logged, 1);

        let row = store.liked("T1").unwrap().unwrap();
        assert!(row.payload.is_liked);
        assert_eq!(row.sync_status, SyncStatus::PendingSync);
        assert_eq!(store.conflicts(10).unwrap()[0].winner, ConflictWinner::Local);

        assert_eq!(store.requeue_conflicts::<UserSetting>().unwrap(), 1);
        let setting = store
            .setting(SettingKey::ExternalSearchEnabled)
            .unwrap()
            .unwrap();
        assert_eq!(setting.sync_status, SyncStatus::PendingDelete);
    }

    #[test]
    fn test_plain_refresh_is_not_a_conflict() {
        let store = store();
        let outcome = store
            .apply_remote_changes(
                EntityKind::Settings,
                &[
                    RemoteChange::Setting {
                        setting: UserSetting::DirectDownloadsEnabled(true),
                        modified_at: 10,
                    },
                    RemoteChange::SettingReset {
                        key: SettingKey::DirectDownloadsEnabled,
                        modified_at: 20,
                    },
                ],
                2,
            )
            .unwrap();

        assert_eq!(outcome.applied, 2);
        assert_eq!(outcome.conflicts_logged, 0);
        assert!(store
            .setting(SettingKey::DirectDownloadsEnabled)
            .unwrap()
            .is_none());
        assert_eq!(
            store
                .effective_setting(SettingKey::DirectDownloadsEnabled)
                .unwrap(),
            UserSetting::DirectDownloadsEnabled(false)
        );
        assert_eq!(store.checkpoint(EntityKind::Settings).unwrap(), 2);
    }

    #[test]
    fn test_search_history_is_capped() {
        let store = Store::new(Database::open_in_memory().unwrap(), 2).unwrap();
        store.add_search("a", ContentType::Artist, "R1").unwrap();
        store.add_search("b", ContentType::Album, "A1").unwrap();
        store.add_search("c", ContentType::Track, "T1").unwrap();

        let queries: Vec<String> = store
            .search_history(10)
            .unwrap()
            .into_iter()
            .map(|entry| entry.query)
            .collect();
        assert_eq!(queries, vec!["c", "b"]);
        assert_eq!(store.subscribe_search_history().borrow().len(), 2);

        assert_eq!(store.clear_search_history().unwrap(), 2);
        assert!(store.subscribe_search_history().borrow().is_empty());
    }

    #[test]
    fn test_views_track_sync_state() {
        let store = store();
        let view = store.record_view(ContentType::Album, "A1").unwrap();
        assert_eq!(
            store.status_summary(EntityKind::ViewedContent).unwrap().pending_sync,
            1
        );
        assert!(store.mark_view_synced(view.id).unwrap());
        assert!(store.unsynced_views(10).unwrap().is_empty());
        assert!(store.subscribe_viewed().borrow()[0].synced);
    }

    #[test]
    fn test_store_persists_across_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("lyra.db");

        {
            let store = Store::open(&path).unwrap();
            store.set_liked("T1", ContentType::Track, true).unwrap();
        }

        let store = Store::open(&path).unwrap();
        let row = store.liked("T1").unwrap().unwrap();
        assert_eq!(row.sync_status, SyncStatus::PendingSync);
        assert_eq!(store.subscribe_liked().borrow().len(), 1);
    }
}
