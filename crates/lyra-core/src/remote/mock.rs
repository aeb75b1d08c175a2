//! In-memory remote for tests and offline demos.
//!
//! Behaves like the sync server: last-writer-wins per key on `modified_at`,
//! an append-only event log with sequence numbers, and pruning that makes old
//! checkpoints expire. Failures can be queued and a push can be held open to
//! observe what happens while a pass is in flight.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{ChangeBatch, RemoteApi, RemoteChange, RemoteError};
use crate::models::{EntityKind, Like, LikedContent, SettingKey, UserSetting, ViewedContent};

/// One push received by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedCall {
    pub kind: EntityKind,
    pub key: String,
    pub modified_at: i64,
}

/// Holds one push open until released.
#[derive(Debug, Clone, Default)]
pub struct PushGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl PushGate {
    /// Wait until the held push has started
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held push complete
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Debug, Default)]
struct MockRemoteInner {
    likes: BTreeMap<String, (Like, i64)>,
    settings: BTreeMap<SettingKey, (UserSetting, i64)>,
    /// Keys whose current value came from a reset
    reset_keys: BTreeSet<SettingKey>,
    viewed: Vec<ViewedContent>,
    events: Vec<(i64, RemoteChange)>,
    current_seq: i64,
    pushes: Vec<PushedCall>,
    push_failures: VecDeque<RemoteError>,
    pull_failures: VecDeque<RemoteError>,
    unauthorized: bool,
    push_gate: Option<PushGate>,
    pulls: usize,
}

impl MockRemoteInner {
    fn append(&mut self, change: RemoteChange) {
        self.current_seq += 1;
        self.events.push((self.current_seq, change));
    }

    /// Check the guards shared by every push and log the call
    fn begin_push(&mut self, call: PushedCall) -> Result<(), RemoteError> {
        if self.unauthorized {
            return Err(RemoteError::Authentication("HTTP 401".to_string()));
        }
        self.pushes.push(call);
        self.push_failures.pop_front().map_or(Ok(()), Err)
    }

    fn accept_like(&mut self, like: &Like, modified_at: i64) -> Result<(), RemoteError> {
        if let Some((current, server_modified_at)) = self.likes.get(&like.content_id) {
            if *server_modified_at > modified_at
                || (*server_modified_at == modified_at && current != like)
            {
                return Err(RemoteError::StaleWrite {
                    server_modified_at: *server_modified_at,
                });
            }
            if *server_modified_at == modified_at {
                return Ok(());
            }
        }
        self.likes
            .insert(like.content_id.clone(), (like.clone(), modified_at));
        self.append(RemoteChange::Like {
            like: like.clone(),
            modified_at,
        });
        Ok(())
    }

    fn accept_setting(
        &mut self,
        key: SettingKey,
        setting: Option<UserSetting>,
        modified_at: i64,
    ) -> Result<(), RemoteError> {
        let value = setting.unwrap_or_else(|| key.default_setting());
        if let Some((current, server_modified_at)) = self.settings.get(&key) {
            if *server_modified_at > modified_at
                || (*server_modified_at == modified_at && *current != value)
            {
                return Err(RemoteError::StaleWrite {
                    server_modified_at: *server_modified_at,
                });
            }
            if *server_modified_at == modified_at {
                return Ok(());
            }
        }
        self.settings.insert(key, (value, modified_at));
        if setting.is_some() {
            self.reset_keys.remove(&key);
        } else {
            self.reset_keys.insert(key);
        }
        self.append(match setting {
            Some(setting) => RemoteChange::Setting {
                setting,
                modified_at,
            },
            None => RemoteChange::SettingReset { key, modified_at },
        });
        Ok(())
    }

    /// Current state as changes, used for full pulls
    fn snapshot(&self, kind: EntityKind) -> Vec<RemoteChange> {
        match kind {
            EntityKind::LikedContent => self
                .likes
                .values()
                .map(|(like, modified_at)| RemoteChange::Like {
                    like: like.clone(),
                    modified_at: *modified_at,
                })
                .collect(),
            EntityKind::Settings => self
                .settings
                .iter()
                .map(|(key, (setting, modified_at))| {
                    if self.reset_keys.contains(key) {
                        RemoteChange::SettingReset {
                            key: *key,
                            modified_at: *modified_at,
                        }
                    } else {
                        RemoteChange::Setting {
                            setting: *setting,
                            modified_at: *modified_at,
                        }
                    }
                })
                .collect(),
            EntityKind::ViewedContent => Vec::new(),
        }
    }
}

/// In-memory `RemoteApi`
#[derive(Debug, Clone, Default)]
pub struct MockRemote {
    inner: Arc<Mutex<MockRemoteInner>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockRemoteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate a like written by another device
    pub fn remote_like(&self, like: Like, modified_at: i64) {
        let mut inner = self.lock();
        inner.likes.insert(like.content_id.clone(), (like.clone(), modified_at));
        inner.append(RemoteChange::Like { like, modified_at });
    }

    /// Simulate a setting written by another device
    pub fn remote_setting(&self, setting: UserSetting, modified_at: i64) {
        let mut inner = self.lock();
        inner.settings.insert(setting.key(), (setting, modified_at));
        inner.reset_keys.remove(&setting.key());
        inner.append(RemoteChange::Setting {
            setting,
            modified_at,
        });
    }

    /// Drop events up to and including `seq` from the log
    pub fn prune_events_through(&self, seq: i64) {
        self.lock().events.retain(|(event_seq, _)| *event_seq > seq);
    }

    /// Queue an error for the next push (pushes consume errors in order)
    pub fn fail_next_push(&self, error: RemoteError) {
        self.lock().push_failures.push_back(error);
    }

    /// Queue an error for the next pull
    pub fn fail_next_pull(&self, error: RemoteError) {
        self.lock().pull_failures.push_back(error);
    }

    /// Reject every call with `Authentication` while set
    pub fn set_unauthorized(&self, unauthorized: bool) {
        self.lock().unauthorized = unauthorized;
    }

    /// Hold the next push open until the returned gate is released
    pub fn gate_next_push(&self) -> PushGate {
        let gate = PushGate::default();
        self.lock().push_gate = Some(gate.clone());
        gate
    }

    pub fn like(&self, content_id: &str) -> Option<(Like, i64)> {
        self.lock().likes.get(content_id).cloned()
    }

    pub fn setting(&self, key: SettingKey) -> Option<(UserSetting, i64)> {
        self.lock().settings.get(&key).copied()
    }

    pub fn viewed(&self) -> Vec<ViewedContent> {
        self.lock().viewed.clone()
    }

    pub fn pushes(&self) -> Vec<PushedCall> {
        self.lock().pushes.clone()
    }

    pub fn pull_count(&self) -> usize {
        self.lock().pulls
    }

    pub fn current_seq(&self) -> i64 {
        self.lock().current_seq
    }

    async fn wait_at_gate(&self) {
        let gate = self.lock().push_gate.take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn push_liked_content(&self, record: &LikedContent) -> Result<(), RemoteError> {
        self.wait_at_gate().await;
        let mut inner = self.lock();
        inner.begin_push(PushedCall {
            kind: EntityKind::LikedContent,
            key: record.key(),
            modified_at: record.modified_at,
        })?;
        inner.accept_like(&record.payload, record.modified_at)
    }

    async fn push_setting(
        &self,
        key: SettingKey,
        setting: Option<&UserSetting>,
        modified_at: i64,
    ) -> Result<(), RemoteError> {
        self.wait_at_gate().await;
        let mut inner = self.lock();
        inner.begin_push(PushedCall {
            kind: EntityKind::Settings,
            key: key.as_str().to_string(),
            modified_at,
        })?;
        inner.accept_setting(key, setting.copied(), modified_at)
    }

    async fn push_viewed_content(&self, entry: &ViewedContent) -> Result<(), RemoteError> {
        self.wait_at_gate().await;
        let mut inner = self.lock();
        inner.begin_push(PushedCall {
            kind: EntityKind::ViewedContent,
            key: entry.id.to_string(),
            modified_at: entry.created,
        })?;
        let duplicate = inner.viewed.iter().any(|existing| {
            existing.content_id == entry.content_id && existing.created == entry.created
        });
        if !duplicate {
            inner.viewed.push(ViewedContent {
                synced: true,
                ..entry.clone()
            });
        }
        Ok(())
    }

    async fn pull_changes_since(
        &self,
        kind: EntityKind,
        checkpoint: i64,
    ) -> Result<ChangeBatch, RemoteError> {
        let mut inner = self.lock();
        inner.pulls += 1;
        if inner.unauthorized {
            return Err(RemoteError::Authentication("HTTP 401".to_string()));
        }
        if let Some(error) = inner.pull_failures.pop_front() {
            return Err(error);
        }

        if checkpoint == 0 {
            return Ok(ChangeBatch {
                changes: inner.snapshot(kind),
                checkpoint: inner.current_seq,
            });
        }

        let min_seq = inner.events.first().map(|(seq, _)| *seq);
        let expired = match min_seq {
            Some(min_seq) => checkpoint + 1 < min_seq,
            None => checkpoint < inner.current_seq,
        };
        if expired {
            return Err(RemoteError::CheckpointExpired);
        }

        let changes = inner
            .events
            .iter()
            .filter(|(seq, change)| *seq > checkpoint && change.kind() == kind)
            .map(|(_, change)| change.clone())
            .collect();
        Ok(ChangeBatch {
            changes,
            checkpoint: inner.current_seq,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, SyncStatus, SyncedRecord};

    fn record(like: Like, modified_at: i64) -> LikedContent {
        SyncedRecord::new(like, modified_at, SyncStatus::PendingSync)
    }

    #[tokio::test]
    async fn rejects_older_writes_and_accepts_replays() {
        let remote = MockRemote::new();
        let like = Like::new("T1", ContentType::Track, true);

        remote.push_liked_content(&record(like.clone(), 100)).await.unwrap();
        remote.push_liked_content(&record(like.clone(), 100)).await.unwrap();
        assert_eq!(remote.current_seq(), 1);

        let err = remote
            .push_liked_content(&record(like, 90))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RemoteError::StaleWrite {
                server_modified_at: 100
            }
        );
    }

    #[tokio::test]
    async fn pruned_checkpoints_expire_but_full_pull_works() {
        let remote = MockRemote::new();
        for (index, id) in ["T1", "T2", "T3"].into_iter().enumerate() {
            remote.remote_like(
                Like::new(id, ContentType::Track, true),
                i64::try_from(index).unwrap(),
            );
        }
        remote.prune_events_through(2);

        let err = remote
            .pull_changes_since(EntityKind::LikedContent, 1)
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::CheckpointExpired);

        let recent = remote
            .pull_changes_since(EntityKind::LikedContent, 2)
            .await
            .unwrap();
        assert_eq!(recent.changes.len(), 1);

        let full = remote
            .pull_changes_since(EntityKind::LikedContent, 0)
            .await
            .unwrap();
        assert_eq!(full.changes.len(), 3);
        assert_eq!(full.checkpoint, 3);
    }

    #[tokio::test]
    async fn setting_reset_is_logged_as_reset() {
        let remote = MockRemote::new();
        remote.remote_setting(UserSetting::ExternalSearchEnabled(true), 10);
        remote
            .push_setting(SettingKey::ExternalSearchEnabled, None, 20)
            .await
            .unwrap();

        assert_eq!(
            remote.setting(SettingKey::ExternalSearchEnabled),
            Some((UserSetting::ExternalSearchEnabled(false), 20))
        );
        let batch = remote
            .pull_changes_since(EntityKind::Settings, 1)
            .await
            .unwrap();
        assert_eq!(
            batch.changes,
            vec![RemoteChange::SettingReset {
                key: SettingKey::ExternalSearchEnabled,
                modified_at: 20,
            }]
        );

        let full = remote
            .pull_changes_since(EntityKind::Settings, 0)
            .await
            .unwrap();
        assert_eq!(
            full.changes,
            vec![RemoteChange::SettingReset {
                key: SettingKey::ExternalSearchEnabled,
                modified_at: 20,
            }]
        );

        remote.remote_setting(UserSetting::ExternalSearchEnabled(true), 30);
        let full = remote
            .pull_changes_since(EntityKind::Settings, 0)
            .await
            .unwrap();
        assert_eq!(
            full.changes,
            vec![RemoteChange::Setting {
                setting: UserSetting::ExternalSearchEnabled(true),
                modified_at: 30,
            }]
        );
    }
}
