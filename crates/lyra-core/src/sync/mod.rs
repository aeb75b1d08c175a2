//! Synchronizer: drives pending local state towards the remote authority.
//!
//! One worker per entity kind waits on a coalescing wake signal, the periodic
//! timer, the earliest retry deadline of its failed rows, or shutdown. A pass
//! pushes every pending row, records the outcome with compare-and-set status
//! transitions, then pulls remote changes since the stored checkpoint.
//!
//! Passes of the same kind never overlap. A wake-up that arrives during a pass
//! leaves one stored permit, so the pass reruns exactly once afterwards.

mod backoff;


pub use backoff::Backoff;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::db::{ApplyOutcome, Snapshot, Store};
use crate::error::Error;
use crate::models::{EntityKind, Like, PendingRecord, SyncStatus, UserSetting};
use crate::remote::{RemoteApi, RemoteError};
use crate::util::now_millis;

/// Viewed entries pushed per store read
const VIEW_BATCH_SIZE: usize = 100;

const EVENT_CAPACITY: usize = 64;

/// Errors that abort a sync pass
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error(transparent)]
    Store(#[from] Error),
}

/// What one pass did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub kind: EntityKind,
    /// Failed rows moved back to pending because their retry was due
    pub promoted: usize,
    /// Rows acknowledged by the remote and marked synced (or removed)
    pub pushed: usize,
    /// Rows acknowledged while a newer local write landed; they stay pending
    pub superseded: usize,
    pub failed: usize,
    /// Rows the remote rejected as stale
    pub conflicts: usize,
    /// Remote changes written locally
    pub applied: usize,
    pub kept_local: usize,
    pub conflicts_logged: usize,
    /// Whether the pull restarted from checkpoint 0
    pub full_resync: bool,
    pub pull_failed: bool,
    /// Conflicting rows whose local copy won and is queued for the next push
    pub requeued: usize,
    /// Rows still in `Conflict` at the end of the pass
    pub unresolved: usize,
}

impl PassReport {
    pub const fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            promoted: 0,
            pushed: 0,
            superseded: 0,
            failed: 0,
            conflicts: 0,
            applied: 0,
            kept_local: 0,
            conflicts_logged: 0,
            full_resync: false,
            pull_failed: false,
            requeued: 0,
            unresolved: 0,
        }
    }

    fn absorb(&mut self, outcome: ApplyOutcome) {
        self.applied += outcome.applied;
        self.kept_local += outcome.kept_local;
        self.conflicts_logged += outcome.conflicts_logged;
        self.requeued += outcome.requeued;
    }

    /// Whether the pass changed nothing locally or remotely
    pub const fn is_idle(&self) -> bool {
        self.promoted == 0
            && self.pushed == 0
            && self.superseded == 0
            && self.failed == 0
            && self.conflicts == 0
            && self.applied == 0
            && self.requeued == 0
            && !self.full_resync
    }
}

/// Broadcast after every pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    PassCompleted { kind: EntityKind, report: PassReport },
    PassAborted { kind: EntityKind, error: String },
}

impl SyncEvent {
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::PassCompleted { kind, .. } | Self::PassAborted { kind, .. } => *kind,
        }
    }
}

/// Synced kinds and the remote call that pushes one of their rows
#[async_trait]
trait Pushable: Snapshot {
    async fn push(remote: &dyn RemoteApi, pending: &PendingRecord<Self>)
        -> Result<(), RemoteError>;
}

#[async_trait]
impl Pushable for Like {
    async fn push(
        remote: &dyn RemoteApi,
        pending: &PendingRecord<Self>,
    ) -> Result<(), RemoteError> {
        remote.push_liked_content(&pending.record).await
    }
}

#[async_trait]
impl Pushable for UserSetting {
    async fn push(
        remote: &dyn RemoteApi,
        pending: &PendingRecord<Self>,
    ) -> Result<(), RemoteError> {
        let setting = &pending.record.payload;
        let value = (!pending.tombstone).then_some(setting);
        remote
            .push_setting(setting.key(), value, pending.record.modified_at)
            .await
    }
}

#[derive(Default)]
struct Lane {
    wake: Notify,
    pass_lock: tokio::sync::Mutex<()>,
    passes: AtomicU64,
}

struct Inner {
    store: Store,
    remote: Arc<dyn RemoteApi>,
    config: SyncConfig,
    backoff: Backoff,
    lanes: [Lane; 3],
    events: broadcast::Sender<SyncEvent>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Cloneable handle to the sync engine
#[derive(Clone)]
pub struct Synchronizer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Synchronizer")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Synchronizer {
    pub fn new(store: Store, remote: Arc<dyn RemoteApi>, config: SyncConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                store,
                remote,
                backoff: Backoff::from_config(&config),
                config,
                lanes: Default::default(),
                events,
                shutdown,
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// Request a pass of every kind. Never blocks; calls coalesce per worker.
    pub fn wake_up(&self) {
        for kind in EntityKind::ALL {
            self.wake_up_kind(kind);
        }
    }

    pub fn wake_up_kind(&self, kind: EntityKind) {
        self.inner.lane(kind).wake.notify_one();
    }

    /// Run one pass now, waiting for a running pass of the same kind first
    pub async fn sync_now(&self, kind: EntityKind) -> Result<PassReport, SyncError> {
        self.inner.guarded_pass(kind).await
    }

    /// Run one pass per kind in order, stopping at the first abort
    pub async fn sync_all(&self) -> Result<Vec<PassReport>, SyncError> {
        let mut reports = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            reports.push(self.sync_now(kind).await?);
        }
        Ok(reports)
    }

    /// Spawn one worker per kind. Calling it again while running does nothing.
    pub fn start(&self) {
        let mut workers = self
            .inner
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !workers.is_empty() {
            return;
        }

        self.inner.shutdown.send_replace(false);
        for kind in EntityKind::ALL {
            let inner = Arc::clone(&self.inner);
            workers.push(tokio::spawn(async move { inner.run_worker(kind).await }));
        }
        tracing::debug!("Started {} sync workers", workers.len());
    }

    /// Stop the workers, letting a running pass finish
    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        let workers = std::mem::take(
            &mut *self
                .inner
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if let Err(error) = worker.await {
                tracing::error!("Sync worker ended abnormally: {error}");
            }
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Passes started for a kind since construction
    pub fn pass_count(&self, kind: EntityKind) -> u64 {
        self.inner.lane(kind).passes.load(Ordering::SeqCst)
    }
}

impl Inner {
    const fn lane(&self, kind: EntityKind) -> &Lane {
        match kind {
            EntityKind::LikedContent => &self.lanes[0],
            EntityKind::Settings => &self.lanes[1],
            EntityKind::ViewedContent => &self.lanes[2],
        }
    }

    async fn run_worker(&self, kind: EntityKind) {
        let mut shutdown = self.shutdown.subscribe();
        let lane = self.lane(kind);

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            let wait = self.next_wait(kind);

            tokio::select! {
                () = lane.wake.notified() => {}
                () = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => continue,
            }

            // Aborts are already logged and broadcast.
            let _ = self.guarded_pass(kind).await;
        }
        tracing::debug!("Sync worker for {kind} stopped");
    }

    /// Time until the periodic tick or the earliest retry, whichever is first
    fn next_wait(&self, kind: EntityKind) -> Duration {
        let periodic = self.config.periodic_interval;
        let next_retry_at = match kind {
            EntityKind::LikedContent => self.store.next_retry_at::<Like>(),
            EntityKind::Settings => self.store.next_retry_at::<UserSetting>(),
            EntityKind::ViewedContent => Ok(None),
        };

        match next_retry_at {
            Ok(Some(at)) => {
                let remaining = u64::try_from(at - now_millis()).unwrap_or(0);
                Duration::from_millis(remaining).min(periodic)
            }
            Ok(None) => periodic,
            Err(error) => {
                tracing::warn!("Failed to read retry deadline for {kind}: {error}");
                periodic
            }
        }
    }

    async fn guarded_pass(&self, kind: EntityKind) -> Result<PassReport, SyncError> {
        let lane = self.lane(kind);
        let _guard = lane.pass_lock.lock().await;
        lane.passes.fetch_add(1, Ordering::SeqCst);

        let result = match kind {
            EntityKind::LikedContent => self.sync_records::<Like>().await,
            EntityKind::Settings => self.sync_records::<UserSetting>().await,
            EntityKind::ViewedContent => self.sync_viewed().await,
        };

        // Sending fails only when nobody listens.
        match &result {
            Ok(report) => {
                if report.is_idle() {
                    tracing::debug!("Sync pass for {kind}: nothing to do");
                } else {
                    tracing::info!(
                        "Sync pass for {kind}: pushed {}, failed {}, conflicts {}, applied {}",
                        report.pushed,
                        report.failed,
                        report.conflicts,
                        report.applied
                    );
                }
                let _ = self.events.send(SyncEvent::PassCompleted {
                    kind,
                    report: report.clone(),
                });
            }
            Err(error) => {
                tracing::error!("Sync pass for {kind} aborted: {error}");
                let _ = self.events.send(SyncEvent::PassAborted {
                    kind,
                    error: error.to_string(),
                });
            }
        }
        result
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, RemoteError>> + Send,
    ) -> Result<T, RemoteError> {
        tokio::time::timeout(self.config.request_timeout, request)
            .await
            .unwrap_or(Err(RemoteError::Timeout))
    }

    async fn sync_records<T: Pushable>(&self) -> Result<PassReport, SyncError> {
        let kind = T::KIND;
        let mut report = PassReport::new(kind);

        report.promoted = self.store.promote_due_failures::<T>(now_millis())?;

        for pending in self.store.pending::<T>()? {
            let key = pending.record.key();
            let modified_at = pending.record.modified_at;

            match self.call(T::push(self.remote.as_ref(), &pending)).await {
                Ok(()) => {
                    if self.store.mark_synced::<T>(&key, modified_at)? {
                        report.pushed += 1;
                    } else {
                        tracing::debug!("{kind} {key} changed during push, keeping it pending");
                        report.superseded += 1;
                    }
                }
                Err(RemoteError::StaleWrite { server_modified_at }) => {
                    tracing::debug!(
                        "{kind} {key} is stale: local {modified_at}, server {server_modified_at}"
                    );
                    self.store.mark_conflict::<T>(&key, modified_at)?;
                    report.conflicts += 1;
                }
                Err(RemoteError::Authentication(message)) => {
                    return Err(SyncError::Authentication(message));
                }
                Err(error) => {
                    let attempts = pending.attempts.saturating_add(1);
                    let delay = self
                        .backoff
                        .delay(attempts)
                        .max(error.retry_after().unwrap_or_default());
                    let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
                    let next_retry_at = now_millis().saturating_add(delay_ms);
                    tracing::warn!(
                        "Push of {kind} {key} failed (attempt {attempts}), retrying in {delay:?}: {error}"
                    );
                    self.store
                        .mark_failed::<T>(&key, modified_at, attempts, next_retry_at)?;
                    report.failed += 1;
                }
            }
        }

        let checkpoint = self.store.checkpoint(kind)?;
        let pulled = self.pull(kind, checkpoint, &mut report).await?;
        let mut pulled_full = pulled && report.full_resync;

        report.unresolved = self.store.count_with_status::<T>(SyncStatus::Conflict)?;
        if report.unresolved > 0 && !report.full_resync {
            tracing::debug!(
                "{} {kind} rows still in conflict, pulling full state",
                report.unresolved
            );
            pulled_full = self.pull(kind, 0, &mut report).await?;
            report.unresolved = self.store.count_with_status::<T>(SyncStatus::Conflict)?;
        }
        // The full state holds nothing newer for these rows, so the local copy wins.
        if report.unresolved > 0 && pulled_full {
            report.requeued += self.store.requeue_conflicts::<T>()?;
            report.unresolved = self.store.count_with_status::<T>(SyncStatus::Conflict)?;
        }
        if report.requeued > 0 {
            tracing::debug!(
                "{} {kind} conflicting rows won locally and will be resent",
                report.requeued
            );
        }
        if report.unresolved > 0 {
            tracing::warn!(
                "{} {kind} rows remain in conflict until the next pass",
                report.unresolved
            );
        }

        Ok(report)
    }

    /// Pull and apply changes, restarting from 0 once if the checkpoint expired.
    ///
    /// Returns whether a batch was applied.
    async fn pull(
        &self,
        kind: EntityKind,
        mut checkpoint: i64,
        report: &mut PassReport,
    ) -> Result<bool, SyncError> {
        if checkpoint == 0 {
            report.full_resync = true;
        }

        loop {
            match self
                .call(self.remote.pull_changes_since(kind, checkpoint))
                .await
            {
                Ok(batch) => {
                    let outcome =
                        self.store
                            .apply_remote_changes(kind, &batch.changes, batch.checkpoint)?;
                    tracing::debug!(
                        "Pulled {} {kind} changes since {checkpoint}, now at {}",
                        batch.changes.len(),
                        batch.checkpoint
                    );
                    report.absorb(outcome);
                    return Ok(true);
                }
                Err(RemoteError::CheckpointExpired) if checkpoint != 0 => {
                    tracing::warn!("Checkpoint {checkpoint} for {kind} expired, pulling full state");
                    self.store.reset_checkpoint(kind)?;
                    checkpoint = 0;
                    report.full_resync = true;
                }
                Err(RemoteError::Authentication(message)) => {
                    return Err(SyncError::Authentication(message));
                }
                Err(error) => {
                    tracing::warn!("Pull of {kind} failed: {error}");
                    report.pull_failed = true;
                    return Ok(false);
                }
            }
        }
    }

    /// Push unsynced views oldest first. Views are never pulled.
    async fn sync_viewed(&self) -> Result<PassReport, SyncError> {
        let mut report = PassReport::new(EntityKind::ViewedContent);

        loop {
            let batch = self.store.unsynced_views(VIEW_BATCH_SIZE)?;
            if batch.is_empty() {
                break;
            }
            let failed_before = report.failed;

            for entry in &batch {
                match self.call(self.remote.push_viewed_content(entry)).await {
                    // A stale answer means the server already has the entry.
                    Ok(()) | Err(RemoteError::StaleWrite { .. }) => {
                        if self.store.mark_view_synced(entry.id)? {
                            report.pushed += 1;
                        }
                    }
                    Err(RemoteError::Authentication(message)) => {
                        return Err(SyncError::Authentication(message));
                    }
                    Err(error) => {
                        tracing::warn!("Push of viewed entry {} failed: {error}", entry.id);
                        report.failed += 1;
                    }
                }
            }

            if report.failed > failed_before || batch.len() < VIEW_BATCH_SIZE {
                break;
            }
        }

        Ok(report)
    }
}
