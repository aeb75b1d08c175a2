//! Disk space monitoring.
//!
//! The monitor keeps the latest [`StorageInfo`] snapshot in a watch channel.
//! Callers ask it whether an allocation fits and how large caches may grow
//! under the current pressure level.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::StorageConfig;
use crate::error::Result;

/// Disk space pressure, ordered from least to most constrained
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PressureLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl PressureLevel {
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Classify by available fraction: >= 20% low, >= 10% medium, >= 5% high.
    ///
    /// Integer arithmetic keeps the thresholds exact.
    pub fn classify(total_bytes: u64, available_bytes: u64) -> Self {
        if total_bytes == 0 {
            return Self::Critical;
        }
        let available = u128::from(available_bytes.min(total_bytes)) * 100;
        let total = u128::from(total_bytes);
        if available >= total * 20 {
            Self::Low
        } else if available >= total * 10 {
            Self::Medium
        } else if available >= total * 5 {
            Self::High
        } else {
            Self::Critical
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw figures reported by a stats source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSpace {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

/// Snapshot of the volume holding the data directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
    pub pressure_level: PressureLevel,
}

impl StorageInfo {
    pub fn from_space(space: DiskSpace) -> Self {
        let available_bytes = space.available_bytes.min(space.total_bytes);
        Self {
            total_bytes: space.total_bytes,
            available_bytes,
            used_bytes: space.total_bytes - available_bytes,
            pressure_level: PressureLevel::classify(space.total_bytes, available_bytes),
        }
    }

    pub fn available_fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.available_bytes as f64 / self.total_bytes as f64
    }
}

/// Source of disk space figures
pub trait StorageStatsSource: Send + Sync {
    fn disk_space(&self) -> Result<DiskSpace>;
}

/// Reads the volume of a directory through `fs2`
#[derive(Debug, Clone)]
pub struct FsStatsSource {
    path: PathBuf,
}

impl FsStatsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageStatsSource for FsStatsSource {
    fn disk_space(&self) -> Result<DiskSpace> {
        Ok(DiskSpace {
            total_bytes: fs2::total_space(&self.path)?,
            available_bytes: fs2::available_space(&self.path)?,
        })
    }
}

pub struct StorageMonitor {
    source: Box<dyn StorageStatsSource>,
    config: StorageConfig,
    info: watch::Sender<Option<StorageInfo>>,
}

impl StorageMonitor {
    pub fn new(source: impl StorageStatsSource + 'static, config: StorageConfig) -> Self {
        let (info, _) = watch::channel(None);
        Self {
            source: Box::new(source),
            config,
            info,
        }
    }

    /// Monitor the volume holding `path`
    pub fn for_path(path: impl Into<PathBuf>, config: StorageConfig) -> Self {
        Self::new(FsStatsSource::new(path), config)
    }

    /// Query the source and publish a new snapshot
    pub fn refresh(&self) -> Result<StorageInfo> {
        let info = StorageInfo::from_space(self.source.disk_space()?);
        let previous = self.info.send_replace(Some(info));
        if previous.map(|previous| previous.pressure_level) != Some(info.pressure_level) {
            tracing::info!(
                "Storage pressure {} ({} of {} bytes available)",
                info.pressure_level,
                info.available_bytes,
                info.total_bytes
            );
        }
        Ok(info)
    }

    /// Latest snapshot, `None` before the first refresh
    pub fn current(&self) -> Option<StorageInfo> {
        *self.info.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<StorageInfo>> {
        self.info.subscribe()
    }

    /// Bytes kept free when an allocation asks for a buffer
    fn buffer_bytes(&self, total_bytes: u64) -> u64 {
        let proportional = (total_bytes as f64 * self.config.buffer_fraction).ceil();
        let proportional = if proportional >= u64::MAX as f64 {
            u64::MAX
        } else {
            proportional as u64
        };
        proportional.max(self.config.min_buffer_bytes)
    }

    /// Whether `size` bytes fit, optionally keeping the configured buffer free.
    ///
    /// Unknown storage (no refresh yet) never fits.
    pub fn can_allocate(&self, size: u64, keep_buffer: bool) -> bool {
        let Some(info) = self.current() else {
            return false;
        };
        let buffer = if keep_buffer {
            self.buffer_bytes(info.total_bytes)
        } else {
            0
        };
        info.available_bytes
            .checked_sub(size)
            .and_then(|remaining| remaining.checked_sub(buffer))
            .is_some()
    }

    /// Cache budget for the current pressure level; unknown storage counts as critical
    pub fn recommended_max_cache_bytes(&self) -> u64 {
        let level = self
            .current()
            .map_or(PressureLevel::Critical, |info| info.pressure_level);
        self.config.cache_policy.for_level(level)
    }

    /// Refresh periodically until the monitor is dropped by every holder
    pub fn spawn_refresh_loop(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let monitor = Arc::downgrade(&self);
        drop(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                if let Err(error) = monitor.refresh() {
                    tracing::warn!("Storage refresh failed: {error}");
                }
            }
        })
    }
}
