//! Runtime configuration for the sync engine and the storage monitor.
//!
//! Every value has a default so an unconfigured client still works offline.
//! `from_env` reads `LYRA_*` variables; `from_lookup` takes any key lookup so
//! parsing can be tested without touching the process environment.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::storage::PressureLevel;
use crate::util::{is_http_url, normalize_text_option};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

pub const DEFAULT_SEARCH_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Synchronizer settings
#[derive(Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base URL of the remote API; `None` keeps the client offline-only
    pub api_base_url: Option<String>,
    pub auth_token: Option<String>,
    /// Interval of the periodic pass that recovers from missed wake-ups
    pub periodic_interval: Duration,
    pub request_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Upper bound (exclusive) of the random delay added to every backoff
    pub backoff_jitter: Duration,
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SyncConfig")
            .field("api_base_url", &self.api_base_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("periodic_interval", &self.periodic_interval)
            .field("request_timeout", &self.request_timeout)
            .field("backoff_base", &self.backoff_base)
            .field("backoff_max", &self.backoff_max)
            .field("backoff_jitter", &self.backoff_jitter)
            .finish()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            auth_token: None,
            periodic_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(15),
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(300),
            backoff_jitter: Duration::from_secs(1),
        }
    }
}

impl SyncConfig {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: Some(api_base_url.into().trim_end_matches('/').to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    #[must_use]
    pub const fn with_periodic_interval(mut self, interval: Duration) -> Self {
        self.periodic_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// Disable backoff jitter (deterministic retry times)
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.backoff_jitter = Duration::ZERO;
        self
    }

    /// Whether a remote endpoint is configured
    pub const fn is_configured(&self) -> bool {
        self.api_base_url.is_some()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_base_url = optional_trimmed(&lookup, "LYRA_API_BASE_URL")
            .map(|value| value.trim_end_matches('/').to_string());
        if let Some(url) = api_base_url.as_deref() {
            if !is_http_url(url) {
                return Err(ConfigError::Invalid(
                    "LYRA_API_BASE_URL must start with http:// or https://".to_string(),
                ));
            }
        }
        let auth_token = optional_trimmed(&lookup, "LYRA_AUTH_TOKEN");

        let interval_secs = parse_in_range(
            &lookup,
            "LYRA_SYNC_INTERVAL_SECS",
            defaults.periodic_interval.as_secs(),
            5..=86_400,
        )?;
        let timeout_secs = parse_in_range(
            &lookup,
            "LYRA_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
            1..=300,
        )?;
        let backoff_base_ms = parse_in_range(
            &lookup,
            "LYRA_BACKOFF_BASE_MS",
            u64::try_from(defaults.backoff_base.as_millis()).unwrap_or(u64::MAX),
            10..=600_000,
        )?;
        let backoff_max_secs = parse_in_range(
            &lookup,
            "LYRA_BACKOFF_MAX_SECS",
            defaults.backoff_max.as_secs(),
            1..=86_400,
        )?;

        let backoff_base = Duration::from_millis(backoff_base_ms);
        let backoff_max = Duration::from_secs(backoff_max_secs);
        if backoff_max < backoff_base {
            return Err(ConfigError::Invalid(
                "LYRA_BACKOFF_MAX_SECS must not be below LYRA_BACKOFF_BASE_MS".to_string(),
            ));
        }

        Ok(Self {
            api_base_url,
            auth_token,
            periodic_interval: Duration::from_secs(interval_secs),
            request_timeout: Duration::from_secs(timeout_secs),
            backoff_base,
            backoff_max,
            backoff_jitter: defaults.backoff_jitter,
        })
    }
}

/// Cache budget recommended for each pressure level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
    pub critical: u64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            low: GIB,
            medium: 512 * MIB,
            high: 128 * MIB,
            critical: 0,
        }
    }
}

impl CachePolicy {
    pub const fn for_level(&self, level: PressureLevel) -> u64 {
        match level {
            PressureLevel::Low => self.low,
            PressureLevel::Medium => self.medium,
            PressureLevel::High => self.high,
            PressureLevel::Critical => self.critical,
        }
    }

    /// Budgets must not grow as pressure increases.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.low >= self.medium && self.medium >= self.high && self.high >= self.critical {
            Ok(())
        } else {
            Err(ConfigError::Invalid(format!(
                "cache policy must be non-increasing from low to critical: {self:?}"
            )))
        }
    }
}

/// Storage monitor settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageConfig {
    /// Share of total space kept free by `can_allocate` (0.0..=1.0)
    pub buffer_fraction: f64,
    /// Lower bound of the kept buffer in bytes
    pub min_buffer_bytes: u64,
    pub cache_policy: CachePolicy,
    pub refresh_interval: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            buffer_fraction: 0.05,
            min_buffer_bytes: 50 * MIB,
            cache_policy: CachePolicy::default(),
            refresh_interval: Duration::from_secs(30),
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub const fn with_buffer(mut self, fraction: f64, min_bytes: u64) -> Self {
        self.buffer_fraction = fraction;
        self.min_buffer_bytes = min_bytes;
        self
    }

    #[must_use]
    pub const fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.buffer_fraction) {
            return Err(ConfigError::Invalid(format!(
                "storage buffer fraction must be in [0, 1], got {}",
                self.buffer_fraction
            )));
        }
        self.cache_policy.validate()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let buffer_percent = parse_in_range(&lookup, "LYRA_STORAGE_BUFFER_PERCENT", 5, 0..=50)?;
        let min_buffer_mb = parse_in_range(
            &lookup,
            "LYRA_STORAGE_MIN_BUFFER_MB",
            defaults.min_buffer_bytes / MIB,
            0..=1_048_576,
        )?;

        let config = Self {
            buffer_fraction: buffer_percent as f64 / 100.0,
            min_buffer_bytes: min_buffer_mb * MIB,
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }
}

/// Complete client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LyraConfig {
    pub sync: SyncConfig,
    pub storage: StorageConfig,
    pub search_history_limit: usize,
}

impl Default for LyraConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            storage: StorageConfig::default(),
            search_history_limit: DEFAULT_SEARCH_HISTORY_LIMIT,
        }
    }
}

impl LyraConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let search_history_limit = parse_in_range(
            &lookup,
            "LYRA_SEARCH_HISTORY_LIMIT",
            DEFAULT_SEARCH_HISTORY_LIMIT as u64,
            1..=10_000,
        )?;

        Ok(Self {
            sync: SyncConfig::from_lookup(&lookup)?,
            storage: StorageConfig::from_lookup(&lookup)?,
            search_history_limit: usize::try_from(search_history_limit)
                .unwrap_or(DEFAULT_SEARCH_HISTORY_LIMIT),
        })
    }
}

fn parse_in_range(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    })?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from<'a>(
        map: &'a HashMap<&'a str, &'a str>,
    ) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| map.get(key).map(|value| (*value).to_string())
    }

    #[test]
    fn empty_environment_yields_offline_defaults() {
        let map = HashMap::new();
        let config = LyraConfig::from_lookup(lookup_from(&map)).unwrap();

        assert_eq!(config, LyraConfig::default());
        assert!(!config.sync.is_configured());
        assert_eq!(config.sync.backoff_base, Duration::from_secs(2));
        assert_eq!(config.sync.backoff_max, Duration::from_secs(300));
        assert_eq!(config.search_history_limit, 100);
    }

    #[test]
    fn reads_overrides_and_trims_base_url() {
        let mut map = HashMap::new();
        map.insert("LYRA_API_BASE_URL", "https://api.example.com/ ");
        map.insert("LYRA_SYNC_INTERVAL_SECS", "30");
        map.insert("LYRA_BACKOFF_BASE_MS", "500");
        map.insert("LYRA_STORAGE_BUFFER_PERCENT", "10");
        map.insert("LYRA_SEARCH_HISTORY_LIMIT", "20");

        let config = LyraConfig::from_lookup(lookup_from(&map)).unwrap();
        assert_eq!(
            config.sync.api_base_url.as_deref(),
            Some("https://api.example.com")
        );
        assert_eq!(config.sync.periodic_interval, Duration::from_secs(30));
        assert_eq!(config.sync.backoff_base, Duration::from_millis(500));
        assert!((config.storage.buffer_fraction - 0.10).abs() < f64::EPSILON);
        assert_eq!(config.search_history_limit, 20);
    }

    #[test]
    fn rejects_invalid_values() {
        let mut map = HashMap::new();
        map.insert("LYRA_API_BASE_URL", "ftp://example.com");
        let err = SyncConfig::from_lookup(lookup_from(&map)).unwrap_err();
        assert!(err.to_string().contains("LYRA_API_BASE_URL"));

        let mut map = HashMap::new();
        map.insert("LYRA_REQUEST_TIMEOUT_SECS", "soon");
        let err = SyncConfig::from_lookup(lookup_from(&map)).unwrap_err();
        assert!(err.to_string().contains("LYRA_REQUEST_TIMEOUT_SECS"));

        let mut map = HashMap::new();
        map.insert("LYRA_BACKOFF_BASE_MS", "600000");
        map.insert("LYRA_BACKOFF_MAX_SECS", "60");
        assert!(SyncConfig::from_lookup(lookup_from(&map)).is_err());
    }

    #[test]
    fn debug_redacts_auth_token() {
        let config = SyncConfig::new("https://api.example.com").with_auth_token("secret-token");
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("secret-token"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn cache_policy_must_be_monotone() {
        assert!(CachePolicy::default().validate().is_ok());

        let inverted = CachePolicy {
            low: 10,
            medium: 20,
            high: 5,
            critical: 0,
        };
        assert!(inverted.validate().is_err());
    }
}
