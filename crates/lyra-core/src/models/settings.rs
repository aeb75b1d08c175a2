//! User settings model
//!
//! Every setting variant maps to one fixed wire key. Adding a variant makes
//! the compiler point at every mapping that needs a new arm.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{SyncPayload, SyncedRecord};
use crate::error::Error;

/// Wire key of a synced setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingKey {
    DirectDownloadsEnabled,
    ExternalSearchEnabled,
}

impl SettingKey {
    pub const ALL: [Self; 2] = [Self::DirectDownloadsEnabled, Self::ExternalSearchEnabled];

    /// Stable lowercase snake_case key used locally and on the wire
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DirectDownloadsEnabled => "enable_direct_downloads",
            Self::ExternalSearchEnabled => "enable_external_search",
        }
    }

    /// Value the remote assumes when no explicit setting exists
    pub const fn default_setting(self) -> UserSetting {
        match self {
            Self::DirectDownloadsEnabled => UserSetting::DirectDownloadsEnabled(false),
            Self::ExternalSearchEnabled => UserSetting::ExternalSearchEnabled(false),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown setting key: {s}")))
    }
}

/// All supported user settings with their typed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "key", content = "value")]
pub enum UserSetting {
    /// Whether content can be requested for download directly.
    #[serde(rename = "enable_direct_downloads")]
    DirectDownloadsEnabled(bool),
    /// Whether searches also query external providers.
    #[serde(rename = "enable_external_search")]
    ExternalSearchEnabled(bool),
}

impl UserSetting {
    pub const fn key(&self) -> SettingKey {
        match self {
            Self::DirectDownloadsEnabled(_) => SettingKey::DirectDownloadsEnabled,
            Self::ExternalSearchEnabled(_) => SettingKey::ExternalSearchEnabled,
        }
    }

    /// Serialize the value to a string for database storage.
    pub fn value_to_string(&self) -> String {
        match self {
            Self::DirectDownloadsEnabled(enabled) | Self::ExternalSearchEnabled(enabled) => {
                enabled.to_string()
            }
        }
    }

    /// Rebuild a setting from its key and stored string value.
    pub fn from_key_value(key: &str, value: &str) -> Result<Self, Error> {
        let key = key.parse::<SettingKey>()?;
        let invalid_bool =
            || Error::InvalidInput(format!("Invalid boolean value for {key}: {value}"));
        match key {
            SettingKey::DirectDownloadsEnabled => Ok(Self::DirectDownloadsEnabled(
                value.parse().map_err(|_| invalid_bool())?,
            )),
            SettingKey::ExternalSearchEnabled => Ok(Self::ExternalSearchEnabled(
                value.parse().map_err(|_| invalid_bool())?,
            )),
        }
    }
}

impl SyncPayload for UserSetting {
    fn record_key(&self) -> String {
        self.key().as_str().to_string()
    }
}

/// Setting row with sync metadata; one row per key at most
pub type SyncedUserSetting = SyncedRecord<UserSetting>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keys_are_wire_exact() {
        assert_eq!(
            SettingKey::DirectDownloadsEnabled.as_str(),
            "enable_direct_downloads"
        );
        assert_eq!(
            SettingKey::ExternalSearchEnabled.as_str(),
            "enable_external_search"
        );
        assert_eq!(
            UserSetting::ExternalSearchEnabled(true).record_key(),
            "enable_external_search"
        );
    }

    #[test]
    fn from_key_value_parses_booleans() {
        assert_eq!(
            UserSetting::from_key_value("enable_direct_downloads", "true").unwrap(),
            UserSetting::DirectDownloadsEnabled(true)
        );
        assert_eq!(
            UserSetting::from_key_value("enable_external_search", "false").unwrap(),
            UserSetting::ExternalSearchEnabled(false)
        );
    }

    #[test]
    fn from_key_value_rejects_bad_input() {
        let error = UserSetting::from_key_value("enable_external_search", "yes").unwrap_err();
        assert!(error.to_string().contains("Invalid boolean value"));

        let error = UserSetting::from_key_value("unknown_key", "true").unwrap_err();
        assert!(error.to_string().contains("Unknown setting key"));
    }

    #[test]
    fn defaults_are_disabled() {
        for key in SettingKey::ALL {
            let setting = key.default_setting();
            assert_eq!(setting.key(), key);
            assert_eq!(setting.value_to_string(), "false");
        }
    }

    #[test]
    fn serde_uses_key_value_shape() {
        let json = serde_json::to_string(&UserSetting::ExternalSearchEnabled(true)).unwrap();
        assert_eq!(json, r#"{"key":"enable_external_search","value":true}"#);

        let parsed: UserSetting =
            serde_json::from_str(r#"{"key":"enable_direct_downloads","value":false}"#).unwrap();
        assert_eq!(parsed, UserSetting::DirectDownloadsEnabled(false));
    }
}
