//! # Client configuration — `dailytrack.toml`
//!
//! Defines the TOML file that tunes the offline cache and the calendar widgets
//! (filename: [`DailyTrackConfig::filename`] = `"dailytrack.toml"`).
//!
//! ## Structure
//!
//! ```toml
//! [sync]
//! auto_sync_interval_secs = 30   # 0 to disable periodic passes
//! sync_on_reconnect = true       # run a pass when the network comes back
//!
//! [calendar]
//! show_holidays = true
//! ```
//!
//! All structs derive `Default` with the production defaults, so a missing or
//! empty file is equivalent to the default configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration stored in `dailytrack.toml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyTrackConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
}

/// Sync configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Periodic reconciliation interval in seconds. 0 disables it.
    #[serde(default = "default_auto_sync_interval")]
    pub auto_sync_interval_secs: u32,
    /// Run a reconciliation pass on every offline → online transition.
    #[serde(default = "default_true")]
    pub sync_on_reconnect: bool,
}

fn default_auto_sync_interval() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync_interval_secs: default_auto_sync_interval(),
            sync_on_reconnect: default_true(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Option<Duration> {
        match self.auto_sync_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(u64::from(secs))),
        }
    }
}

/// Calendar widget configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_true")]
    pub show_holidays: bool,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            show_holidays: default_true(),
        }
    }
}

impl DailyTrackConfig {
    /// Builder method to set the periodic sync interval.
    pub fn with_sync_interval(mut self, secs: u32) -> Self {
        self.sync.auto_sync_interval_secs = secs;
        self
    }

    /// Builder method to toggle the reconnect pass.
    pub fn with_sync_on_reconnect(mut self, enabled: bool) -> Self {
        self.sync.sync_on_reconnect = enabled;
        self
    }

    /// The well-known filename for the config file.
    pub fn filename() -> &'static str {
        "dailytrack.toml"
    }

    /// Parse from TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        let config = DailyTrackConfig::from_toml("").unwrap();
        assert_eq!(config, DailyTrackConfig::default());
        assert_eq!(config.sync.auto_sync_interval_secs, 30);
        assert!(config.sync.sync_on_reconnect);
        assert!(config.calendar.show_holidays);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = DailyTrackConfig::from_toml("[sync]\nsync_on_reconnect = false\n").unwrap();
        assert!(!config.sync.sync_on_reconnect);
        assert_eq!(config.sync.interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_interval_disables_periodic_sync() {
        let config = DailyTrackConfig::default().with_sync_interval(0);
        assert_eq!(config.sync.interval(), None);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = DailyTrackConfig::default()
            .with_sync_interval(120)
            .with_sync_on_reconnect(false);
        let text = config.to_toml().unwrap();
        assert_eq!(DailyTrackConfig::from_toml(&text).unwrap(), config);
    }
}
