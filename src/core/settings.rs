use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::models::notification::NotificationType;
use crate::core::thresholds::Thresholds;

pub const DEFAULT_REFRESH_SECS: i64 = 300;
pub const DEFAULT_COOLDOWN_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationToggles {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub session_low: bool,
    #[serde(default = "default_true")]
    pub session_high: bool,
    #[serde(default = "default_true")]
    pub weekly_low: bool,
    #[serde(default = "default_true")]
    pub weekly_high: bool,
    #[serde(default = "default_true")]
    pub session_ready: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NotificationToggles {
    fn default() -> Self {
        Self {
            enabled: true,
            session_low: true,
            session_high: true,
            weekly_low: true,
            weekly_high: true,
            session_ready: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThresholdValues {
    #[serde(default = "default_low")]
    pub low: f64,
    #[serde(default = "default_high")]
    pub high: f64,
}

fn default_low() -> f64 {
    0.75
}
fn default_high() -> f64 {
    0.90
}

impl Default for ThresholdValues {
    fn default() -> Self {
        Self { low: default_low(), high: default_high() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Seconds between polls. Non-positive values fall back to the default.
    #[serde(default = "default_refresh")]
    pub refresh_interval_secs: i64,
    /// Issue a wake ping when a session resets (providers that support it).
    #[serde(default)]
    pub auto_wake: bool,
    /// Minimum seconds between two notifications of the same account/type.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub notifications: NotificationToggles,
    #[serde(default)]
    pub thresholds: ThresholdValues,
}

fn default_refresh() -> i64 {
    DEFAULT_REFRESH_SECS
}
fn default_cooldown() -> u64 {
    DEFAULT_COOLDOWN_SECS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DEFAULT_REFRESH_SECS,
            auto_wake: false,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            notifications: NotificationToggles::default(),
            thresholds: ThresholdValues::default(),
        }
    }
}

/// Settings handle shared across sessions; written only from the serial
/// configuration path, read on every tick.
pub type SharedSettings = Arc<RwLock<Settings>>;

impl Settings {
    /// Get the config file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("quotabar").join("config.toml")
    }

    /// Load settings from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Serialize and write these settings to the config file path.
    pub fn save(&self) -> Result<PathBuf, std::io::Error> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    pub fn shared(self) -> SharedSettings {
        Arc::new(RwLock::new(self))
    }

    /// Effective poll interval: configured value, or the default when the
    /// configured value is not positive.
    pub fn refresh_interval(&self) -> Duration {
        let secs = if self.refresh_interval_secs > 0 {
            self.refresh_interval_secs
        } else {
            DEFAULT_REFRESH_SECS
        };
        Duration::from_secs(secs as u64)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn threshold_pair(&self) -> Thresholds {
        Thresholds {
            low: self.thresholds.low,
            high: self.thresholds.high,
        }
    }

    /// Master toggle AND the per-type toggle.
    pub fn should_send(&self, kind: NotificationType) -> bool {
        if !self.notifications.enabled {
            return false;
        }
        match kind {
            NotificationType::SessionLow => self.notifications.session_low,
            NotificationType::SessionHigh => self.notifications.session_high,
            NotificationType::WeeklyLow => self.notifications.weekly_low,
            NotificationType::WeeklyHigh => self.notifications.weekly_high,
            NotificationType::SessionReady => self.notifications.session_ready,
        }
    }

    /// Validate the settings
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.low) || !(0.0..=1.0).contains(&t.high) {
            issues.push(format!(
                "Thresholds must be fractions in [0, 1], got {}/{}",
                t.low, t.high
            ));
        }
        if t.low >= t.high {
            issues.push(format!(
                "Threshold order is low-then-high, got {} >= {}",
                t.low, t.high
            ));
        }
        if self.refresh_interval_secs <= 0 {
            issues.push(format!(
                "refresh_interval_secs {} is not positive; the default ({}) will be used",
                self.refresh_interval_secs, DEFAULT_REFRESH_SECS
            ));
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = Settings::default();
        let issues = settings.validate();
        assert!(issues.is_empty(), "Default settings should be valid, got: {:?}", issues);
    }

    #[test]
    fn refresh_interval_falls_back_on_non_positive() {
        let mut settings = Settings::default();
        settings.refresh_interval_secs = 0;
        assert_eq!(settings.refresh_interval(), Duration::from_secs(300));
        settings.refresh_interval_secs = -5;
        assert_eq!(settings.refresh_interval(), Duration::from_secs(300));
        settings.refresh_interval_secs = 60;
        assert_eq!(settings.refresh_interval(), Duration::from_secs(60));
    }

    #[test]
    fn master_toggle_overrides_per_type() {
        let mut settings = Settings::default();
        assert!(settings.should_send(NotificationType::SessionLow));
        settings.notifications.enabled = false;
        for kind in NotificationType::all() {
            assert!(!settings.should_send(*kind));
        }
    }

    #[test]
    fn per_type_toggle_is_independent() {
        let mut settings = Settings::default();
        settings.notifications.session_ready = false;
        assert!(!settings.should_send(NotificationType::SessionReady));
        assert!(settings.should_send(NotificationType::SessionHigh));
    }

    #[test]
    fn validate_catches_misordered_thresholds() {
        let mut settings = Settings::default();
        settings.thresholds = ThresholdValues { low: 0.9, high: 0.75 };
        let issues = settings.validate();
        assert!(issues.iter().any(|i| i.contains("low-then-high")));
    }

    #[test]
    fn validate_catches_out_of_range_thresholds() {
        let mut settings = Settings::default();
        settings.thresholds = ThresholdValues { low: 0.75, high: 1.5 };
        let issues = settings.validate();
        assert!(issues.iter().any(|i| i.contains("[0, 1]")));
    }

    #[test]
    fn parse_minimal_toml_gives_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.refresh_interval_secs, 300);
        assert_eq!(settings.cooldown_secs, 300);
        assert!(!settings.auto_wake);
        assert!(settings.notifications.enabled);
        assert!((settings.thresholds.low - 0.75).abs() < 1e-10);
        assert!((settings.thresholds.high - 0.90).abs() < 1e-10);
    }

    #[test]
    fn parse_partial_toml() {
        let toml = r#"
refresh_interval_secs = 120
auto_wake = true

[notifications]
weekly_low = false

[thresholds]
low = 0.5
"#;
        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.refresh_interval_secs, 120);
        assert!(settings.auto_wake);
        assert!(!settings.notifications.weekly_low);
        assert!(settings.notifications.weekly_high);
        assert!((settings.thresholds.low - 0.5).abs() < 1e-10);
        assert!((settings.thresholds.high - 0.90).abs() < 1e-10);
    }

    #[test]
    fn toml_round_trip() {
        let mut settings = Settings::default();
        settings.auto_wake = true;
        settings.cooldown_secs = 120;
        let text = toml::to_string_pretty(&settings).unwrap();
        let back: Settings = toml::from_str(&text).unwrap();
        assert!(back.auto_wake);
        assert_eq!(back.cooldown_secs, 120);
    }
}
