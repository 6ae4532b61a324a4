pub mod error;

pub use error::ConfigError;

use crate::channel::ReconnectPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "AGENTDECK_CONFIG";
pub const ENV_API_BASE: &str = "AGENTDECK_API_BASE";
pub const ENV_EVENTS_BASE: &str = "AGENTDECK_EVENTS_BASE";

fn default_api_base() -> String {
    "http://127.0.0.1:8080/api".to_string()
}

fn default_events_base() -> String {
    "ws://127.0.0.1:8080/ws/events".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_roster_interval_ms() -> u64 {
    5000
}

fn default_reconnect_base_ms() -> u64 {
    1000
}

fn default_reconnect_max_attempts() -> u32 {
    5
}

/// Dashboard configuration. The only externally supplied values the core
/// needs are the two base locations; everything else has the timing
/// defaults of the original dashboard.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_events_base")]
    pub events_base: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_roster_interval_ms")]
    pub roster_interval_ms: u64,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    /// Diagnostics log root. No dashboard state is persisted here.
    #[serde(default)]
    pub state_root: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            events_base: default_events_base(),
            poll_interval_ms: default_poll_interval_ms(),
            roster_interval_ms: default_roster_interval_ms(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            state_root: default_state_root(),
        }
    }
}

pub fn default_state_root() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".agentdeck"))
}

pub fn default_config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(ENV_CONFIG_PATH) {
        return Some(PathBuf::from(path));
    }
    default_state_root().map(|root| root.join("settings.yaml"))
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut settings: Settings =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        if settings.state_root.is_none() {
            settings.state_root = default_state_root();
        }
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Loads the settings file when present, falls back to defaults when it
    /// is not. Env overrides apply either way.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = match default_config_path() {
            Some(path) if path.exists() => return Self::from_path(&path),
            _ => Settings::default(),
        };
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(ENV_API_BASE) {
            if !value.trim().is_empty() {
                self.api_base = value;
            }
        }
        if let Ok(value) = std::env::var(ENV_EVENTS_BASE) {
            if !value.trim().is_empty() {
                self.events_base = value;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(ConfigError::Settings(format!(
                "api_base must be an http(s) location, got `{}`",
                self.api_base
            )));
        }
        if !self.events_base.starts_with("ws://") && !self.events_base.starts_with("wss://") {
            return Err(ConfigError::Settings(format!(
                "events_base must be a ws(s) location, got `{}`",
                self.events_base
            )));
        }
        if self.poll_interval_ms == 0 || self.roster_interval_ms == 0 {
            return Err(ConfigError::Settings(
                "poll_interval_ms and roster_interval_ms must be positive".to_string(),
            ));
        }
        if self.reconnect_base_ms == 0 {
            return Err(ConfigError::Settings(
                "reconnect_base_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn roster_interval(&self) -> Duration {
        Duration::from_millis(self.roster_interval_ms)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base: Duration::from_millis(self.reconnect_base_ms),
            max_attempts: self.reconnect_max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_original_dashboard_timings() {
        let settings = Settings {
            state_root: None,
            ..Settings::default()
        };
        assert_eq!(settings.poll_interval(), Duration::from_millis(2000));
        assert_eq!(settings.roster_interval(), Duration::from_millis(5000));
        let policy = settings.reconnect_policy();
        assert_eq!(policy.base, Duration::from_millis(1000));
        assert_eq!(policy.max_attempts, 5);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn settings_file_overrides_defaults_and_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "api_base: http://engine.internal:9000/api").unwrap();
        writeln!(file, "events_base: ws://engine.internal:9000/ws/events").unwrap();
        writeln!(file, "poll_interval_ms: 500").unwrap();
        drop(file);

        let settings = Settings::from_path(&path).unwrap();
        assert_eq!(settings.api_base, "http://engine.internal:9000/api");
        assert_eq!(settings.poll_interval_ms, 500);
        assert_eq!(settings.roster_interval_ms, 5000);
    }

    #[test]
    fn non_http_api_base_is_rejected() {
        let settings = Settings {
            api_base: "ftp://nope".to_string(),
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("api_base"));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let settings = Settings {
            poll_interval_ms: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
