//! Configuration for the activity logger.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::collector::controller::ControllerConfig;
use crate::distance::DisplayGeometry;
pub use crate::error::ConfigError;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the event log
    pub data_path: PathBuf,

    /// File name of the event log inside `data_path`
    pub log_file: String,

    /// Which input sources to capture
    pub sources: SourceConfig,

    /// How often queued events are written to the log
    #[serde(with = "duration_serde")]
    pub flush_interval: Duration,

    /// Minimum spacing between logged pointer movements
    #[serde(with = "duration_serde")]
    pub debounce_threshold: Duration,

    /// Display used to convert pixels to inches
    pub display: DisplayGeometry,

    /// Controller axis thresholds
    pub controller: ControllerConfig,

    /// How long a computed statistics snapshot is served before recomputing
    #[serde(with = "duration_serde")]
    pub cache_freshness: Duration,

    /// Window applied to `/data` when the request names none (`null` = all time)
    #[serde(with = "option_duration_serde")]
    pub default_window: Option<Duration>,

    /// Upper bound on a statistics recompute before stale data is served
    #[serde(with = "duration_serde")]
    pub recompute_timeout: Duration,

    /// Idle time after which a dashboard session is dropped
    #[serde(with = "duration_serde")]
    pub session_ttl: Duration,

    /// How often idle sessions are reaped
    #[serde(with = "duration_serde")]
    pub reap_interval: Duration,

    /// Dashboard HTTP server
    pub server: ServerSettings,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("activity-logger");

        Self {
            data_path: data_dir,
            log_file: "log.csv".to_string(),
            sources: SourceConfig::default(),
            flush_interval: Duration::from_secs(3),
            debounce_threshold: Duration::from_millis(1),
            display: DisplayGeometry::default(),
            controller: ControllerConfig::default(),
            cache_freshness: Duration::from_secs(60),
            default_window: Some(Duration::from_secs(24 * 60 * 60)),
            recompute_timeout: Duration::from_secs(10),
            session_ttl: Duration::from_secs(30 * 60),
            reap_interval: Duration::from_secs(60),
            server: ServerSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("activity-logger")
            .join("config.json")
    }

    /// Full path of the event log.
    pub fn log_path(&self) -> PathBuf {
        self.data_path.join(&self.log_file)
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.display.width_px == 0 || self.display.height_px == 0 {
            return invalid("display resolution must be non-zero");
        }
        if !(self.display.diagonal_in > 0.0) {
            return invalid("display diagonal must be positive");
        }
        if self.log_file.trim().is_empty() {
            return invalid("log_file must not be empty");
        }
        let in_unit_range = |v: f32| v > 0.0 && v <= 1.0;
        if !in_unit_range(self.controller.trigger_threshold)
            || !in_unit_range(self.controller.stick_deadzone)
        {
            return invalid("controller thresholds must be in (0, 1]");
        }
        if self.controller.hysteresis < 0.0
            || self.controller.hysteresis
                >= self
                    .controller
                    .trigger_threshold
                    .min(self.controller.stick_deadzone)
        {
            return invalid("controller hysteresis must be below both thresholds");
        }
        if self.session_ttl.is_zero() || self.reap_interval.is_zero() {
            return invalid("session_ttl and reap_interval must be non-zero");
        }
        if self.recompute_timeout.is_zero() {
            return invalid("recompute_timeout must be non-zero");
        }
        Ok(())
    }
}

/// Configuration for which input sources to capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub pointer: bool,
    pub keyboard: bool,
    pub controller: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            pointer: true,
            keyboard: true,
            controller: false,
        }
    }
}

impl SourceConfig {
    /// Parse source configuration from a comma-separated string.
    pub fn from_csv(s: &str) -> Self {
        let sources: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();
        let has = |names: &[&str]| {
            sources
                .iter()
                .any(|s| s == "all" || names.contains(&s.as_str()))
        };

        Self {
            pointer: has(&["pointer", "mouse"]),
            keyboard: has(&["keyboard"]),
            controller: has(&["controller", "gamepad"]),
        }
    }

    /// Check if at least one source is enabled.
    pub fn any_enabled(&self) -> bool {
        self.pointer || self.keyboard || self.controller
    }
}

/// Dashboard server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 6930,
        }
    }
}

/// Serde support for Duration as fractional seconds.
mod duration_serde {
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

/// Serde support for optional Duration; `null` means unset.
mod option_duration_serde {
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs_f64()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(D::Error::custom))
            .transpose()
    }
}
