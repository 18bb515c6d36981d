//! Configuration for PixelPulse.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collector endpoint; derived from the page when unset
    pub endpoint: Option<String>,

    /// Project token sent with every event
    pub token: Option<String>,

    /// Path for storing transparency stats
    pub data_path: PathBuf,

    /// Detector timings and limits
    pub sensors: SensorThresholds,

    /// Insight heuristic thresholds
    pub insights: InsightThresholds,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pixelpulse");

        Self {
            endpoint: None,
            token: None,
            data_path: data_dir,
            sensors: SensorThresholds::default(),
            insights: InsightThresholds::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a file, falling back to defaults if absent.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pixelpulse")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }
}

/// Timings and limits used by the page sensors.
///
/// The defaults are load-bearing for rage-click and drop-off detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorThresholds {
    /// Maximum gap between clicks of one burst
    #[serde(with = "duration_ms_serde")]
    pub rage_window: Duration,
    /// Maximum per-axis pointer drift within a burst, in pixels
    pub rage_radius_px: f64,
    /// Clicks that make a burst a rage click
    pub rage_click_count: u32,
    /// Quiet period before scroll depth is measured
    #[serde(with = "duration_ms_serde")]
    pub scroll_debounce: Duration,
    /// Scroll-depth milestones in percent, ascending
    pub depth_milestones: Vec<u32>,
    /// Time after focus-out before a field counts as abandoned
    #[serde(with = "duration_ms_serde")]
    pub dropoff_timeout: Duration,
    /// Interval of the soft-navigation location check
    #[serde(with = "duration_ms_serde")]
    pub location_poll_interval: Duration,
    /// Time a click has to produce navigation
    #[serde(with = "duration_ms_serde")]
    pub no_response_timeout: Duration,
    /// Long tasks above this are reported
    #[serde(with = "duration_ms_serde")]
    pub long_task_threshold: Duration,
    /// Resource loads above this are reported
    #[serde(with = "duration_ms_serde")]
    pub slow_resource_threshold: Duration,
    /// Maximum characters of an error stack
    pub max_stack_chars: usize,
}

impl Default for SensorThresholds {
    fn default() -> Self {
        Self {
            rage_window: Duration::from_millis(700),
            rage_radius_px: 10.0,
            rage_click_count: 4,
            scroll_debounce: Duration::from_millis(100),
            depth_milestones: vec![50, 75, 100],
            dropoff_timeout: Duration::from_millis(2000),
            location_poll_interval: Duration::from_millis(1000),
            no_response_timeout: Duration::from_millis(2000),
            long_task_threshold: Duration::from_millis(200),
            slow_resource_threshold: Duration::from_millis(3000),
            max_stack_chars: 500,
        }
    }
}

/// Thresholds for the insight heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightThresholds {
    pub rage_min_events: usize,
    pub rage_high_above: usize,
    pub jserr_min_events: usize,
    /// Error-rate percentages
    pub jserr_critical_rate: f64,
    pub jserr_high_rate: f64,
    /// Length of the current and prior drop-off windows
    pub dropoff_window_days: i64,
    /// Percent increase over the prior window
    pub dropoff_spike_increase: f64,
    pub dropoff_high_increase: f64,
    pub dropoff_min_count: usize,
    pub broken_flow_min_events: usize,
    pub broken_flow_high_above: usize,
    pub slow_min_events: usize,
    /// Mean duration in milliseconds
    pub slow_high_mean_ms: f64,
    pub depth_min_events: usize,
    /// Completion percentage below which scrolling is flagged
    pub depth_low_completion: f64,
}

impl Default for InsightThresholds {
    fn default() -> Self {
        Self {
            rage_min_events: 5,
            rage_high_above: 20,
            jserr_min_events: 5,
            jserr_critical_rate: 20.0,
            jserr_high_rate: 10.0,
            dropoff_window_days: 7,
            dropoff_spike_increase: 200.0,
            dropoff_high_increase: 300.0,
            dropoff_min_count: 10,
            broken_flow_min_events: 5,
            broken_flow_high_above: 15,
            slow_min_events: 5,
            slow_high_mean_ms: 1000.0,
            depth_min_events: 20,
            depth_low_completion: 30.0,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as milliseconds.
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Milliseconds of a duration on the page clock.
pub(crate) fn millis(duration: Duration) -> i64 {
    duration.as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.endpoint.is_none());
        assert_eq!(config.sensors.rage_window, Duration::from_millis(700));
        assert_eq!(config.sensors.depth_milestones, vec![50, 75, 100]);
        assert_eq!(config.insights.rage_min_events, 5);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let json = r#"{ "token": "proj_123", "sensors": { "dropoff_timeout": 5000 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.token.as_deref(), Some("proj_123"));
        assert_eq!(config.sensors.dropoff_timeout, Duration::from_millis(5000));
        assert_eq!(config.sensors.rage_click_count, 4);
        assert_eq!(config.insights.depth_min_events, 20);
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let value = serde_json::to_value(SensorThresholds::default()).unwrap();
        assert_eq!(value["rage_window"], 700);
        assert_eq!(value["slow_resource_threshold"], 3000);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("pixelpulse-no-such-config.json");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.sensors, SensorThresholds::default());
    }
}
