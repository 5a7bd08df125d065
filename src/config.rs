use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::models::metrics::SourceKind;

const ENV_CONFIG_PATH: &str = "TRACKER_CONFIG";
const ENV_API_BASE_URL: &str = "TRACKER_API_BASE_URL";
const ENV_STREAM_URL: &str = "TRACKER_STREAM_URL";
const ENV_HTTP_TIMEOUT_SECS: &str = "TRACKER_HTTP_TIMEOUT_SECS";
const ENV_RECONNECT_DELAY_SECS: &str = "TRACKER_RECONNECT_DELAY_SECS";
const ENV_LOG_DIR: &str = "TRACKER_LOG_DIR";

pub const DEFAULT_SENSOR_TOPIC: &str = "/topic/sensor-data";

/// Fixed contribution of each source to the daily score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceWeights {
    pub tasks: f64,
    pub practice: f64,
    pub weight: f64,
    pub coding_practice: f64,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            tasks: 0.4,
            practice: 0.2,
            weight: 0.1,
            coding_practice: 0.3,
        }
    }
}

impl SourceWeights {
    pub fn weight_of(&self, kind: SourceKind) -> f64 {
        match kind {
            SourceKind::Tasks => self.tasks,
            SourceKind::Practice => self.practice,
            SourceKind::Weight => self.weight,
            SourceKind::CodingPractice => self.coding_practice,
        }
    }

    pub fn total(&self) -> f64 {
        SourceKind::ALL.iter().map(|kind| self.weight_of(*kind)).sum()
    }

    pub fn validate(&self) -> AppResult<()> {
        for kind in SourceKind::ALL {
            let value = self.weight_of(kind);
            if !value.is_finite() || value <= 0.0 {
                return Err(AppError::config(format!(
                    "weight for {kind} must be a positive number, got {value}"
                )));
            }
        }

        let total = self.total();
        if (total - 1.0).abs() > 1e-6 {
            // Scores are clamped, so this only skews the scale.
            warn!(target: "app::config", total, "source weights do not sum to 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardConfig {
    pub api_base_url: String,
    pub stream_url: String,
    pub sensor_topic: String,
    pub http_timeout_secs: u64,
    pub reconnect_delay_secs: u64,
    pub log_dir: PathBuf,
    pub weights: SourceWeights,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            stream_url: "ws://localhost:8080/ws/websocket".to_string(),
            sensor_topic: DEFAULT_SENSOR_TOPIC.to_string(),
            http_timeout_secs: 15,
            reconnect_delay_secs: 5,
            log_dir: PathBuf::from("logs"),
            weights: SourceWeights::default(),
        }
    }
}

impl DashboardConfig {
    /// Defaults, then the YAML file named by `TRACKER_CONFIG`, then individual env overrides.
    pub fn load() -> AppResult<Self> {
        let mut config = match std::env::var(ENV_CONFIG_PATH) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        debug!(
            target: "app::config",
            api_base_url = %config.api_base_url,
            stream_url = %config.stream_url,
            "configuration loaded"
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::config(format!("cannot read config file {}: {err}", path.display()))
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> AppResult<()> {
        if let Some(value) = non_empty_env(ENV_API_BASE_URL) {
            self.api_base_url = value;
        }
        if let Some(value) = non_empty_env(ENV_STREAM_URL) {
            self.stream_url = value;
        }
        if let Some(value) = non_empty_env(ENV_HTTP_TIMEOUT_SECS) {
            self.http_timeout_secs = parse_secs(ENV_HTTP_TIMEOUT_SECS, &value)?;
        }
        if let Some(value) = non_empty_env(ENV_RECONNECT_DELAY_SECS) {
            self.reconnect_delay_secs = parse_secs(ENV_RECONNECT_DELAY_SECS, &value)?;
        }
        if let Some(value) = non_empty_env(ENV_LOG_DIR) {
            self.log_dir = PathBuf::from(value);
        }
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(AppError::config("apiBaseUrl must not be empty"));
        }
        if self.stream_url.trim().is_empty() {
            return Err(AppError::config("streamUrl must not be empty"));
        }
        if self.sensor_topic.trim().is_empty() {
            return Err(AppError::config("sensorTopic must not be empty"));
        }
        if self.http_timeout_secs == 0 {
            return Err(AppError::config("httpTimeoutSecs must be greater than zero"));
        }
        if self.reconnect_delay_secs == 0 {
            return Err(AppError::config(
                "reconnectDelaySecs must be greater than zero",
            ));
        }
        self.weights.validate()
    }

    pub fn http_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.http_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> StdDuration {
        StdDuration::from_secs(self.reconnect_delay_secs)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_secs(key: &str, value: &str) -> AppResult<u64> {
    value
        .parse::<u64>()
        .map_err(|err| AppError::config(format!("{key} must be a whole number of seconds: {err}")))
}
