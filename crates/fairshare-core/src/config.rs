//! Configuration types for fairshare

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::queue::QueueSpec;

/// Default trailing window for usage aggregation (one week)
pub const DEFAULT_WINDOW_SIZE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_STALENESS_PERIOD: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// API server configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Usage database; time-aware fairness is disabled when absent
    #[serde(default)]
    pub usage_db: Option<UsageDbConfig>,
    /// Queue desired state
    #[serde(default)]
    pub queues: Vec<QueueSpec>,
}

impl DaemonConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::FairshareError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::FairshareError::Config(format!("Failed to read config file: {}", e))
        })?;
        toml::from_str(&content)
            .map_err(|e| crate::FairshareError::Config(format!("Failed to parse config: {}", e)))
    }
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind the REST API server
    pub rest_address: String,
    /// Port for the REST API server
    pub rest_port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            rest_address: "0.0.0.0".to_string(),
            rest_port: 9090,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Usage database client selection and tuning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageDbConfig {
    /// Source discriminator ("prometheus", "fake", "fake-with-history")
    #[serde(default)]
    pub client_type: String,
    /// Literal connection string
    #[serde(default)]
    pub connection_string: String,
    /// Name of an environment variable holding the connection string
    #[serde(default)]
    pub connection_string_env_var: String,
    #[serde(default)]
    pub usage_params: UsageParams,
}

/// Aggregation window kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    /// Non-overlapping fixed-size windows, e.g. 0-1h, 1-2h, 2-3h
    Tumbling,
    /// Overlapping trailing window ending now
    Sliding,
}

impl std::fmt::Display for WindowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowType::Tumbling => write!(f, "tumbling"),
            WindowType::Sliding => write!(f, "sliding"),
        }
    }
}

/// Parameters for fetching and aggregating historical usage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageParams {
    /// Half-life of the usage decay; unset means one sample
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub half_life_period: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub window_size: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_type: Option<WindowType>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub fetch_interval: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub staleness_period: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub wait_timeout: Option<Duration>,
    /// Source-specific tuning (metric names, query resolution, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra_params: HashMap<String, String>,
}

impl UsageParams {
    /// Fill unset fields and clamp the staleness period to at least the fetch interval
    pub fn set_defaults(&mut self) {
        self.window_size.get_or_insert(DEFAULT_WINDOW_SIZE);
        self.window_type.get_or_insert(WindowType::Sliding);
        let fetch_interval = *self.fetch_interval.get_or_insert(DEFAULT_FETCH_INTERVAL);
        let staleness_period = self.staleness_period.get_or_insert(DEFAULT_STALENESS_PERIOD);
        if *staleness_period < fetch_interval {
            debug!(
                staleness_period = ?staleness_period,
                fetch_interval = ?fetch_interval,
                "Staleness period shorter than fetch interval, clamping"
            );
            *staleness_period = fetch_interval;
        }
        self.wait_timeout.get_or_insert(DEFAULT_WAIT_TIMEOUT);
    }

    /// Copy of these params with defaults applied
    pub fn with_defaults(&self) -> Self {
        let mut params = self.clone();
        params.set_defaults();
        params
    }

    pub fn window_size_or_default(&self) -> Duration {
        self.window_size.unwrap_or(DEFAULT_WINDOW_SIZE)
    }

    pub fn window_type_or_default(&self) -> WindowType {
        self.window_type.unwrap_or(WindowType::Sliding)
    }

    /// Duration extra param, falling back to `default` when missing or unparsable
    pub fn extra_duration_param_or_default(&self, key: &str, default: Duration) -> Duration {
        self.extra_params
            .get(key)
            .and_then(|value| humantime::parse_duration(value).ok())
            .unwrap_or(default)
    }

    /// String extra param, falling back to `default` when missing
    pub fn extra_string_param_or_default(&self, key: &str, default: &str) -> String {
        self.extra_params
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }
}
