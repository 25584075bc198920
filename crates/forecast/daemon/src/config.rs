//! Configuration for the forecast daemon

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use forecast_engine::EngineConfig;
use forecast_publish::RetryPolicy;
use forecast_types::topics::{DEFAULT_METHOD, DEFAULT_TOPIC_PREFIX};
use forecast_types::TopicLayout;
use serde::{Deserialize, Serialize};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Message broker bridge
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Forecasting configuration
    #[serde(default)]
    pub forecasting: ForecastingConfig,

    /// Forecast publication
    #[serde(default)]
    pub publication: PublicationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            enable_cors: true,
        }
    }
}

/// Broker bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Base URL of the HTTP bridge. Unset keeps all traffic in process.
    #[serde(default)]
    pub url: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_broker_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: None,
            request_timeout_secs: default_broker_timeout(),
        }
    }
}

/// Forecasting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastingConfig {
    /// Forecasting method implemented by this process
    #[serde(default = "default_method")]
    pub method: String,

    /// Prefix shared by every bus address
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Properties file shared with the forecasting executable
    #[serde(default = "default_properties_path")]
    pub properties_path: PathBuf,

    /// Directory holding `{application}_{metric}.csv` data files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory the component-state marker file is written to
    #[serde(default = "default_liveness_dir")]
    pub liveness_dir: PathBuf,

    /// Seconds between outbound liveness signals
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval_secs: u64,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for ForecastingConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            topic_prefix: default_topic_prefix(),
            properties_path: default_properties_path(),
            data_dir: default_data_dir(),
            liveness_dir: default_liveness_dir(),
            liveness_interval_secs: default_liveness_interval(),
            engine: EngineConfig::default(),
        }
    }
}

impl ForecastingConfig {
    pub fn topics(&self) -> TopicLayout {
        TopicLayout::new(self.topic_prefix.clone(), self.method.clone())
    }
}

/// Publication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicationConfig {
    /// Retry schedule for failed deliveries
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_broker_timeout() -> u64 {
    10
}

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

fn default_topic_prefix() -> String {
    DEFAULT_TOPIC_PREFIX.to_string()
}

fn default_properties_path() -> PathBuf {
    PathBuf::from("prediction.properties")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_liveness_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_liveness_interval() -> u64 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Environment variables, e.g. FORECAST_BROKER__URL
        builder = builder.add_source(
            config::Environment::with_prefix("FORECAST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert!(config.broker.url.is_none());
        assert_eq!(config.forecasting.method, "exponentialsmoothing");
        assert_eq!(config.forecasting.liveness_interval_secs, 1);
        assert_eq!(config.forecasting.engine.batch_depth, 8);
        assert!(config.publication.retry.max_attempts.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forecastd.toml");
        std::fs::write(
            &path,
            r#"
[broker]
url = "http://broker:8080"

[forecasting]
method = "arima"
data_dir = "/var/lib/forecast"

[forecasting.engine.executable]
timeout_secs = 120

[publication.retry]
max_attempts = 5
"#,
        )
        .unwrap();

        let config = DaemonConfig::load(path.to_str()).unwrap();
        assert_eq!(config.broker.url.as_deref(), Some("http://broker:8080"));
        assert_eq!(config.forecasting.method, "arima");
        assert_eq!(config.forecasting.data_dir, PathBuf::from("/var/lib/forecast"));
        assert_eq!(config.forecasting.engine.executable.timeout_secs, Some(120));
        assert_eq!(config.forecasting.engine.executable.program, "Rscript");
        assert_eq!(config.publication.retry.max_attempts, Some(5));
        assert_eq!(
            config.forecasting.topics().start_forecasting(),
            "eu.nebulouscloud.forecasting.start_forecasting.arima"
        );
    }
}
