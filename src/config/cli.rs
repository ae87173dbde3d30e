use super::env_helpers::{load_env_enum, load_env_string, load_env_string_opt, load_env_var};
use super::{ConfigError, LogFormat, LogLevel};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable holding a complete TOML configuration.
pub const CONFIG_ENV_VAR: &str = "RASK_SAMPLER_CONFIG";

#[derive(Parser, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Name of the service emitting logs
    #[arg(long, env = "RASK_SERVICE_NAME")]
    pub service_name: String,

    /// Base URL of the sampling policy service (policies and pattern reports)
    #[arg(long, env = "RASK_CONTROL_PLANE_URL")]
    pub control_plane_url: Option<String>,

    /// API key for the policy service
    #[arg(long, env = "RASK_CONTROL_PLANE_API_KEY")]
    pub control_plane_api_key: Option<String>,

    /// OTLP/HTTP logs endpoint receiving kept events
    #[arg(long, env = "RASK_INGEST_ENDPOINT")]
    pub ingest_endpoint: Option<String>,

    /// Bearer token for the ingest endpoint
    #[arg(long, env = "RASK_INGEST_API_KEY")]
    pub ingest_api_key: Option<String>,

    /// Tenant identifier sent with every export request
    #[arg(long, env = "RASK_TEAM_ID")]
    pub team_id: Option<String>,

    /// Header carrying the tenant identifier
    #[arg(long, env = "RASK_TEAM_ID_HEADER", default_value = "X-Team-Id")]
    pub team_id_header: String,

    /// Number of events per export batch
    #[arg(long, env = "RASK_BATCH_SIZE", default_value = "100")]
    pub batch_size: usize,

    /// Flush interval in milliseconds
    #[arg(long, env = "RASK_FLUSH_INTERVAL_MS", default_value = "5000")]
    pub flush_interval_ms: u64,

    /// Send attempts per batch
    #[arg(long, env = "RASK_MAX_RETRIES", default_value = "3")]
    pub max_retries: u32,

    /// Base retry delay in milliseconds, doubled after each failed attempt
    #[arg(long, env = "RASK_RETRY_BASE_DELAY_MS", default_value = "1000")]
    pub retry_base_delay_ms: u64,

    /// Upper bound for a single retry delay in milliseconds
    #[arg(long, env = "RASK_RETRY_MAX_DELAY_MS", default_value = "30000")]
    pub retry_max_delay_ms: u64,

    /// Randomize retry delays by a factor in [0.5, 1.5)
    #[arg(long, env = "RASK_RETRY_JITTER")]
    pub retry_jitter: bool,

    /// Full batches allowed to wait for delivery; the live buffer holds as
    /// many again before new events are rejected
    #[arg(long, env = "RASK_MAX_PENDING_BATCHES", default_value = "16")]
    pub max_pending_batches: usize,

    /// HTTP request timeout in seconds
    #[arg(long, env = "RASK_REQUEST_TIMEOUT_SECS", default_value = "10")]
    pub request_timeout_secs: u64,

    /// Seconds between policy fetches
    #[arg(long, env = "RASK_POLICY_REFRESH_INTERVAL_SECS", default_value = "300")]
    pub policy_refresh_interval_secs: u64,

    /// Seconds between pattern reports
    #[arg(long, env = "RASK_PATTERN_REPORT_INTERVAL_SECS", default_value = "600")]
    pub pattern_report_interval_secs: u64,

    /// Sample rate used until a policy is loaded
    #[arg(long, env = "RASK_FALLBACK_SAMPLE_RATE", default_value = "1.0")]
    pub fallback_sample_rate: f64,

    /// Maximum number of distinct patterns tracked between reports
    #[arg(long, env = "RASK_MAX_PATTERN_CACHE_SIZE", default_value = "10000")]
    pub max_pattern_cache_size: usize,

    /// Recent messages whose signatures are memoized (0 disables the memo)
    #[arg(long, env = "RASK_SIGNATURE_CACHE_SIZE", default_value = "10000")]
    pub signature_cache_size: usize,

    /// Level of the library's own diagnostics
    #[arg(long, env = "RASK_LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Format of the library's own diagnostics
    #[arg(long, env = "RASK_LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            control_plane_url: None,
            control_plane_api_key: None,
            ingest_endpoint: None,
            ingest_api_key: None,
            team_id: None,
            team_id_header: "X-Team-Id".to_string(),
            batch_size: 100,
            flush_interval_ms: 5000,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            retry_jitter: false,
            max_pending_batches: 16,
            request_timeout_secs: 10,
            policy_refresh_interval_secs: 300,
            pattern_report_interval_secs: 600,
            fallback_sample_rate: 1.0,
            max_pattern_cache_size: 10_000,
            signature_cache_size: 10_000,
            log_level: LogLevel::Info,
            log_format: LogFormat::Compact,
        }
    }
}

impl Config {
    /// Defaults for everything but the service name.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::try_parse_from(args)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from [`CONFIG_ENV_VAR`] when set, otherwise from the individual
    /// `RASK_*` variables on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(toml_config) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_toml_str(&toml_config);
        }

        let mut config = Config::default();

        load_env_string("RASK_SERVICE_NAME", &mut config.service_name);
        load_env_string_opt("RASK_CONTROL_PLANE_URL", &mut config.control_plane_url);
        load_env_string_opt(
            "RASK_CONTROL_PLANE_API_KEY",
            &mut config.control_plane_api_key,
        );
        load_env_string_opt("RASK_INGEST_ENDPOINT", &mut config.ingest_endpoint);
        load_env_string_opt("RASK_INGEST_API_KEY", &mut config.ingest_api_key);
        load_env_string_opt("RASK_TEAM_ID", &mut config.team_id);
        load_env_string("RASK_TEAM_ID_HEADER", &mut config.team_id_header);
        load_env_var("RASK_BATCH_SIZE", &mut config.batch_size)?;
        load_env_var("RASK_FLUSH_INTERVAL_MS", &mut config.flush_interval_ms)?;
        load_env_var("RASK_MAX_RETRIES", &mut config.max_retries)?;
        load_env_var("RASK_RETRY_BASE_DELAY_MS", &mut config.retry_base_delay_ms)?;
        load_env_var("RASK_RETRY_MAX_DELAY_MS", &mut config.retry_max_delay_ms)?;
        load_env_var("RASK_RETRY_JITTER", &mut config.retry_jitter)?;
        load_env_var("RASK_MAX_PENDING_BATCHES", &mut config.max_pending_batches)?;
        load_env_var("RASK_REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs)?;
        load_env_var(
            "RASK_POLICY_REFRESH_INTERVAL_SECS",
            &mut config.policy_refresh_interval_secs,
        )?;
        load_env_var(
            "RASK_PATTERN_REPORT_INTERVAL_SECS",
            &mut config.pattern_report_interval_secs,
        )?;
        load_env_var("RASK_FALLBACK_SAMPLE_RATE", &mut config.fallback_sample_rate)?;
        load_env_var(
            "RASK_MAX_PATTERN_CACHE_SIZE",
            &mut config.max_pattern_cache_size,
        )?;
        load_env_var(
            "RASK_SIGNATURE_CACHE_SIZE",
            &mut config.signature_cache_size,
        )?;
        load_env_enum("RASK_LOG_LEVEL", &mut config.log_level)?;
        load_env_enum("RASK_LOG_FORMAT", &mut config.log_format)?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn policy_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.policy_refresh_interval_secs)
    }

    pub fn pattern_report_interval(&self) -> Duration {
        Duration::from_secs(self.pattern_report_interval_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    /// Export is enabled once an endpoint, an API key and a team are set.
    pub fn export_enabled(&self) -> bool {
        self.ingest_endpoint.is_some() && self.ingest_api_key.is_some() && self.team_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new("checkout");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.flush_interval(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.policy_refresh_interval(), Duration::from_secs(300));
        assert_eq!(config.pattern_report_interval(), Duration::from_secs(600));
        assert_eq!(config.retry_max_delay(), Duration::from_secs(30));
        assert_eq!(config.fallback_sample_rate, 1.0);
        assert!(!config.export_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_clap_defaults_match_default_impl() {
        let parsed = Config::from_args(["sampler", "--service-name", "checkout"]).unwrap();
        assert_eq!(parsed, Config::new("checkout"));
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            service_name = "billing"
            batch_size = 50
            ingest_endpoint = "https://ingest.example.com/v1/logs"
            ingest_api_key = "phc_test"
            team_id = "42"
            "#,
        )
        .unwrap();

        assert_eq!(config.service_name, "billing");
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_retries, 3);
        assert!(config.export_enabled());
    }
}
