use super::{Config, ConfigError};
use url::Url;

fn check_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {field} '{value}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "{field} must use http or https, got '{}'",
            url.scheme()
        )));
    }
    Ok(())
}

fn require_positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidConfig(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "Service name must not be empty".to_string(),
            ));
        }

        if let Some(url) = &self.control_plane_url {
            check_http_url("control plane URL", url)?;
        }
        if let Some(endpoint) = &self.ingest_endpoint {
            check_http_url("ingest endpoint", endpoint)?;
        }

        if self.team_id_header.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "Team id header must not be empty".to_string(),
            ));
        }

        require_positive("Batch size", self.batch_size as u64)?;
        require_positive("Flush interval", self.flush_interval_ms)?;
        require_positive("Max retries", self.max_retries as u64)?;
        require_positive("Max pending batches", self.max_pending_batches as u64)?;
        require_positive("Request timeout", self.request_timeout_secs)?;
        require_positive("Policy refresh interval", self.policy_refresh_interval_secs)?;
        require_positive("Pattern report interval", self.pattern_report_interval_secs)?;
        require_positive("Pattern cache size", self.max_pattern_cache_size as u64)?;

        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ConfigError::InvalidConfig(format!(
                "Retry max delay ({} ms) must be at least the base delay ({} ms)",
                self.retry_max_delay_ms, self.retry_base_delay_ms
            )));
        }

        if !(0.0..=1.0).contains(&self.fallback_sample_rate) {
            return Err(ConfigError::InvalidConfig(format!(
                "Fallback sample rate must be within [0, 1], got {}",
                self.fallback_sample_rate
            )));
        }

        Ok(())
    }
}
