//! Component settings derived from [`Config`].

use super::Config;
use crate::client::ClientConfig;
use crate::exporter::{ExporterConfig, RetryConfig, TransportConfig};
use crate::sampler::SamplerConfig;

fn user_agent() -> String {
    concat!("rask-log-sampler/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Config {
    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            service_name: self.service_name.clone(),
            fallback_rate: self.fallback_sample_rate,
            max_pattern_cache_size: self.max_pattern_cache_size,
            signature_cache_size: self.signature_cache_size,
            policy_refresh_interval: self.policy_refresh_interval(),
            pattern_report_interval: self.pattern_report_interval(),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retries,
            base_delay: self.retry_base_delay(),
            max_delay: self.retry_max_delay(),
            jitter: self.retry_jitter,
        }
    }

    pub fn exporter_config(&self) -> ExporterConfig {
        ExporterConfig {
            batch_size: self.batch_size,
            flush_interval: self.flush_interval(),
            max_pending_batches: self.max_pending_batches,
            retry: self.retry_config(),
        }
    }

    /// `None` unless a control-plane URL is configured.
    pub fn client_config(&self) -> Option<ClientConfig> {
        let base_url = self.control_plane_url.clone()?;
        Some(ClientConfig {
            base_url,
            api_key: self.control_plane_api_key.clone(),
            timeout: self.request_timeout(),
            user_agent: user_agent(),
            ..ClientConfig::default()
        })
    }

    /// `None` unless export is fully configured.
    pub fn transport_config(&self) -> Option<TransportConfig> {
        Some(TransportConfig {
            endpoint: self.ingest_endpoint.clone()?,
            api_key: self.ingest_api_key.clone()?,
            team_id: self.team_id.clone()?,
            team_id_header: self.team_id_header.clone(),
            timeout: self.request_timeout(),
            user_agent: user_agent(),
        })
    }
}
