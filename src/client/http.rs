use super::{ClientError, ControlPlane};
use crate::sampler::{PatternStats, SamplingPolicy};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, RequestBuilder, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

const POLICIES_PATH: [&str; 3] = ["api", "v1", "policies"];
const PATTERN_STATS_PATH: [&str; 4] = ["api", "v1", "patterns", "stats"];

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(5),
            user_agent: concat!("rask-log-sampler/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time: Duration,
}

#[derive(Debug, Default)]
pub struct ClientStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_response_time: AtomicU64,
}

impl ClientStats {
    pub fn record_request(&self, success: bool, response_time: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time
            .fetch_add(response_time.as_millis() as u64, Ordering::Relaxed);

        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> RequestStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_response_time = self.total_response_time.load(Ordering::Relaxed);

        let average_response_time = if total_requests > 0 {
            Duration::from_millis(total_response_time / total_requests)
        } else {
            Duration::ZERO
        };

        RequestStats {
            total_requests,
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            average_response_time,
        }
    }
}

#[derive(Serialize)]
struct PatternReport<'a> {
    service_name: &'a str,
    patterns: &'a [PatternStats],
}

/// HTTP client for the policy service.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: Client,
    config: ClientConfig,
    base_url: Url,
    stats: Arc<ClientStats>,
}

impl HttpControlPlane {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let base_url: Url = config
            .base_url
            .parse()
            .map_err(|e| ClientError::InvalidConfiguration(format!("Invalid base URL: {e}")))?;

        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidConfiguration(format!(
                "Base URL cannot carry a path: {base_url}"
            )));
        }

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                ClientError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            config,
            base_url,
            stats: Arc::new(ClientStats::default()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn request_stats(&self) -> RequestStats {
        self.stats.snapshot()
    }

    fn url_for<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new(), so this always succeeds
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn map_send_error(&self, error: reqwest::Error) -> ClientError {
        if error.is_timeout() {
            ClientError::RequestTimeout(format!(
                "No response from {} within {:?}",
                self.base_url, self.config.timeout
            ))
        } else {
            ClientError::NetworkError(error)
        }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn fetch_active_policy(
        &self,
        service_name: &str,
    ) -> Result<Option<SamplingPolicy>, ClientError> {
        let url = self.url_for(POLICIES_PATH.into_iter().chain([service_name]));
        let start = Instant::now();

        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| {
                self.stats.record_request(false, start.elapsed());
                self.map_send_error(e)
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            self.stats.record_request(true, start.elapsed());
            info!("No sampling policy published for {}", service_name);
            return Ok(None);
        }

        if !status.is_success() {
            self.stats.record_request(false, start.elapsed());
            return Err(ClientError::HttpError {
                status: status.as_u16(),
                message: format!("Policy fetch failed: {status}"),
            });
        }

        let policy: SamplingPolicy = response.json().await.map_err(|e| {
            self.stats.record_request(false, start.elapsed());
            ClientError::InvalidPolicy(e.to_string())
        })?;
        self.stats.record_request(true, start.elapsed());

        policy
            .validate()
            .map_err(|e| ClientError::InvalidPolicy(e.to_string()))?;

        debug!(
            "Fetched policy v{} for {} in {:?}",
            policy.version,
            service_name,
            start.elapsed()
        );
        Ok(Some(policy))
    }

    async fn report_patterns(
        &self,
        service_name: &str,
        patterns: &[PatternStats],
    ) -> Result<(), ClientError> {
        if patterns.is_empty() {
            return Ok(());
        }

        let url = self.url_for(PATTERN_STATS_PATH);
        let payload = PatternReport {
            service_name,
            patterns,
        };
        let start = Instant::now();

        let response = self
            .authorize(self.client.post(url).json(&payload))
            .send()
            .await
            .map_err(|e| {
                self.stats.record_request(false, start.elapsed());
                self.map_send_error(e)
            })?;

        let status = response.status();
        let success = status.is_success();
        self.stats.record_request(success, start.elapsed());

        if !success {
            warn!("Pattern report rejected with HTTP {}", status);
            return Err(ClientError::HttpError {
                status: status.as_u16(),
                message: format!("Pattern report failed: {status}"),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_base_url() {
        let config = ClientConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            HttpControlPlane::new(config),
            Err(ClientError::InvalidConfiguration(_))
        ));

        let config = ClientConfig {
            base_url: "mailto:ops@example.com".to_string(),
            ..Default::default()
        };
        assert!(HttpControlPlane::new(config).is_err());
    }

    #[test]
    fn test_url_building() {
        let config = ClientConfig {
            base_url: "http://policies.internal:8000/base/".to_string(),
            ..Default::default()
        };
        let client = HttpControlPlane::new(config).unwrap();

        let url = client.url_for(POLICIES_PATH.into_iter().chain(["checkout api"]));
        assert_eq!(
            url.as_str(),
            "http://policies.internal:8000/base/api/v1/policies/checkout%20api"
        );
        assert_eq!(
            client.url_for(PATTERN_STATS_PATH).path(),
            "/base/api/v1/patterns/stats"
        );
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = ClientStats::default();
        stats.record_request(true, Duration::from_millis(10));
        stats.record_request(false, Duration::from_millis(30));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.successful_requests, 1);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.average_response_time, Duration::from_millis(20));
    }
}
