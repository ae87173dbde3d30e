use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, ClientBuilder};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid transport configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Endpoint rejected batch with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status_code: u16,
    pub latency: Duration,
}

/// Delivers one encoded OTLP request body.
///
/// Any `Err` counts as a failed attempt and is retried by the exporter.
/// [`HttpTransport`] fails on HTTP status 400 and above.
#[async_trait]
pub trait LogTransport: Send + Sync {
    async fn send(&self, payload: Bytes) -> Result<TransportResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub endpoint: String,
    pub api_key: String,
    pub team_id: String,
    pub team_id_header: String,
    pub timeout: Duration,
    pub user_agent: String,
}

/// OTLP/HTTP transport using protobuf bodies.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    headers: HeaderMap,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let endpoint: Url = config.endpoint.parse().map_err(|e| {
            TransportError::InvalidConfiguration(format!(
                "Invalid ingest endpoint '{}': {e}",
                config.endpoint
            ))
        })?;

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                TransportError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint,
            headers: build_headers(config)?,
            timeout: config.timeout,
        })
    }
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|e| TransportError::InvalidHeaderValue(format!("Invalid {what}: {e}")))
}

pub fn build_headers(config: &TransportConfig) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();

    headers.insert(CONTENT_TYPE, HeaderValue::from_static(PROTOBUF_CONTENT_TYPE));
    headers.insert(
        AUTHORIZATION,
        header_value(&format!("Bearer {}", config.api_key), "API key")?,
    );

    let team_header = HeaderName::from_bytes(config.team_id_header.as_bytes()).map_err(|e| {
        TransportError::InvalidHeaderValue(format!(
            "Invalid team id header name '{}': {e}",
            config.team_id_header
        ))
    })?;
    headers.insert(team_header, header_value(&config.team_id, "team id")?);
    headers.insert(USER_AGENT, header_value(&config.user_agent, "user agent")?);

    Ok(headers)
}

#[async_trait]
impl LogTransport for HttpTransport {
    async fn send(&self, payload: Bytes) -> Result<TransportResponse, TransportError> {
        let start = Instant::now();
        let bytes = payload.len();

        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(self.timeout)
                } else {
                    TransportError::RequestError(e)
                }
            })?;

        let latency = start.elapsed();
        let status = response.status();

        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(256).collect(),
            });
        }

        debug!(
            "Delivered {} bytes to {} in {:?} (HTTP {})",
            bytes, self.endpoint, latency, status
        );

        Ok(TransportResponse {
            status_code: status.as_u16(),
            latency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TransportConfig {
        TransportConfig {
            endpoint: "https://ingest.example.com/v1/logs".to_string(),
            api_key: "secret".to_string(),
            team_id: "team-7".to_string(),
            team_id_header: "X-Team-Id".to_string(),
            timeout: Duration::from_secs(10),
            user_agent: "rask-log-sampler/test".to_string(),
        }
    }

    #[test]
    fn test_headers() {
        let headers = build_headers(&config()).unwrap();

        assert_eq!(headers[CONTENT_TYPE], PROTOBUF_CONTENT_TYPE);
        assert_eq!(headers[AUTHORIZATION], "Bearer secret");
        assert_eq!(headers["x-team-id"], "team-7");
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut config = config();
        config.team_id = "bad\nvalue".to_string();
        assert!(matches!(
            build_headers(&config),
            Err(TransportError::InvalidHeaderValue(_))
        ));

        let mut config = self::config();
        config.team_id_header = "not a header".to_string();
        assert!(build_headers(&config).is_err());
    }

    #[test]
    fn test_invalid_endpoint() {
        let mut config = config();
        config.endpoint = "::nope".to_string();
        assert!(matches!(
            HttpTransport::new(&config),
            Err(TransportError::InvalidConfiguration(_))
        ));
    }
}
