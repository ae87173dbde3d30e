//! Control-plane collaborators of the sampler.
//!
//! The sampler only needs two calls: fetch the active policy and report
//! pattern statistics. [`ControlPlane`] captures that contract;
//! [`HttpControlPlane`] talks to the policy service over HTTP and
//! [`NoopControlPlane`] stands in when no service is configured.

pub mod http;

pub use http::{ClientConfig, ClientStats, HttpControlPlane, RequestStats};

use crate::sampler::{PatternStats, SamplingPolicy};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Request timeout: {0}")]
    RequestTimeout(String),
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },
    #[error("Invalid policy document: {0}")]
    InvalidPolicy(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Returns the active policy for `service_name`, or `None` when the
    /// service has no policy yet.
    async fn fetch_active_policy(
        &self,
        service_name: &str,
    ) -> Result<Option<SamplingPolicy>, ClientError>;

    async fn report_patterns(
        &self,
        service_name: &str,
        patterns: &[PatternStats],
    ) -> Result<(), ClientError>;
}

/// Control plane used when none is configured: never has a policy and
/// accepts every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopControlPlane;

#[async_trait]
impl ControlPlane for NoopControlPlane {
    async fn fetch_active_policy(
        &self,
        _service_name: &str,
    ) -> Result<Option<SamplingPolicy>, ClientError> {
        Ok(None)
    }

    async fn report_patterns(
        &self,
        service_name: &str,
        patterns: &[PatternStats],
    ) -> Result<(), ClientError> {
        tracing::debug!(
            "Discarding {} pattern stats for {} (no control plane configured)",
            patterns.len(),
            service_name
        );
        Ok(())
    }
}
