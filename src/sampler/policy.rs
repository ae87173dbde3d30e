use crate::domain::Severity;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("Rate out of range for {field}: {value}")]
    RateOutOfRange { field: String, value: f64 },
    #[error("Anomaly boost must be >= 1.0, got {0}")]
    InvalidAnomalyBoost(f64),
}

fn default_anomaly_boost() -> f64 {
    2.0
}

/// Sampling policy served by the control plane.
///
/// Immutable once built; the store hands out `Arc`s so readers never see a
/// partially replaced document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingPolicy {
    pub version: u64,
    pub global_rate: f64,
    #[serde(default)]
    pub severity_rates: HashMap<String, f64>,
    #[serde(default)]
    pub pattern_rates: HashMap<String, f64>,
    #[serde(default = "default_anomaly_boost")]
    pub anomaly_boost: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl SamplingPolicy {
    pub fn new(version: u64, global_rate: f64) -> Self {
        Self {
            version,
            global_rate,
            severity_rates: HashMap::new(),
            pattern_rates: HashMap::new(),
            anomaly_boost: default_anomaly_boost(),
            reasoning: None,
            created_at: Some(Utc::now()),
        }
    }

    pub fn with_severity_rate(mut self, severity: impl Into<String>, rate: f64) -> Self {
        self.severity_rates.insert(severity.into().to_uppercase(), rate);
        self
    }

    pub fn with_pattern_rate(mut self, signature: impl Into<String>, rate: f64) -> Self {
        self.pattern_rates.insert(signature.into(), rate);
        self
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        check_rate("global_rate", self.global_rate)?;

        for (severity, rate) in &self.severity_rates {
            check_rate(&format!("severity_rates.{severity}"), *rate)?;
        }
        for (signature, rate) in &self.pattern_rates {
            check_rate(&format!("pattern_rates.{signature}"), *rate)?;
        }

        if self.anomaly_boost.is_nan() || self.anomaly_boost < 1.0 {
            return Err(PolicyError::InvalidAnomalyBoost(self.anomaly_boost));
        }

        Ok(())
    }

    pub fn pattern_rate(&self, signature: &str) -> Option<f64> {
        self.pattern_rates.get(signature).copied()
    }

    /// Looks up the canonical severity name first, then its aliases.
    /// Keys are matched case-insensitively.
    pub fn severity_rate(&self, severity: Severity) -> Option<f64> {
        std::iter::once(severity.as_str())
            .chain(severity.aliases().iter().copied())
            .find_map(|name| {
                self.severity_rates.get(name).copied().or_else(|| {
                    self.severity_rates
                        .iter()
                        .find(|(key, _)| key.eq_ignore_ascii_case(name))
                        .map(|(_, rate)| *rate)
                })
            })
    }
}

fn check_rate(field: &str, value: f64) -> Result<(), PolicyError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PolicyError::RateOutOfRange {
            field: field.to_string(),
            value,
        })
    }
}

/// Holds the current policy, if any.
#[derive(Debug, Default)]
pub struct PolicyStore {
    current: RwLock<Option<Arc<SamplingPolicy>>>,
    last_updated: RwLock<Option<DateTime<Utc>>>,
    update_count: AtomicU64,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<SamplingPolicy>> {
        self.current.read().clone()
    }

    /// Replaces the policy and returns the version it replaced.
    pub fn set(&self, policy: SamplingPolicy) -> Option<u64> {
        let previous = {
            let mut current = self.current.write();
            current.replace(Arc::new(policy))
        };
        *self.last_updated.write() = Some(Utc::now());
        self.update_count.fetch_add(1, Ordering::Relaxed);

        previous.map(|p| p.version)
    }

    pub fn version(&self) -> Option<u64> {
        self.current.read().as_ref().map(|p| p.version)
    }

    /// Number of successful replacements since construction.
    pub fn update_count(&self) -> u64 {
        self.update_count.load(Ordering::Relaxed)
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        *self.last_updated.read()
    }
}
