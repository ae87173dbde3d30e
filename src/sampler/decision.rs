use serde::{Deserialize, Serialize};
use std::fmt;

/// Which part of the policy produced the rate of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateTier {
    /// Errors and fatals bypass sampling.
    AlwaysKeep,
    Pattern,
    Severity,
    Global,
    /// No policy loaded; the configured fallback rate applies.
    Fallback,
}

impl RateTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateTier::AlwaysKeep => "always_keep",
            RateTier::Pattern => "pattern",
            RateTier::Severity => "severity",
            RateTier::Global => "global",
            RateTier::Fallback => "fallback",
        }
    }
}

impl fmt::Display for RateTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingDecision {
    pub should_sample: bool,
    pub signature: String,
    pub rate: f64,
    pub reason: RateTier,
}

impl SamplingDecision {
    pub fn always_keep(signature: String) -> Self {
        Self {
            should_sample: true,
            signature,
            rate: 1.0,
            reason: RateTier::AlwaysKeep,
        }
    }
}

impl fmt::Display for SamplingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (rate={:.3}, tier={})",
            if self.should_sample { "keep" } else { "drop" },
            self.rate,
            self.reason
        )
    }
}
