use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown severity: {0}")]
pub struct SeverityParseError(pub String);

/// Severity of a log event as seen by the sampler and the exporter.
///
/// `CRITICAL` is accepted as an alias of `Fatal` and `WARNING` as an alias
/// of `Warn`; the canonical text is what ends up on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    pub const ALL: [Severity; 6] = [
        Severity::Trace,
        Severity::Debug,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
        Severity::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    /// Alternative spellings that policy documents may use as keys.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Severity::Warn => &["WARNING"],
            Severity::Fatal => &["CRITICAL"],
            _ => &[],
        }
    }

    /// Events at this severity are never dropped.
    pub fn is_always_kept(&self) -> bool {
        matches!(self, Severity::Error | Severity::Fatal)
    }

    /// OTel severity numbers:
    /// - 1-4: TRACE
    /// - 5-8: DEBUG
    /// - 9-12: INFO
    /// - 13-16: WARN
    /// - 17-20: ERROR
    /// - 21-24: FATAL
    pub fn otlp_number(&self) -> i32 {
        match self {
            Severity::Trace => 1,
            Severity::Debug => 5,
            Severity::Info => 9,
            Severity::Warn => 13,
            Severity::Error => 17,
            Severity::Fatal => 21,
        }
    }

    /// Parses free-form severity text, falling back to `Info` for anything
    /// unrecognised. Log call sites should never fail on a bad level.
    pub fn parse_lenient(text: &str) -> Self {
        text.parse().unwrap_or(Severity::Info)
    }
}

impl FromStr for Severity {
    type Err = SeverityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TRACE" => Ok(Severity::Trace),
            "DEBUG" => Ok(Severity::Debug),
            "INFO" => Ok(Severity::Info),
            "WARN" | "WARNING" => Ok(Severity::Warn),
            "ERROR" => Ok(Severity::Error),
            "FATAL" | "CRITICAL" => Ok(Severity::Fatal),
            _ => Err(SeverityParseError(s.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Severity::Trace,
            tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::INFO => Severity::Info,
            tracing::Level::WARN => Severity::Warn,
            // only ERROR remains
            _ => Severity::Error,
        }
    }
}
