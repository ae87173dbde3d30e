//! Domain layer for rask-log-sampler.
//!
//! Contains the canonical types shared across all modules:
//! - `LogEvent`: a single log line as emitted by the host application
//! - `Severity`: log severity (Trace/Debug/Info/Warn/Error/Fatal)
//! - `AttributeValue`: typed value of a caller-supplied attribute

pub mod log_event;
pub mod severity;

pub use log_event::{AttributeValue, LogEvent};
pub use severity::{Severity, SeverityParseError};
