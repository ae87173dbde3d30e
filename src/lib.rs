#![deny(warnings, rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_lossless,            // Infallible casts are clear enough with `as`
    clippy::cast_possible_truncation, // Millisecond durations and counters stay far below u64::MAX
    clippy::cast_possible_wrap,       // Severity numbers and counters are small and non-negative
    clippy::cast_precision_loss,      // Acceptable for latency percentiles
    clippy::cast_sign_loss,           // Nanosecond timestamps are clamped to >= 0 first
    clippy::missing_errors_doc,       // Error enums document themselves
    clippy::missing_panics_doc,       // No panicking paths outside tests
    clippy::module_name_repetitions,  // e.g. ExportError in exporter module
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Internal API
)]

pub mod client;
pub mod config;
pub mod domain;
pub mod exporter;
pub mod logging;
pub mod pipeline;
pub mod sampler;
pub mod signature;

// Re-export main types for easy access
pub use client::{ControlPlane, HttpControlPlane, NoopControlPlane};
pub use config::Config;
pub use domain::{AttributeValue, LogEvent, Severity};
pub use exporter::{BatchExporter, ExportError};
pub use pipeline::{PipelineError, TelemetryPipeline};
pub use sampler::{AdaptiveSampler, RateTier, SamplingDecision, SamplingPolicy};
pub use signature::{compute_signature, normalize};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
