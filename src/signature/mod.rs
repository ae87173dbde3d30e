//! Pattern signatures for log messages.
//!
//! Messages that differ only in embedded identifiers, numbers, timestamps,
//! addresses and similar variable content normalize to the same text and
//! therefore hash to the same signature. Signatures are MD5 hex digests of
//! the normalized text, so independent processes agree on them.

pub mod error;
pub mod memo;
pub mod rules;

pub use error::RuleError;
pub use memo::{MAX_MEMO_MESSAGE_LEN, SignatureMemo};
pub use rules::{MESSAGE_RULES, NormalizationRule, StaticRuleSet};

/// Length of a signature in hex characters.
pub const SIGNATURE_LEN: usize = 32;

/// Normalizes a message into its pattern text.
///
/// Lower-cases and trims, then runs [`MESSAGE_RULES`] in order.
pub fn normalize(message: &str) -> String {
    let lowered = message.trim().to_lowercase();
    if lowered.is_empty() {
        return lowered;
    }

    MESSAGE_RULES.apply(lowered).trim().to_string()
}

/// Computes the pattern signature of a message.
///
/// Empty and whitespace-only messages yield an empty signature.
pub fn compute_signature(message: &str) -> String {
    let normalized = normalize(message);
    if normalized.is_empty() {
        return String::new();
    }

    format!("{:x}", md5::compute(normalized.as_bytes()))
}
