use crate::domain::Severity;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Maximum number of characters kept from the first message of a pattern.
pub const MAX_SAMPLE_CHARS: usize = 200;

/// Aggregate counters for one signature between two reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    pub signature: String,
    pub message_sample: String,
    pub count: u64,
    pub severity_distribution: BTreeMap<String, u64>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl PatternStats {
    fn new(signature: &str, message: &str, now: DateTime<Utc>) -> Self {
        Self {
            signature: signature.to_string(),
            message_sample: message.chars().take(MAX_SAMPLE_CHARS).collect(),
            count: 0,
            severity_distribution: BTreeMap::new(),
            first_seen: now,
            last_seen: now,
        }
    }

    fn observe(&mut self, severity: Severity, now: DateTime<Utc>) {
        self.count += 1;
        self.last_seen = now;
        *self
            .severity_distribution
            .entry(severity.as_str().to_string())
            .or_insert(0) += 1;
    }
}

/// Signature → statistics, shared between the decision path and the
/// reporter.
///
/// `record` and `drain_all` take the same lock, so an observation lands in
/// exactly one generation of the map.
#[derive(Debug)]
pub struct PatternCache {
    entries: Mutex<HashMap<String, PatternStats>>,
    max_patterns: usize,
}

impl PatternCache {
    pub fn new(max_patterns: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_patterns,
        }
    }

    /// Upserts the statistics for `signature`.
    ///
    /// Returns `false` when the signature is new and the cache is full; the
    /// observation is not tracked in that case.
    pub fn record(&self, signature: &str, message: &str, severity: Severity) -> bool {
        let now = Utc::now();
        let mut entries = self.entries.lock();

        if let Some(stats) = entries.get_mut(signature) {
            stats.observe(severity, now);
            return true;
        }

        if entries.len() >= self.max_patterns {
            return false;
        }

        let mut stats = PatternStats::new(signature, message, now);
        stats.observe(severity, now);
        entries.insert(signature.to_string(), stats);
        true
    }

    /// Takes every entry and leaves an empty cache behind.
    pub fn drain_all(&self) -> Vec<PatternStats> {
        let drained = std::mem::take(&mut *self.entries.lock());
        drained.into_values().collect()
    }

    pub fn get(&self, signature: &str) -> Option<PatternStats> {
        self.entries.lock().get(signature).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn total_observations(&self) -> u64 {
        self.entries.lock().values().map(|s| s.count).sum()
    }

    pub fn capacity(&self) -> usize {
        self.max_patterns
    }
}
