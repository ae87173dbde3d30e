use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const MAX_LATENCY_SAMPLES: usize = 1000;

fn percentile(sorted_samples: &[Duration], percentile: f64) -> Duration {
    let Some(last) = sorted_samples.len().checked_sub(1) else {
        return Duration::ZERO;
    };

    let index = (percentile.clamp(0.0, 1.0) * last as f64).floor() as usize;
    sorted_samples
        .get(index.min(last))
        .copied()
        .unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSnapshot {
    pub batches_sent: u64,
    pub entries_sent: u64,
    pub bytes_sent: u64,
    pub batches_failed: u64,
    pub entries_failed: u64,
    pub batches_dropped: u64,
    pub entries_dropped: u64,
    pub entries_rejected: u64,
    pub retries: u64,
    pub average_latency: Duration,
    pub p95_latency: Duration,
}

/// Delivery counters shared by the exporter handle and its flush task.
#[derive(Debug, Clone, Default)]
pub struct ExportMetrics {
    batches_sent: Arc<AtomicU64>,
    entries_sent: Arc<AtomicU64>,
    bytes_sent: Arc<AtomicU64>,
    batches_failed: Arc<AtomicU64>,
    entries_failed: Arc<AtomicU64>,
    batches_dropped: Arc<AtomicU64>,
    entries_dropped: Arc<AtomicU64>,
    entries_rejected: Arc<AtomicU64>,
    retries: Arc<AtomicU64>,
    total_latency_ms: Arc<AtomicU64>,
    latency_samples: Arc<Mutex<VecDeque<Duration>>>,
}

impl ExportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, entries: usize, bytes: usize, latency: Duration) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.entries_sent.fetch_add(entries as u64, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);

        let mut samples = self.latency_samples.lock();
        samples.push_back(latency);
        if samples.len() > MAX_LATENCY_SAMPLES {
            samples.pop_front();
        }
    }

    /// A batch that exhausted its retries.
    pub fn record_failure(&self, entries: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.entries_failed.fetch_add(entries as u64, Ordering::Relaxed);
    }

    /// A batch discarded before any send attempt.
    pub fn record_dropped(&self, entries: usize) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
        self.entries_dropped.fetch_add(entries as u64, Ordering::Relaxed);
    }

    /// An event refused by `enqueue` because the backlog was full.
    pub fn record_rejected(&self) {
        self.entries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ExportSnapshot {
        let batches_sent = self.batches_sent.load(Ordering::Relaxed);
        let average_latency = if batches_sent > 0 {
            Duration::from_millis(self.total_latency_ms.load(Ordering::Relaxed) / batches_sent)
        } else {
            Duration::ZERO
        };

        let mut sorted: Vec<Duration> = self.latency_samples.lock().iter().copied().collect();
        sorted.sort_unstable();

        ExportSnapshot {
            batches_sent,
            entries_sent: self.entries_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            entries_failed: self.entries_failed.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            entries_dropped: self.entries_dropped.load(Ordering::Relaxed),
            entries_rejected: self.entries_rejected.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            average_latency,
            p95_latency: percentile(&sorted, 0.95),
        }
    }
}
