//! Adaptive sampling decisions.
//!
//! [`AdaptiveSampler::decide`] is the synchronous hot path: compute the
//! signature, record it in the [`PatternCache`], look up a rate in the
//! current [`SamplingPolicy`] and roll the dice. Two background tasks keep
//! the policy fresh and ship pattern statistics to the control plane.

pub mod cache;
pub mod decision;
pub mod policy;

pub use cache::{MAX_SAMPLE_CHARS, PatternCache, PatternStats};
pub use decision::{RateTier, SamplingDecision};
pub use policy::{PolicyError, PolicyStore, SamplingPolicy};

use crate::client::ControlPlane;
use crate::domain::Severity;
use crate::signature::SignatureMemo;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub service_name: String,
    pub fallback_rate: f64,
    pub max_pattern_cache_size: usize,
    /// Recent messages whose signatures are memoized; 0 disables the memo.
    pub signature_cache_size: usize,
    pub policy_refresh_interval: Duration,
    pub pattern_report_interval: Duration,
}

impl SamplerConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            fallback_rate: 1.0,
            max_pattern_cache_size: 10_000,
            signature_cache_size: 10_000,
            policy_refresh_interval: Duration::from_secs(300),
            pattern_report_interval: Duration::from_secs(600),
        }
    }
}

/// Point-in-time copy of the sampler counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub kept: u64,
    pub dropped: u64,
    pub always_kept: u64,
    pub untracked_patterns: u64,
    pub policy_refreshes: u64,
    pub policy_refresh_failures: u64,
    pub reports_sent: u64,
    pub report_failures: u64,
}

#[derive(Debug, Default)]
struct SamplerCounters {
    kept: AtomicU64,
    dropped: AtomicU64,
    always_kept: AtomicU64,
    untracked_patterns: AtomicU64,
    policy_refreshes: AtomicU64,
    policy_refresh_failures: AtomicU64,
    reports_sent: AtomicU64,
    report_failures: AtomicU64,
}

impl SamplerCounters {
    fn snapshot(&self) -> SamplerStats {
        SamplerStats {
            kept: self.kept.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            always_kept: self.always_kept.load(Ordering::Relaxed),
            untracked_patterns: self.untracked_patterns.load(Ordering::Relaxed),
            policy_refreshes: self.policy_refreshes.load(Ordering::Relaxed),
            policy_refresh_failures: self.policy_refresh_failures.load(Ordering::Relaxed),
            reports_sent: self.reports_sent.load(Ordering::Relaxed),
            report_failures: self.report_failures.load(Ordering::Relaxed),
        }
    }
}

struct SamplerInner {
    config: SamplerConfig,
    signatures: SignatureMemo,
    cache: PatternCache,
    policies: PolicyStore,
    control_plane: Arc<dyn ControlPlane>,
    counters: SamplerCounters,
}

impl SamplerInner {
    fn select_rate(&self, signature: &str, severity: Severity) -> (f64, RateTier) {
        let Some(policy) = self.policies.get() else {
            return (self.config.fallback_rate, RateTier::Fallback);
        };

        if let Some(rate) = policy.pattern_rate(signature) {
            return (rate, RateTier::Pattern);
        }
        if let Some(rate) = policy.severity_rate(severity) {
            return (rate, RateTier::Severity);
        }
        (policy.global_rate, RateTier::Global)
    }

    async fn refresh_policy(&self) {
        let service = &self.config.service_name;
        let result = self
            .control_plane
            .fetch_active_policy(service)
            .await
            .and_then(|policy| match policy {
                Some(p) => p
                    .validate()
                    .map(|()| Some(p))
                    .map_err(|e| crate::client::ClientError::InvalidPolicy(e.to_string())),
                None => Ok(None),
            });

        match result {
            Ok(Some(policy)) => {
                let new_version = policy.version;
                let previous = self.policies.set(policy);
                self.counters.policy_refreshes.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Sampling policy for {} updated: {:?} -> v{}",
                    service, previous, new_version
                );
            }
            Ok(None) => {
                debug!("No sampling policy available for {}", service);
            }
            Err(e) => {
                self.counters
                    .policy_refresh_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Policy refresh for {} failed, keeping v{:?}: {}",
                    service,
                    self.policies.version(),
                    e
                );
            }
        }
    }

    async fn report_patterns(&self) {
        debug!(
            "Draining {} observations across {} patterns",
            self.cache.total_observations(),
            self.cache.len()
        );
        let patterns = self.cache.drain_all();
        if patterns.is_empty() {
            return;
        }

        let service = &self.config.service_name;
        match self
            .control_plane
            .report_patterns(service, &patterns)
            .await
        {
            Ok(()) => {
                self.counters.reports_sent.fetch_add(1, Ordering::Relaxed);
                info!("Reported {} patterns for {}", patterns.len(), service);
            }
            Err(e) => {
                self.counters.report_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Pattern report for {} failed, discarding {} patterns: {}",
                    service,
                    patterns.len(),
                    e
                );
            }
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn run_policy_refresh(inner: Arc<SamplerInner>, cancel: CancellationToken) {
    let mut interval = ticker(inner.config.policy_refresh_interval);
    // first tick fires immediately; start() already fetched
    interval.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => inner.refresh_policy().await,
        }
    }
    debug!("Policy refresh loop stopped");
}

async fn run_pattern_report(inner: Arc<SamplerInner>, cancel: CancellationToken) {
    let mut interval = ticker(inner.config.pattern_report_interval);
    interval.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => inner.report_patterns().await,
        }
    }
    debug!("Pattern report loop stopped");
}

/// Keep/drop decisions driven by a remotely managed policy.
pub struct AdaptiveSampler {
    inner: Arc<SamplerInner>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl AdaptiveSampler {
    pub fn new(config: SamplerConfig, control_plane: Arc<dyn ControlPlane>) -> Self {
        Self::with_cancellation(config, control_plane, CancellationToken::new())
    }

    /// Builds a sampler whose background tasks also stop when `cancel` fires.
    pub fn with_cancellation(
        config: SamplerConfig,
        control_plane: Arc<dyn ControlPlane>,
        cancel: CancellationToken,
    ) -> Self {
        let cache = PatternCache::new(config.max_pattern_cache_size);
        let signatures = SignatureMemo::new(config.signature_cache_size);
        Self {
            inner: Arc::new(SamplerInner {
                config,
                signatures,
                cache,
                policies: PolicyStore::new(),
                control_plane,
                counters: SamplerCounters::default(),
            }),
            cancel,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn decide(&self, message: &str, severity: Severity) -> SamplingDecision {
        let inner = &self.inner;
        let signature = inner.signatures.signature(message);

        if !signature.is_empty() && !inner.cache.record(&signature, message, severity) {
            inner
                .counters
                .untracked_patterns
                .fetch_add(1, Ordering::Relaxed);
        }

        if severity.is_always_kept() {
            inner.counters.always_kept.fetch_add(1, Ordering::Relaxed);
            inner.counters.kept.fetch_add(1, Ordering::Relaxed);
            return SamplingDecision::always_keep(signature);
        }

        let (rate, reason) = inner.select_rate(&signature, severity);
        let should_sample = rand::rng().random::<f64>() < rate;

        if should_sample {
            inner.counters.kept.fetch_add(1, Ordering::Relaxed);
        } else {
            inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }

        SamplingDecision {
            should_sample,
            signature,
            rate,
            reason,
        }
    }

    /// Like [`decide`](Self::decide) with a textual severity; unknown names
    /// are treated as `INFO`.
    pub fn decide_str(&self, message: &str, severity: &str) -> SamplingDecision {
        self.decide(message, Severity::parse_lenient(severity))
    }

    /// Fetches the policy once, then starts the refresh and report loops.
    /// Subsequent calls do nothing.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(
            "Starting adaptive sampler for {} (refresh={:?}, report={:?})",
            self.inner.config.service_name,
            self.inner.config.policy_refresh_interval,
            self.inner.config.pattern_report_interval
        );
        self.inner.refresh_policy().await;

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(run_policy_refresh(
            Arc::clone(&self.inner),
            self.cancel.clone(),
        )));
        tasks.push(tokio::spawn(run_pattern_report(
            Arc::clone(&self.inner),
            self.cancel.clone(),
        )));
    }

    /// Stops both loops and sends one last pattern report.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Sampler task ended abnormally: {}", e);
            }
        }

        self.inner.report_patterns().await;
        info!("Adaptive sampler for {} stopped", self.inner.config.service_name);
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    /// Forces an immediate policy fetch outside the refresh schedule.
    pub async fn refresh_policy(&self) {
        self.inner.refresh_policy().await;
    }

    /// Forces an immediate pattern report outside the report schedule.
    pub async fn report_patterns(&self) {
        self.inner.report_patterns().await;
    }

    pub fn current_policy(&self) -> Option<Arc<SamplingPolicy>> {
        self.inner.policies.get()
    }

    pub fn policy_store(&self) -> &PolicyStore {
        &self.inner.policies
    }

    pub fn pattern_cache(&self) -> &PatternCache {
        &self.inner.cache
    }

    pub fn signature_memo(&self) -> &SignatureMemo {
        &self.inner.signatures
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> SamplerStats {
        self.inner.counters.snapshot()
    }
}

impl std::fmt::Debug for AdaptiveSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveSampler")
            .field("service_name", &self.inner.config.service_name)
            .field("policy_version", &self.inner.policies.version())
            .field("patterns", &self.inner.cache.len())
            .field("running", &self.is_running())
            .finish()
    }
}
