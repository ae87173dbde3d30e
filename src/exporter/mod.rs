//! Batching OTLP exporter.
//!
//! [`BatchExporter::enqueue`] is synchronous: it appends to the live buffer
//! and, once the buffer holds `batch_size` events, cuts a full batch off its
//! front and hands it to a bounded channel. While that channel is full the
//! events stay in the live buffer as backlog, up to
//! `batch_size * max_pending_batches`; past that, `enqueue` rejects with
//! [`ExportError::QueueFull`]. A single flush task drains the channel, then
//! the backlog, cuts partial batches on the flush interval and delivers
//! everything with the retry policy, so batches leave in the order they were
//! cut.

pub mod batch;
pub mod metrics;
pub mod otlp;
pub mod retry;
pub mod transport;

pub use batch::{Batch, BatchTrigger};
pub use metrics::{ExportMetrics, ExportSnapshot};
pub use otlp::{OtlpSerializer, SCOPE_NAME, SerializationError};
pub use retry::{RetryConfig, RetryPolicy};
pub use transport::{
    HttpTransport, LogTransport, TransportConfig, TransportError, TransportResponse,
};

use crate::domain::LogEvent;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Exporter is closed")]
    Closed,
    #[error("Export backlog full ({0} events buffered)")]
    QueueFull(usize),
    #[error("Exporter did not drain within {0:?}")]
    ShutdownTimeout(Duration),
    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_pending_batches: usize,
    pub retry: RetryConfig,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_millis(5000),
            max_pending_batches: 16,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Default)]
struct LiveBuffer {
    entries: Vec<LogEvent>,
    closed: bool,
}

struct ExporterShared {
    config: ExporterConfig,
    buffer: Mutex<LiveBuffer>,
    serializer: OtlpSerializer,
    transport: Arc<dyn LogTransport>,
    retry: RetryPolicy,
    metrics: ExportMetrics,
}

impl ExporterShared {
    /// Events the live buffer may hold while the pending queue is full.
    fn backlog_limit(&self) -> usize {
        self.config.batch_size.max(1) * self.config.max_pending_batches.max(1)
    }

    /// Cuts up to `batch_size` events off the front of the live buffer once it
    /// holds at least `min_entries`.
    ///
    /// Batches still queued in `ready` were cut earlier than anything in the
    /// buffer, so nothing is cut until they are delivered. `enqueue` only
    /// sends while holding the buffer lock, which keeps the check and the
    /// cut atomic.
    fn cut_next(
        &self,
        ready: &mpsc::Receiver<Batch>,
        min_entries: usize,
        trigger: BatchTrigger,
    ) -> Option<Batch> {
        let mut buffer = self.buffer.lock();
        if !ready.is_empty() || buffer.entries.is_empty() {
            return None;
        }
        if buffer.entries.len() < min_entries {
            return None;
        }

        let take = buffer.entries.len().min(self.config.batch_size.max(1));
        let entries: Vec<LogEvent> = buffer.entries.drain(..take).collect();
        Some(Batch::new(entries, trigger))
    }

    /// Sends one batch, retrying per the retry policy. Never returns an
    /// error: exhausted batches are logged and counted.
    async fn deliver(&self, batch: Batch) {
        let payload = match self.serializer.serialize_batch(&batch) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Dropping batch {}: {}", batch.id(), e);
                self.metrics.record_dropped(batch.size());
                return;
            }
        };

        let attempts = self.retry.attempts();
        for attempt in 0..attempts {
            match self.transport.send(payload.clone()).await {
                Ok(response) => {
                    self.metrics
                        .record_success(batch.size(), payload.len(), response.latency);
                    debug!(
                        "Sent batch {} ({} entries, {:?} trigger, {} bytes) on attempt {}, {:?} after cut",
                        batch.id(),
                        batch.size(),
                        batch.trigger(),
                        payload.len(),
                        attempt + 1,
                        batch.created_at().elapsed()
                    );
                    return;
                }
                Err(e) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.calculate_delay(attempt);
                    warn!(
                        "Batch {} attempt {}/{} failed: {}; retrying in {:?}",
                        batch.id(),
                        attempt + 1,
                        attempts,
                        e,
                        delay
                    );
                    self.metrics.record_retry();
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        "Dropping batch {} ({} entries) after {} attempts: {}",
                        batch.id(),
                        batch.size(),
                        attempts,
                        e
                    );
                    self.metrics.record_failure(batch.size());
                }
            }
        }
    }
}

async fn run_flush_loop(
    shared: Arc<ExporterShared>,
    mut ready: mpsc::Receiver<Batch>,
    cancel: CancellationToken,
) {
    let period = shared.config.flush_interval.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    let batch_size = shared.config.batch_size.max(1);

    loop {
        tokio::select! {
            biased;
            Some(batch) = ready.recv() => {
                shared.deliver(batch).await;
                // backlog left behind while the queue was full
                while let Some(batch) = shared.cut_next(&ready, batch_size, BatchTrigger::Size) {
                    shared.deliver(batch).await;
                }
            }
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                while let Some(batch) = shared.cut_next(&ready, 1, BatchTrigger::Time) {
                    shared.deliver(batch).await;
                }
            }
        }
    }

    ready.close();
    while let Some(batch) = ready.recv().await {
        shared.deliver(batch).await;
    }
    while let Some(batch) = shared.cut_next(&ready, 1, BatchTrigger::Shutdown) {
        shared.deliver(batch).await;
    }
    debug!("Exporter flush loop drained");
}

/// Buffers accepted events and ships them as OTLP batches.
pub struct BatchExporter {
    shared: Arc<ExporterShared>,
    sender: mpsc::Sender<Batch>,
    receiver: Mutex<Option<mpsc::Receiver<Batch>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl BatchExporter {
    pub fn new(
        config: ExporterConfig,
        service_name: impl Into<String>,
        transport: Arc<dyn LogTransport>,
    ) -> Self {
        Self::with_cancellation(config, service_name, transport, CancellationToken::new())
    }

    pub fn with_cancellation(
        config: ExporterConfig,
        service_name: impl Into<String>,
        transport: Arc<dyn LogTransport>,
        cancel: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.max_pending_batches.max(1));
        let retry = RetryPolicy::new(config.retry.clone());
        let capacity = config.batch_size;

        Self {
            shared: Arc::new(ExporterShared {
                config,
                buffer: Mutex::new(LiveBuffer {
                    entries: Vec::with_capacity(capacity),
                    closed: false,
                }),
                serializer: OtlpSerializer::new(service_name),
                transport,
                retry,
                metrics: ExportMetrics::new(),
            }),
            sender,
            receiver: Mutex::new(Some(receiver)),
            task: Mutex::new(None),
            cancel,
        }
    }

    /// Spawns the flush task. Must run inside a tokio runtime; later calls
    /// do nothing.
    pub fn start(&self) {
        let Some(receiver) = self.receiver.lock().take() else {
            return;
        };

        info!(
            "Starting exporter (batch_size={}, flush_interval={:?}, max_attempts={})",
            self.shared.config.batch_size,
            self.shared.config.flush_interval,
            self.shared.retry.attempts()
        );
        let handle = tokio::spawn(run_flush_loop(
            Arc::clone(&self.shared),
            receiver,
            self.cancel.clone(),
        ));
        *self.task.lock() = Some(handle);
    }

    /// Adds an event to the live buffer without waiting.
    ///
    /// Full batches are cut for the flush task while the pending queue has
    /// room. Otherwise events wait in the live buffer, and once that backlog
    /// reaches `batch_size * max_pending_batches` the event is rejected with
    /// [`ExportError::QueueFull`] and counted.
    pub fn enqueue(&self, event: LogEvent) -> Result<(), ExportError> {
        let batch_size = self.shared.config.batch_size.max(1);
        let mut buffer = self.shared.buffer.lock();
        if buffer.closed {
            return Err(ExportError::Closed);
        }
        if buffer.entries.len() >= self.shared.backlog_limit() {
            self.shared.metrics.record_rejected();
            return Err(ExportError::QueueFull(buffer.entries.len()));
        }
        buffer.entries.push(event);

        while buffer.entries.len() >= batch_size {
            match self.sender.try_reserve() {
                Ok(permit) => {
                    let entries: Vec<LogEvent> = buffer.entries.drain(..batch_size).collect();
                    permit.send(Batch::new(entries, BatchTrigger::Size));
                }
                Err(TrySendError::Full(())) => {
                    debug!(
                        "Pending batch queue full, {} events wait in the live buffer",
                        buffer.entries.len()
                    );
                    break;
                }
                Err(TrySendError::Closed(())) => {
                    let dropped = buffer.entries.len();
                    buffer.entries.clear();
                    self.shared.metrics.record_dropped(dropped);
                    return Err(ExportError::Closed);
                }
            }
        }

        Ok(())
    }

    /// Stops accepting events and delivers everything still buffered.
    /// Safe to call more than once.
    pub async fn close(&self) {
        if let Some(handle) = self.begin_shutdown() {
            if let Err(e) = handle.await {
                warn!("Exporter flush task ended abnormally: {}", e);
            }
            info!("Exporter closed: {:?}", self.shared.metrics.snapshot());
        }
    }

    /// Like [`close`](Self::close) but gives up after `deadline`, aborting
    /// whatever delivery is still in flight.
    pub async fn close_with_timeout(&self, deadline: Duration) -> Result<(), ExportError> {
        let Some(mut handle) = self.begin_shutdown() else {
            return Ok(());
        };

        match tokio::time::timeout(deadline, &mut handle).await {
            Ok(Ok(())) => {
                info!("Exporter closed: {:?}", self.shared.metrics.snapshot());
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Exporter flush task ended abnormally: {}", e);
                Ok(())
            }
            Err(_) => {
                handle.abort();
                error!("Exporter did not drain within {:?}", deadline);
                Err(ExportError::ShutdownTimeout(deadline))
            }
        }
    }

    fn begin_shutdown(&self) -> Option<JoinHandle<()>> {
        {
            let mut buffer = self.shared.buffer.lock();
            if buffer.closed {
                return None;
            }
            buffer.closed = true;
        }

        self.cancel.cancel();
        // a never-started exporter still drains what it accepted
        self.start();
        self.task.lock().take()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.buffer.lock().closed
    }

    /// Events in the live buffer, not yet cut into a batch.
    pub fn buffered(&self) -> usize {
        self.shared.buffer.lock().entries.len()
    }

    /// Batches waiting for the flush task.
    pub fn pending_batches(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn metrics(&self) -> ExportSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.shared.config
    }
}

impl std::fmt::Debug for BatchExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExporter")
            .field("service_name", &self.shared.serializer.service_name())
            .field("buffered", &self.buffered())
            .field("pending_batches", &self.pending_batches())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;
    use async_trait::async_trait;
    use bytes::Bytes;
    use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
    use opentelemetry_proto::tonic::common::v1::any_value;
    use prost::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingTransport {
        payloads: Mutex<Vec<Bytes>>,
        failures_left: AtomicUsize,
        attempts: AtomicUsize,
        send_delay: Duration,
    }

    impl RecordingTransport {
        /// Message bodies of every delivered batch, in delivery order.
        fn delivered_messages(&self) -> Vec<String> {
            self.payloads
                .lock()
                .iter()
                .flat_map(|payload| {
                    let request = ExportLogsServiceRequest::decode(payload.clone()).unwrap();
                    request.resource_logs[0].scope_logs[0]
                        .log_records
                        .iter()
                        .map(|record| match record.body.as_ref().and_then(|b| b.value.as_ref()) {
                            Some(any_value::Value::StringValue(s)) => s.clone(),
                            _ => String::new(),
                        })
                        .collect::<Vec<_>>()
                })
                .collect()
        }
    }

    #[async_trait]
    impl LogTransport for RecordingTransport {
        async fn send(&self, payload: Bytes) -> Result<TransportResponse, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(TransportError::Rejected {
                    status: 503,
                    body: String::new(),
                });
            }
            self.payloads.lock().push(payload);
            Ok(TransportResponse {
                status_code: 200,
                latency: Duration::from_millis(1),
            })
        }
    }

    fn shared(transport: &Arc<RecordingTransport>) -> Arc<dyn LogTransport> {
        Arc::clone(transport) as Arc<dyn LogTransport>
    }

    fn fast_config(batch_size: usize) -> ExporterConfig {
        ExporterConfig {
            batch_size,
            flush_interval: Duration::from_secs(3600),
            max_pending_batches: 4,
            retry: RetryConfig {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                ..Default::default()
            },
        }
    }

    fn event(i: usize) -> LogEvent {
        LogEvent::new(format!("event {i}"), Severity::Info)
    }

    #[test]
    fn test_enqueue_cuts_batch_at_size() {
        let transport = Arc::new(RecordingTransport::default());
        let exporter = BatchExporter::new(fast_config(3), "svc", transport);

        for i in 0..7 {
            exporter.enqueue(event(i)).unwrap();
        }

        assert_eq!(exporter.pending_batches(), 2);
        assert_eq!(exporter.buffered(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_keeps_backlog_then_rejects() {
        let transport = Arc::new(RecordingTransport::default());
        let mut config = fast_config(1);
        config.max_pending_batches = 2;
        let exporter = BatchExporter::new(config, "svc", shared(&transport));

        for i in 0..4 {
            exporter.enqueue(event(i)).unwrap();
        }
        assert_eq!(exporter.pending_batches(), 2);
        assert_eq!(exporter.buffered(), 2);

        assert!(matches!(
            exporter.enqueue(event(4)),
            Err(ExportError::QueueFull(2))
        ));
        assert_eq!(exporter.metrics().entries_rejected, 1);

        exporter.close().await;

        assert_eq!(
            transport.delivered_messages(),
            vec!["event 0", "event 1", "event 2", "event 3"]
        );
        let metrics = exporter.metrics();
        assert_eq!(metrics.entries_sent, 4);
        assert_eq!(metrics.batches_dropped, 0);
    }

    #[tokio::test]
    async fn test_burst_is_delivered_or_rejected() {
        let transport = Arc::new(RecordingTransport {
            send_delay: Duration::from_millis(20),
            ..Default::default()
        });
        let mut config = fast_config(10);
        config.max_pending_batches = 2;
        let exporter = BatchExporter::new(config, "svc", shared(&transport));
        exporter.start();

        let mut accepted = Vec::new();
        let mut rejected = 0;
        for i in 0..500 {
            match exporter.enqueue(event(i)) {
                Ok(()) => accepted.push(format!("event {i}")),
                Err(ExportError::QueueFull(_)) => rejected += 1,
                Err(e) => panic!("unexpected enqueue error: {e}"),
            }
        }
        exporter.close().await;

        assert!(rejected > 0);
        assert_eq!(accepted.len() + rejected, 500);
        assert_eq!(transport.delivered_messages(), accepted);
        let metrics = exporter.metrics();
        assert_eq!(metrics.entries_sent, accepted.len() as u64);
        assert_eq!(metrics.entries_rejected, rejected as u64);
        assert_eq!(metrics.entries_dropped, 0);
    }

    #[tokio::test]
    async fn test_exact_batch_size_flushes_without_timer() {
        let transport = Arc::new(RecordingTransport::default());
        let exporter = BatchExporter::new(fast_config(5), "svc", shared(&transport));
        exporter.start();

        for i in 0..5 {
            exporter.enqueue(event(i)).unwrap();
        }

        for _ in 0..200 {
            if !transport.payloads.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(transport.delivered_messages().len(), 5);
        assert_eq!(exporter.buffered(), 0);
        assert_eq!(exporter.pending_batches(), 0);

        exporter.close().await;
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_drains_everything() {
        let transport = Arc::new(RecordingTransport::default());
        let exporter = BatchExporter::new(fast_config(2), "svc", shared(&transport));
        exporter.start();

        for i in 0..5 {
            exporter.enqueue(event(i)).unwrap();
        }
        exporter.close().await;

        assert_eq!(transport.payloads.lock().len(), 3);
        assert_eq!(exporter.metrics().entries_sent, 5);
        assert!(matches!(exporter.enqueue(event(9)), Err(ExportError::Closed)));

        exporter.close().await;
        assert!(exporter.close_with_timeout(Duration::from_millis(10)).await.is_ok());
    }

    #[tokio::test]
    async fn test_close_without_start_still_delivers() {
        let transport = Arc::new(RecordingTransport::default());
        let exporter = BatchExporter::new(fast_config(10), "svc", shared(&transport));

        exporter.enqueue(event(1)).unwrap();
        exporter.close().await;

        assert_eq!(transport.payloads.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let transport = Arc::new(RecordingTransport::default());
        transport.failures_left.store(2, Ordering::SeqCst);
        let exporter = BatchExporter::new(fast_config(1), "svc", shared(&transport));
        exporter.start();

        exporter.enqueue(event(1)).unwrap();
        exporter.close().await;

        assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
        let metrics = exporter.metrics();
        assert_eq!(metrics.batches_sent, 1);
        assert_eq!(metrics.retries, 2);
        assert_eq!(metrics.batches_failed, 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_drop_batch() {
        let transport = Arc::new(RecordingTransport::default());
        transport.failures_left.store(10, Ordering::SeqCst);
        let exporter = BatchExporter::new(fast_config(1), "svc", shared(&transport));
        exporter.start();

        exporter.enqueue(event(1)).unwrap();
        exporter.enqueue(event(2)).unwrap();
        exporter.close().await;

        assert_eq!(transport.attempts.load(Ordering::SeqCst), 6);
        let metrics = exporter.metrics();
        assert_eq!(metrics.batches_failed, 2);
        assert_eq!(metrics.entries_failed, 2);
        assert_eq!(metrics.batches_sent, 0);
    }

    #[tokio::test]
    async fn test_time_trigger_flushes_partial_batch() {
        let transport = Arc::new(RecordingTransport::default());
        let mut config = fast_config(100);
        config.flush_interval = Duration::from_millis(20);
        let exporter = BatchExporter::new(config, "svc", shared(&transport));
        exporter.start();

        exporter.enqueue(event(1)).unwrap();
        exporter.enqueue(event(2)).unwrap();

        for _ in 0..100 {
            if !transport.payloads.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(transport.payloads.lock().len(), 1);
        assert_eq!(exporter.buffered(), 0);
        exporter.close().await;
    }

    #[tokio::test]
    async fn test_close_with_timeout_expires() {
        let transport = Arc::new(RecordingTransport::default());
        transport.failures_left.store(10, Ordering::SeqCst);
        let mut config = fast_config(1);
        config.retry.base_delay = Duration::from_secs(10);
        config.retry.max_delay = Duration::from_secs(10);
        let exporter = BatchExporter::new(config, "svc", transport);
        exporter.start();

        exporter.enqueue(event(1)).unwrap();
        let result = exporter.close_with_timeout(Duration::from_millis(50)).await;

        assert!(matches!(result, Err(ExportError::ShutdownTimeout(_))));
        assert!(exporter.is_closed());
    }
}
