use crate::client::{ClientError, ControlPlane, HttpControlPlane, NoopControlPlane};
use crate::config::{Config, ConfigError};
use crate::domain::LogEvent;
use crate::exporter::{BatchExporter, ExportError, HttpTransport, LogTransport, TransportError};
use crate::sampler::{AdaptiveSampler, SamplingDecision};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Control plane error: {0}")]
    Client(#[from] ClientError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

/// Sampler and exporter wired to one cancellation signal.
///
/// Kept events go to the exporter; dropped events are discarded. Without
/// ingest settings the pipeline still samples and reports patterns.
pub struct TelemetryPipeline {
    config: Config,
    sampler: AdaptiveSampler,
    exporter: Option<BatchExporter>,
    cancel: CancellationToken,
    stopped: AtomicBool,
}

impl TelemetryPipeline {
    /// Builds the HTTP collaborators described by `config`.
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        config.validate()?;

        let control_plane: Arc<dyn ControlPlane> = match config.client_config() {
            Some(client_config) => Arc::new(HttpControlPlane::new(client_config)?),
            None => {
                info!("No control plane configured; sampling with the fallback rate");
                Arc::new(NoopControlPlane)
            }
        };

        let transport: Option<Arc<dyn LogTransport>> = match config.transport_config() {
            Some(transport_config) => Some(Arc::new(HttpTransport::new(&transport_config)?)),
            None => {
                info!("Ingest endpoint, API key or team id missing; export disabled");
                None
            }
        };

        Self::with_components(config, control_plane, transport)
    }

    pub fn with_components(
        config: Config,
        control_plane: Arc<dyn ControlPlane>,
        transport: Option<Arc<dyn LogTransport>>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let cancel = CancellationToken::new();
        let sampler = AdaptiveSampler::with_cancellation(
            config.sampler_config(),
            control_plane,
            cancel.child_token(),
        );
        let exporter = transport.map(|transport| {
            BatchExporter::with_cancellation(
                config.exporter_config(),
                config.service_name.clone(),
                transport,
                cancel.child_token(),
            )
        });

        Ok(Self {
            config,
            sampler,
            exporter,
            cancel,
            stopped: AtomicBool::new(false),
        })
    }

    /// Starts the exporter flush task, fetches the initial policy and starts
    /// the sampler loops.
    pub async fn start(&self) {
        if let Some(exporter) = &self.exporter {
            exporter.start();
        }
        self.sampler.start().await;
        info!(
            "Telemetry pipeline for {} started (export {})",
            self.config.service_name,
            if self.exporter.is_some() { "on" } else { "off" }
        );
    }

    /// Samples one event and forwards it when kept. Never blocks.
    pub fn emit(&self, event: LogEvent) -> SamplingDecision {
        let decision = self.sampler.decide(&event.message, event.severity);

        if decision.should_sample
            && let Some(exporter) = &self.exporter
            && let Err(e) = exporter.enqueue(event)
        {
            debug!("Kept event not exported: {}", e);
        }

        decision
    }

    /// Final pattern report, exporter drain, then cancellation of anything
    /// still running. Idempotent.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.sampler.stop().await;
        if let Some(exporter) = &self.exporter {
            exporter.close().await;
        }
        self.cancel.cancel();
        info!("Telemetry pipeline for {} stopped", self.config.service_name);
    }

    /// Like [`stop`](Self::stop) but bounds the exporter drain.
    pub async fn stop_with_timeout(&self, deadline: Duration) -> Result<(), PipelineError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.sampler.stop().await;
        let result = match &self.exporter {
            Some(exporter) => exporter.close_with_timeout(deadline).await,
            None => Ok(()),
        };
        self.cancel.cancel();

        result.map_err(PipelineError::from)
    }

    pub fn sampler(&self) -> &AdaptiveSampler {
        &self.sampler
    }

    pub fn exporter(&self) -> Option<&BatchExporter> {
        self.exporter.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Root token; cancelling it stops every background task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
