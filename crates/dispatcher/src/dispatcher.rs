//! Dispatcher - routes live verdicts and finished sessions to the sinks

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use contracts::{BatchMode, DetectionResult, SessionRecord, SinkConfig, SinkType, UploadConfig};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::led::LedResponder;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LogSink, NetworkSink};
use crate::upload::{UploadPlan, UploadReport};

#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    pub sinks: Vec<SinkConfig>,
    pub upload: UploadConfig,
    /// Upload proximity sessions with the large live-debug batches
    pub live_debug: bool,
}

/// Input of the dispatcher loop
#[derive(Debug)]
pub enum DispatchEvent {
    Detection(DetectionResult),
    /// A finished session; `done` receives the per-sink outcomes
    Session {
        record: SessionRecord,
        done: Option<oneshot::Sender<Vec<SinkUpload>>>,
    },
}

/// Upload outcome of one sink
#[derive(Debug)]
pub struct SinkUpload {
    pub sink: String,
    pub result: Result<UploadReport, DispatcherError>,
}

/// Opens the configured sinks and assembles a [`Dispatcher`]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<DispatchEvent>,
    led: Option<LedResponder>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<DispatchEvent>) -> Self {
        Self {
            config,
            input_rx,
            led: None,
        }
    }

    /// Drive an LED strip with every detection
    pub fn with_led(mut self, led: LedResponder) -> Self {
        self.led = Some(led);
        self
    }

    /// Open every sink in configuration order; the first failure aborts
    #[instrument(
        name = "dispatcher_build",
        skip(self),
        fields(sinks = self.config.sinks.len(), live_debug = self.config.live_debug)
    )]
    pub async fn build(self) -> Result<Dispatcher, DispatcherError> {
        let mut handles = Vec::with_capacity(self.config.sinks.len());
        for sink in &self.config.sinks {
            handles.push(open_sink(sink).await?);
        }

        Ok(Dispatcher {
            handles,
            led: self.led,
            upload: self.config.upload,
            live_debug: self.config.live_debug,
            input_rx: self.input_rx,
        })
    }
}

#[instrument(name = "dispatcher_open_sink", skip(config), fields(sink = %config.name))]
async fn open_sink(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    let creation =
        |e: &dyn std::fmt::Display| DispatcherError::sink_creation(&config.name, e.to_string());
    let handle = match config.sink_type {
        SinkType::Log => SinkHandle::spawn(LogSink::new(&config.name), config.queue_capacity),
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| creation(&e))?;
            SinkHandle::spawn(sink, config.queue_capacity)
        }
        SinkType::Network => {
            let sink = NetworkSink::from_params(&config.name, &config.params)
                .await
                .map_err(|e| creation(&e))?;
            SinkHandle::spawn(sink, config.queue_capacity)
        }
    };
    debug!(sink = %config.name, sink_type = ?config.sink_type, "Sink opened");
    Ok(handle)
}

/// Fans detections out to the LED and every sink, and uploads sessions
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    led: Option<LedResponder>,
    upload: UploadConfig,
    live_debug: bool,
    input_rx: mpsc::Receiver<DispatchEvent>,
}

impl Dispatcher {
    /// Dispatcher over already running sink workers
    pub fn with_handles(
        handles: Vec<SinkHandle>,
        upload: UploadConfig,
        input_rx: mpsc::Receiver<DispatchEvent>,
    ) -> Self {
        Self {
            handles,
            led: None,
            upload,
            live_debug: false,
            input_rx,
        }
    }

    /// Per-sink counters, in sink order
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Detections fan out without waiting; a session upload holds the loop
    /// until every sink has finished or aborted. Returns when the input
    /// channel is closed.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut detection_count: u64 = 0;
        let mut session_count: u64 = 0;

        while let Some(event) = self.input_rx.recv().await {
            match event {
                DispatchEvent::Detection(detection) => {
                    detection_count += 1;
                    self.dispatch_detection(detection);
                }
                DispatchEvent::Session { record, done } => {
                    session_count += 1;
                    let outcomes = self.upload_session(record).await;
                    if let Some(done) = done {
                        if done.send(outcomes).is_err() {
                            debug!("Upload outcome receiver dropped");
                        }
                    }
                }
            }
        }

        info!(
            detections = detection_count,
            sessions = session_count,
            "Dispatcher input closed, shutting down"
        );

        if let Some(led) = self.led {
            led.shutdown().await;
        }
        Self::shutdown_handles(self.handles).await;

        info!("Dispatcher shutdown complete");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Show a detection and queue it on every sink
    pub fn dispatch_detection(&self, detection: DetectionResult) {
        if let Some(led) = &self.led {
            led.show(detection.direction);
        }
        let detection = Arc::new(detection);
        for handle in &self.handles {
            handle.try_send(Arc::clone(&detection));
        }
    }

    /// Upload a finished session to every sink
    ///
    /// Sinks upload concurrently, each one batch by batch.
    #[instrument(
        name = "dispatcher_upload",
        skip(self, record),
        fields(session_id = %record.session_id, items = record.len())
    )]
    pub async fn upload_session(&self, record: SessionRecord) -> Vec<SinkUpload> {
        let mode = BatchMode::for_kind(record.kind, self.live_debug);
        let plan = UploadPlan::new(&self.upload, mode);
        let record = Arc::new(record);

        let mut pending = Vec::with_capacity(self.handles.len());
        for handle in &self.handles {
            let reply = handle.upload(Arc::clone(&record), plan).await;
            pending.push((handle.name().to_string(), reply));
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        for (sink, reply) in pending {
            let result = match reply {
                Ok(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(DispatcherError::worker_closed(&sink))),
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                warn!(sink = %sink, error = %e, "Session upload failed");
            }
            outcomes.push(SinkUpload { sink, result });
        }
        outcomes
    }

    async fn shutdown_handles(handles: Vec<SinkHandle>) {
        for handle in handles {
            handle.shutdown().await;
        }
    }
}

/// Dispatcher over `sink_configs` without an LED or live-debug batches
#[instrument(name = "dispatcher_create", skip(sink_configs, upload, input_rx))]
pub async fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    upload: UploadConfig,
    input_rx: mpsc::Receiver<DispatchEvent>,
) -> Result<Dispatcher, DispatcherError> {
    let config = DispatcherConfig {
        sinks: sink_configs,
        upload,
        live_debug: false,
    };
    DispatcherBuilder::new(config, input_rx).build().await
}
