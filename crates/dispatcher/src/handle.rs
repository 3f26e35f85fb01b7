//! SinkHandle - manages a sink with isolated queue and worker task

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{DetectionResult, ResultSink, SessionRecord};

use crate::error::DispatcherError;
use crate::metrics::SinkMetrics;
use crate::upload::{upload_session, UploadPlan, UploadReport};

/// Reply to an upload request
pub type UploadReply = oneshot::Receiver<Result<UploadReport, DispatcherError>>;

/// Work item for a sink worker
pub enum SinkMessage {
    /// Fire-and-forget detection
    Detection(Arc<DetectionResult>),

    /// Batched upload of one finished session
    Upload {
        record: Arc<SessionRecord>,
        plan: UploadPlan,
        reply: oneshot::Sender<Result<UploadReport, DispatcherError>>,
    },
}

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Channel to send work to the worker
    tx: mpsc::Sender<SinkMessage>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    pub fn spawn<S: ResultSink + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue a detection (non-blocking)
    ///
    /// Returns true if queued, false if the queue was full (detection dropped)
    pub fn try_send(&self, detection: Arc<DetectionResult>) -> bool {
        let t_us = detection.t_us;
        match self.tx.try_send(SinkMessage::Detection(detection)) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.inc_dropped_count();
                metrics::counter!("motion_play_sink_dropped_total", "sink" => self.name.clone())
                    .increment(1);
                warn!(sink = %self.name, t_us, "Queue full, detection dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Queue a session upload, waiting for queue space
    ///
    /// Uploads are never dropped; the returned receiver resolves once the
    /// worker has sent every batch or aborted.
    pub async fn upload(
        &self,
        record: Arc<SessionRecord>,
        plan: UploadPlan,
    ) -> Result<UploadReply, DispatcherError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SinkMessage::Upload {
                record,
                plan,
                reply,
            })
            .await
            .map_err(|_| DispatcherError::worker_closed(&self.name))?;
        Ok(rx)
    }

    /// Shutdown the sink worker gracefully
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

/// Worker task that consumes work items and writes to the sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: ResultSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<SinkMessage>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(message) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match message {
            SinkMessage::Detection(detection) => match sink.write_detection(&detection).await {
                Ok(()) => metrics.inc_detections(),
                Err(e) => {
                    // A failed detection write never stops the worker
                    metrics.inc_failure_count();
                    error!(
                        sink = %name,
                        t_us = detection.t_us,
                        error = %e,
                        "Detection write failed"
                    );
                }
            },
            SinkMessage::Upload {
                record,
                plan,
                reply,
            } => {
                let outcome = upload_session(&mut sink, &record, &plan, &metrics).await;
                if reply.send(outcome).is_err() {
                    debug!(sink = %name, "Upload requester went away");
                }
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}
