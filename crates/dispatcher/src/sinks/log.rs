//! LogSink - logs detections and upload batches via tracing

use contracts::{ContractError, DetectionResult, ResultSink, UploadEnvelope};
use tracing::{info, instrument};

/// Sink that logs summaries for debugging
pub struct LogSink {
    name: String,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ResultSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write_detection",
        skip(self, detection),
        fields(sink = %self.name, t_us = detection.t_us)
    )]
    async fn write_detection(&mut self, detection: &DetectionResult) -> Result<(), ContractError> {
        info!(
            sink = %self.name,
            direction = %detection.direction,
            confidence = detection.confidence,
            module = %detection.detected_module,
            modules = detection.modules_detected,
            com_gap_ms = detection.com_gap_ms,
            "Detection"
        );
        Ok(())
    }

    #[instrument(
        name = "log_sink_write_batch",
        skip(self, envelope),
        fields(sink = %self.name, session_id = %envelope.session_id)
    )]
    async fn write_batch(&mut self, envelope: &UploadEnvelope) -> Result<(), ContractError> {
        info!(
            sink = %self.name,
            batch = envelope.batch.index,
            total = envelope.batch.total,
            count = envelope.batch.count,
            first = envelope.batch.is_first,
            "Upload batch"
        );
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
