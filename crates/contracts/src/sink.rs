//! ResultSink trait - Dispatcher output interface
//!
//! Sinks receive detections as they happen and session uploads batch by
//! batch.

use crate::{ContractError, DetectionResult, UploadEnvelope};

/// Result output trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(ResultSink: Send)]
pub trait LocalResultSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one detection verdict
    async fn write_detection(&mut self, detection: &DetectionResult) -> Result<(), ContractError>;

    /// Write one batch of a session upload
    ///
    /// # Errors
    /// Connection-class failures should be reported as
    /// `ContractError::SinkConnection` so the uploader can retry them.
    async fn write_batch(&mut self, envelope: &UploadEnvelope) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
