//! # Dispatcher
//!
//! Result delivery.
//!
//! Responsibilities:
//! - Show each detection on the LED strip (`LedResponder`)
//! - Fan detections out to every sink without blocking the detector
//! - Upload finished sessions to each sink in sequential batches, retrying
//!   transient failures between batches
//! - Isolate slow or failing sinks behind their own queue and worker

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod led;
pub mod metrics;
pub mod sinks;
pub mod upload;

#[cfg(test)]
mod testing;

pub use contracts::{DetectionResult, ResultSink, UploadEnvelope};
pub use dispatcher::{
    create_dispatcher, DispatchEvent, Dispatcher, DispatcherBuilder, DispatcherConfig, SinkUpload,
};
pub use error::DispatcherError;
pub use handle::{SinkHandle, SinkMessage, UploadReply};
pub use led::LedResponder;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, LogSink, NetworkSink};
pub use upload::{upload_session, UploadPlan, UploadReport};
