//! # Ingestion
//!
//! Sensor acquisition.
//!
//! Responsibilities:
//! - Scan every present sensor once per cycle (`SamplingEngine`)
//! - Run the scan on a dedicated thread and publish readings into a bounded
//!   queue that drops when full (`AcquisitionPipeline`)
//! - Count readings, bus errors and drops per position (`ScanMetrics`)
//! - Resolve board-level interrupt edges into events (`InterruptScanner`)
//! - Replay and record JSONL reading streams (`ReplaySource`, `JsonlRecorder`)
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{AcquisitionPipeline, PipelineConfig, SamplingEngine};
//!
//! let mut engine = SamplingEngine::new(mux, clock, settings);
//! engine.initialize()?;
//!
//! let mut pipeline = AcquisitionPipeline::new(engine, PipelineConfig::default());
//! let rx = pipeline.take_receiver().unwrap();
//! pipeline.start()?;
//! while let Ok(reading) = rx.recv().await {
//!     // Feed the detector
//! }
//! ```

mod engine;
mod error;
mod interrupt;
mod metrics;
mod pipeline;
mod replay;

pub use engine::{CycleReport, SamplingEngine, DEFAULT_TRANSACTION_TIMEOUT_MS};
pub use error::{IngestionError, Result};
pub use interrupt::{EdgeSender, InterruptScanner, LineEdge};
pub use metrics::{ScanMetrics, ScanSnapshot};
pub use pipeline::{AcquisitionPipeline, PipelineConfig};
pub use replay::{JsonlRecorder, ReplayHandle, ReplaySource};
