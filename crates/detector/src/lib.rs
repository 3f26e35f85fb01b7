//! # Detector
//!
//! Direction detection from the reading stream.
//!
//! Responsibilities:
//! - Per-sensor smoothing, baseline learning and wave tracking (`WaveTracker`)
//! - Pairing side A and side B waves of one board (`pair_board`)
//! - Cross-board consensus and confidence (`DirectionDetector`)
//! - Guided calibration, its handoff to detectors and its persistence
//!   (`CalibrationWizard`, `CalibrationPublisher`, `CalibrationStore`)
//!
//! ## Usage Example
//!
//! ```ignore
//! use detector::{CalibrationPublisher, DirectionDetector};
//!
//! let publisher = CalibrationPublisher::with_initial(store.load_valid());
//! let mut detector = DirectionDetector::new(config.detector.clone())
//!     .with_calibration(publisher.subscribe());
//!
//! while let Ok(reading) = rx.recv().await {
//!     if let Some(result) = detector.process(&reading) {
//!         // Show and dispatch the verdict
//!     }
//! }
//! ```

mod calibration;
mod consensus;
mod detector;
mod error;
mod pairer;
mod ring;
mod tracker;

#[cfg(test)]
mod fixtures;

pub use calibration::{
    CalibrationPublisher, CalibrationStore, CalibrationSubscription, CalibrationWizard,
    StatsAccumulator, WizardEvent, WizardStep,
};
pub use consensus::{base_confidence, best_board, combine, consensus_direction};
pub use detector::DirectionDetector;
pub use error::{DetectorError, Result};
pub use pairer::{pair_board, BoardDetection};
pub use ring::SampleRing;
pub use tracker::{CompletedWave, WaveState, WaveTracker};
