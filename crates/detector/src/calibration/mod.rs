//! Calibration: guided capture, handoff and persistence

pub mod publisher;
pub mod stats;
pub mod store;
pub mod wizard;

pub use publisher::{CalibrationPublisher, CalibrationSubscription};
pub use stats::StatsAccumulator;
pub use store::CalibrationStore;
pub use wizard::{CalibrationWizard, WizardEvent, WizardStep};
