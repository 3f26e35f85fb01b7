//! Single-assignment calibration handoff
//!
//! The wizard is the only writer. Detectors hold a subscription and see a
//! new record replace the old one in one step.

use std::sync::Arc;

use contracts::{CalibrationRecord, ContractError};
use tokio::sync::watch;
use tracing::info;

/// Read side handed to detectors
pub type CalibrationSubscription = watch::Receiver<Option<Arc<CalibrationRecord>>>;

/// Write side of the device calibration
#[derive(Debug, Clone)]
pub struct CalibrationPublisher {
    tx: Arc<watch::Sender<Option<Arc<CalibrationRecord>>>>,
}

impl CalibrationPublisher {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Start from a record loaded at boot; an invalid one is ignored
    pub fn with_initial(record: Option<CalibrationRecord>) -> Self {
        let publisher = Self::new();
        if let Some(record) = record.filter(CalibrationRecord::is_valid) {
            publisher.tx.send_replace(Some(Arc::new(record)));
        }
        publisher
    }

    /// Replace the current record. Invalid records are rejected and the
    /// previous one stays in force.
    pub fn publish(&self, record: CalibrationRecord) -> Result<(), ContractError> {
        if !record.is_valid() {
            let failed: Vec<String> = record
                .failed_boards()
                .iter()
                .map(ToString::to_string)
                .collect();
            return Err(ContractError::calibration(format!(
                "refusing to publish, failed boards: [{}]",
                failed.join(", ")
            )));
        }
        info!(timestamp_ms = record.timestamp_ms, "Publishing calibration");
        self.tx.send_replace(Some(Arc::new(record)));
        Ok(())
    }

    /// Drop the calibration; trackers fall back to adaptive thresholds
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    pub fn subscribe(&self) -> CalibrationSubscription {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Option<Arc<CalibrationRecord>> {
        self.tx.borrow().clone()
    }
}

impl Default for CalibrationPublisher {
    fn default() -> Self {
        Self::new()
    }
}
