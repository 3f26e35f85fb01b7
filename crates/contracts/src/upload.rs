//! Upload envelope - one batch of a session upload
//!
//! Every batch repeats the session identity; metadata travels only with
//! the first batch.

use serde::{Deserialize, Serialize};

use crate::{
    ActiveSensor, InterruptEvent, Reading, SensorConfigReport, SessionKind, SessionRecord,
    SessionSummary,
};

/// Batching mode of a session upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    Proximity,
    Interrupt,
    LiveDebug,
}

impl BatchMode {
    /// Default mode for a session kind
    pub fn for_kind(kind: SessionKind, live_debug: bool) -> Self {
        match (kind, live_debug) {
            (SessionKind::Interrupt, _) => Self::Interrupt,
            (SessionKind::Proximity, true) => Self::LiveDebug,
            (SessionKind::Proximity, false) => Self::Proximity,
        }
    }
}

/// Batch payload and position within the upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadBatch {
    /// Zero-based batch index
    pub index: usize,

    /// Total batches in this upload
    pub total: usize,

    pub is_first: bool,

    /// Number of items in this batch
    pub count: usize,

    /// Reading payload (proximity and live-debug batches)
    pub readings: Vec<Reading>,

    /// Event payload (interrupt batches)
    pub events: Vec<InterruptEvent>,
}

/// One uploaded record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadEnvelope {
    pub session_id: String,
    pub device_id: String,
    pub start_time_ms: u64,
    pub duration_ms: u64,

    /// First batch only
    pub sensor_config: Option<SensorConfigReport>,

    /// First batch only
    pub active_sensors: Option<Vec<ActiveSensor>>,

    /// First batch only
    pub summary: Option<SessionSummary>,

    pub batch: UploadBatch,
}

impl UploadEnvelope {
    /// Split a session into envelopes of at most `batch_size` items
    ///
    /// An empty session yields no envelopes.
    pub fn split(record: &SessionRecord, batch_size: usize) -> Vec<UploadEnvelope> {
        let batch_size = batch_size.max(1);
        let total = record.len().div_ceil(batch_size);

        (0..total)
            .map(|index| {
                let start = index * batch_size;
                let end = (start + batch_size).min(record.len());
                let is_first = index == 0;
                let (readings, events) = match record.kind {
                    SessionKind::Proximity => (record.readings[start..end].to_vec(), Vec::new()),
                    SessionKind::Interrupt => (Vec::new(), record.events[start..end].to_vec()),
                };

                UploadEnvelope {
                    session_id: record.session_id.clone(),
                    device_id: record.device_id.clone(),
                    start_time_ms: record.start_time_ms,
                    duration_ms: record.duration_ms,
                    sensor_config: is_first.then(|| record.sensor_config.clone()),
                    active_sensors: is_first.then(|| record.active_sensors.clone()),
                    summary: is_first.then(|| record.summary.clone()),
                    batch: UploadBatch {
                        index,
                        total,
                        is_first,
                        count: end - start,
                        readings,
                        events,
                    },
                }
            })
            .collect()
    }
}
