//! Test doubles shared by the dispatcher unit tests

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use contracts::{
    ActiveSensor, BoardIndex, ContractError, DetectionResult, Direction, Position, Reading,
    ResultSink, SensorConfigReport, SensorSettings, SessionKind, SessionRecord, SessionSummary,
    UploadEnvelope,
};
use tokio::time::{sleep, Duration};

pub struct MockSink {
    pub name: String,
    pub detections: Arc<AtomicU64>,
    pub batches: Arc<Mutex<Vec<UploadEnvelope>>>,
    /// Batch index of every write attempt
    pub attempts: Arc<Mutex<Vec<usize>>>,
    pub delay_ms: u64,
    pub fail_detections: bool,
    /// Number of upcoming batch writes that fail with a connection error
    pub transient_failures: u32,
    /// Batch index that fails with a permanent write error
    pub fail_batch_at: Option<usize>,
}

impl MockSink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            detections: Arc::new(AtomicU64::new(0)),
            batches: Arc::new(Mutex::new(Vec::new())),
            attempts: Arc::new(Mutex::new(Vec::new())),
            delay_ms: 0,
            fail_detections: false,
            transient_failures: 0,
            fail_batch_at: None,
        }
    }
}

impl ResultSink for MockSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_detection(&mut self, _detection: &DetectionResult) -> Result<(), ContractError> {
        if self.delay_ms > 0 {
            sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_detections {
            return Err(ContractError::sink_write(&self.name, "mock failure"));
        }
        self.detections.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn write_batch(&mut self, envelope: &UploadEnvelope) -> Result<(), ContractError> {
        self.attempts.lock().unwrap().push(envelope.batch.index);
        if self.transient_failures > 0 {
            self.transient_failures -= 1;
            return Err(ContractError::sink_connection(&self.name, "mock link down"));
        }
        if self.fail_batch_at == Some(envelope.batch.index) {
            return Err(ContractError::sink_write(&self.name, "mock rejected batch"));
        }
        self.batches.lock().unwrap().push(envelope.clone());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}

pub fn detection(t_us: u64, direction: Direction) -> DetectionResult {
    DetectionResult {
        t_us,
        direction,
        confidence: if direction.is_known() { 0.7 } else { 0.0 },
        detected_module: BoardIndex::ALL[0],
        modules_detected: 1,
        com_gap_ms: 30.0,
        side_a: Default::default(),
        side_b: Default::default(),
        boards: Vec::new(),
    }
}

pub fn record(readings: usize) -> SessionRecord {
    SessionRecord {
        session_id: "001_100".into(),
        device_id: "motionplay-device-001".into(),
        kind: SessionKind::Proximity,
        start_time_ms: 100,
        duration_ms: 10,
        readings: (0..readings)
            .map(|i| Reading::new(i as u64, Position::ALL[i % 6], 20))
            .collect(),
        events: Vec::new(),
        active_sensors: Position::ALL.into_iter().map(ActiveSensor::from).collect(),
        sensor_config: SensorConfigReport::new(&SensorSettings::default(), 1000.0),
        summary: SessionSummary::default(),
    }
}
