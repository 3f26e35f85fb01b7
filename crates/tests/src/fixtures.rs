//! Synthetic streams and test doubles shared by the integration tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use contracts::{
    BoardIndex, ContractError, DetectionResult, Position, Reading, ResultSink, Side,
    UploadEnvelope, NUM_POSITIONS,
};
use detector::DirectionDetector;

/// Triangle from the scene baseline to `peak` over `2 * half_width_ms`
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub center_ms: f64,
    pub peak: f64,
    pub half_width_ms: f64,
}

/// The 60 ms wide bump used by the scenarios
pub fn bump(center_ms: f64, peak: f64) -> Triangle {
    Triangle {
        center_ms,
        peak,
        half_width_ms: 30.0,
    }
}

impl Triangle {
    fn level(&self, ms: u64, base: u16) -> Option<u16> {
        let distance = (ms as f64 - self.center_ms).abs();
        if distance >= self.half_width_ms {
            return None;
        }
        let base = f64::from(base);
        let level = base + (self.peak - base) * (1.0 - distance / self.half_width_ms);
        Some(level.round() as u16)
    }
}

/// Every position at a flat level, plus bumps and single-sample overrides.
/// One reading per position per millisecond, in position order.
pub struct Scene {
    base: u16,
    bumps: [Vec<Triangle>; NUM_POSITIONS],
    samples: HashMap<(usize, u64), u16>,
}

impl Scene {
    pub fn baseline(base: u16) -> Self {
        Self {
            base,
            bumps: Default::default(),
            samples: HashMap::new(),
        }
    }

    pub fn with(mut self, position: Position, triangle: Triangle) -> Self {
        self.bumps[position.index()].push(triangle);
        self
    }

    /// Bump on one board, the `first` side leading the other by `lag_ms`
    pub fn transit(self, board: BoardIndex, first: Side, center_ms: f64, lag_ms: f64) -> Self {
        let second = match first {
            Side::A => Side::B,
            Side::B => Side::A,
        };
        self.with(board.position(first), bump(center_ms, 180.0))
            .with(board.position(second), bump(center_ms + lag_ms, 180.0))
    }

    /// Replace the value of every position at `ms`
    pub fn with_sample_everywhere(mut self, ms: u64, value: u16) -> Self {
        for position in Position::ALL {
            self.samples.insert((position.index(), ms), value);
        }
        self
    }

    pub fn value(&self, position: Position, ms: u64) -> u16 {
        if let Some(value) = self.samples.get(&(position.index(), ms)) {
            return *value;
        }
        self.bumps[position.index()]
            .iter()
            .filter_map(|t| t.level(ms, self.base))
            .max()
            .unwrap_or(self.base)
    }

    pub fn readings(&self, ms: std::ops::Range<u64>) -> impl Iterator<Item = Reading> + '_ {
        ms.flat_map(move |t| {
            Position::ALL
                .into_iter()
                .map(move |position| Reading::new(t * 1000, position, self.value(position, t)))
        })
    }

    /// Feed `ms` cycles through `process`, then flush
    pub fn run(&self, detector: &mut DirectionDetector, ms: u64) -> Vec<DetectionResult> {
        let mut results: Vec<DetectionResult> = self
            .readings(0..ms)
            .filter_map(|reading| detector.process(&reading))
            .collect();
        results.extend(detector.flush());
        results
    }
}

/// Sink that keeps everything it receives
#[derive(Clone)]
pub struct RecordingSink {
    pub name: String,
    pub detections: Arc<Mutex<Vec<DetectionResult>>>,
    pub batches: Arc<Mutex<Vec<UploadEnvelope>>>,
}

impl RecordingSink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            detections: Arc::new(Mutex::new(Vec::new())),
            batches: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl ResultSink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_detection(&mut self, detection: &DetectionResult) -> Result<(), ContractError> {
        self.detections.lock().unwrap().push(detection.clone());
        Ok(())
    }

    async fn write_batch(&mut self, envelope: &UploadEnvelope) -> Result<(), ContractError> {
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

/// Upload one session through a dispatcher with a single recording sink
pub async fn upload_recorded(
    record: contracts::SessionRecord,
) -> (Vec<dispatcher::SinkUpload>, Vec<UploadEnvelope>) {
    use dispatcher::{DispatchEvent, Dispatcher, SinkHandle};
    use tokio::sync::{mpsc, oneshot};

    let sink = RecordingSink::new("recorder");
    let batches = Arc::clone(&sink.batches);
    let upload = contracts::UploadConfig {
        inter_batch_delay_ms: 0,
        retry_backoff_ms: 0,
        ..Default::default()
    };

    let (tx, rx) = mpsc::channel(4);
    let handle = Dispatcher::with_handles(vec![SinkHandle::spawn(sink, 16)], upload, rx).spawn();

    let (done_tx, done_rx) = oneshot::channel();
    tx.send(DispatchEvent::Session {
        record,
        done: Some(done_tx),
    })
    .await
    .unwrap();
    let outcomes = done_rx.await.unwrap();

    drop(tx);
    handle.await.unwrap();
    let batches = batches.lock().unwrap().clone();
    (outcomes, batches)
}
