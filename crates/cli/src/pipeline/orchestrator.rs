//! Pipeline orchestrator - coordinates all components.
//!
//! One run is one session: acquisition (simulated tree or replay) feeds the
//! detector and the session buffer, verdicts fan out to the LED and the
//! sinks, and the finished session is uploaded before shutdown.

use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_channel::Receiver;
use contracts::{ActiveSensor, DetectionResult, DeviceConfig, Position, Reading};
use detector::{CalibrationPublisher, CalibrationStore, DirectionDetector};
use dispatcher::{DispatchEvent, DispatcherBuilder, DispatcherConfig, LedResponder};
use hardware::{SimConfig, SimulatedBus};
use ingestion::{
    AcquisitionPipeline, JsonlRecorder, PipelineConfig as AcquisitionConfig, ReplayHandle,
    ReplaySource,
};
use observability::{
    record_calibration, record_queue_depth, record_session_summary, record_upload_outcome,
};
use session::{AcquisitionTotals, SessionManager};
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep_until;
use tracing::{debug, info, warn};

use super::source::{open_simulated, scripted_duration, scripted_transits, LogStrip};
use super::RunStats;

/// Queue depth is sampled once per this many readings
const QUEUE_DEPTH_SAMPLE: u64 = 1000;

/// Dispatcher input capacity
const DISPATCH_QUEUE: usize = 256;

/// Where the run takes its readings from
#[derive(Debug, Clone)]
pub enum SourceConfig {
    /// Simulated sensor tree with `passes` scripted transits
    Sim { passes: u32 },
    /// Recorded JSONL stream played back at `speed`
    Replay { path: PathBuf, speed: f64 },
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub device: DeviceConfig,

    pub source: SourceConfig,

    /// Session length (None = until the source ends or a signal)
    pub duration: Option<Duration>,

    /// Stop after this many detections (None = unlimited)
    pub max_detections: Option<u64>,

    /// Calibration file, overriding `calibration.store_path`
    pub calibration_path: Option<PathBuf>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    /// Record every reading to this JSONL file
    pub record_path: Option<PathBuf>,
}

/// Running acquisition of either kind
enum Acquisition {
    Sim(AcquisitionPipeline<SimulatedBus>),
    Replay(ReplayHandle),
}

impl Acquisition {
    /// Scan cycles run so far (replay has no scan engine)
    fn scan_cycles(&self) -> Option<u64> {
        match self {
            Self::Sim(pipeline) => Some(pipeline.metrics().snapshot().cycles),
            Self::Replay(_) => None,
        }
    }

    /// Stop producing and drain what was already queued. Cycles are counted
    /// from `cycles_at_start`, the engine count when the session opened.
    fn stop(
        &mut self,
        rx: &Receiver<Reading>,
        cycles_at_start: u64,
    ) -> Result<(Vec<Reading>, AcquisitionTotals)> {
        match self {
            Self::Sim(pipeline) => {
                // In-flight cycles post their readings before the drain
                let engine = pipeline.stop().context("Failed to stop acquisition")?;
                engine.shutdown();
                let pending = drain(rx);
                let snapshot = pipeline.metrics().snapshot();
                let totals = AcquisitionTotals {
                    per_sensor_i2c_errors: snapshot.i2c_errors,
                    queue_drops: snapshot.queue_drops,
                    scan_cycles: Some(snapshot.cycles.saturating_sub(cycles_at_start)),
                };
                Ok((pending, totals))
            }
            Self::Replay(handle) => {
                let pending = drain(rx);
                // Unblock a producer waiting on the full queue
                rx.close();
                let sent = handle.stop().context("Failed to stop replay")?;
                debug!(sent, "Replay stopped");
                Ok((pending, AcquisitionTotals::default()))
            }
        }
    }
}

fn drain(rx: &Receiver<Reading>) -> Vec<Reading> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

/// Per-reading work of the detection loop
struct Processing {
    detector: DirectionDetector,
    session: SessionManager,
    recorder: Option<JsonlRecorder>,
    dispatch_tx: mpsc::Sender<DispatchEvent>,
    stats: RunStats,
}

impl Processing {
    async fn on_reading(&mut self, reading: Reading) -> Result<()> {
        self.stats.readings += 1;
        if let Some(recorder) = &mut self.recorder {
            recorder.record(&reading).context("Failed to record reading")?;
        }
        self.session.ingest(reading)?;
        if let Some(detection) = self.detector.process(&reading) {
            self.on_detection(detection).await;
        }
        Ok(())
    }

    async fn on_detection(&mut self, detection: DetectionResult) {
        self.stats.detections.update(&detection);
        info!(
            direction = %detection.direction,
            confidence = format!("{:.2}", detection.confidence),
            boards = detection.modules_detected,
            best = %detection.detected_module,
            com_gap_ms = format!("{:.1}", detection.com_gap_ms),
            "Detection"
        );
        if self
            .dispatch_tx
            .send(DispatchEvent::Detection(detection))
            .await
            .is_err()
        {
            warn!("Dispatcher channel closed");
        }
    }

    fn limit_reached(&self, max_detections: Option<u64>) -> bool {
        max_detections.is_some_and(|max| self.stats.detections.total >= max)
    }
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run one session to completion
    ///
    /// `shutdown` ends collection early; the session is still closed and
    /// uploaded.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<RunStats> {
        let start_time = Instant::now();
        let device = &self.config.device;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Calibration
        let publisher = CalibrationPublisher::with_initial(self.load_calibration());
        let calibrated = match publisher.current() {
            Some(record) => {
                record_calibration(&record);
                info!(timestamp_ms = record.timestamp_ms, "Using fixed thresholds");
                true
            }
            None => {
                info!("No valid calibration, using adaptive thresholds");
                false
            }
        };
        let detector = DirectionDetector::new(device.detector.clone())
            .with_calibration(publisher.subscribe());

        // Acquisition
        let (mut acquisition, rx, active_sensors, clock, default_duration) =
            match &self.config.source {
                SourceConfig::Sim { passes } => {
                    info!(passes, "Running on the simulated sensor tree");
                    let sim = SimConfig::default().with_transits(&scripted_transits(*passes));
                    let engine = open_simulated(device, sim, true)?;
                    let clock = engine.clock();
                    let active: Vec<ActiveSensor> = engine
                        .active_positions()
                        .iter()
                        .map(|&position| ActiveSensor::from(position))
                        .collect();

                    let mut pipeline = AcquisitionPipeline::new(
                        engine,
                        AcquisitionConfig {
                            queue_capacity: device.sampling.queue_capacity,
                            cycle_rate_hz: device.sensor.sample_rate_hz,
                            pace: true,
                            max_cycles: None,
                        },
                    );
                    let rx = pipeline
                        .take_receiver()
                        .context("Failed to get acquisition receiver")?;
                    pipeline.start().context("Failed to start acquisition")?;
                    (
                        Acquisition::Sim(pipeline),
                        rx,
                        active,
                        clock,
                        Some(scripted_duration(*passes)),
                    )
                }
                SourceConfig::Replay { path, speed } => {
                    info!(path = %path.display(), speed, "Running in REPLAY mode");
                    let source = ReplaySource::load(path)
                        .with_context(|| format!("Failed to load recording {}", path.display()))?
                        .with_speed(*speed);
                    let active = seen_positions(source.readings());
                    let mut handle = source
                        .spawn(device.sampling.queue_capacity)
                        .context("Failed to start replay")?;
                    let rx = handle
                        .take_receiver()
                        .context("Failed to get replay receiver")?;
                    let clock: std::sync::Arc<dyn contracts::Clock> =
                        std::sync::Arc::new(contracts::MonotonicClock::new());
                    (Acquisition::Replay(handle), rx, active, clock, None)
                }
            };

        // Session
        let mut session = SessionManager::new(
            device.session.clone(),
            device.device.device_id.clone(),
            device.sensor.clone(),
            clock,
        );
        let active_count = active_sensors.len();
        session.set_active_sensors(active_sensors);
        let session_id = session.start_session()?.to_string();
        let cycles_at_start = acquisition.scan_cycles().unwrap_or(0);

        // Dispatcher
        if device.sinks.is_empty() {
            warn!("No sinks configured - detections are only shown locally");
        }
        let (dispatch_tx, dispatch_rx) = mpsc::channel(DISPATCH_QUEUE);
        let dispatcher = DispatcherBuilder::new(
            DispatcherConfig {
                sinks: device.sinks.clone(),
                upload: device.upload.clone(),
                live_debug: device.session.live_debug,
            },
            dispatch_rx,
        )
        .with_led(LedResponder::spawn(LogStrip::default(), device.led.clone()))
        .build()
        .await
        .context("Failed to create dispatcher")?;
        let dispatcher_handle = dispatcher.spawn();

        let recorder = match &self.config.record_path {
            Some(path) => Some(
                JsonlRecorder::create(path)
                    .with_context(|| format!("Failed to create recording {}", path.display()))?,
            ),
            None => None,
        };

        let mut processing = Processing {
            detector,
            session,
            recorder,
            dispatch_tx,
            stats: RunStats {
                active_sensors: active_count,
                active_sinks: device.sinks.len(),
                calibrated,
                session_id,
                ..Default::default()
            },
        };

        let duration = self.config.duration.or(default_duration);
        let deadline = duration.map(|d| tokio::time::Instant::now() + d);
        let max_detections = self.config.max_detections;
        info!(?duration, ?max_detections, "Pipeline running");

        tokio::pin!(shutdown);
        loop {
            let session_end = async {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, closing session");
                    processing.stats.interrupted = true;
                    break;
                }
                _ = session_end => {
                    info!("Session duration reached");
                    break;
                }
                next = rx.recv() => match next {
                    Ok(reading) => {
                        processing.on_reading(reading).await?;
                        if processing.stats.readings % QUEUE_DEPTH_SAMPLE == 0 {
                            record_queue_depth(rx.len());
                        }
                        if processing.limit_reached(max_detections) {
                            info!(detections = processing.stats.detections.total, "Reached max detections limit");
                            break;
                        }
                    }
                    Err(_) => {
                        info!("Reading source ended");
                        break;
                    }
                }
            }
        }

        // Close the session
        info!("Stopping acquisition...");
        let (pending, totals) = acquisition.stop(&rx, cycles_at_start)?;
        for reading in &pending {
            processing.stats.readings += 1;
            if let Some(recorder) = &mut processing.recorder {
                recorder.record(reading).context("Failed to record reading")?;
            }
            if let Some(detection) = processing.detector.process(reading) {
                processing.on_detection(detection).await;
            }
        }
        if let Some(detection) = processing.detector.flush() {
            processing.on_detection(detection).await;
        }
        if let Some(recorder) = processing.recorder.take() {
            let written = recorder.finish().context("Failed to finish recording")?;
            info!(written, "Recording saved");
        }

        let record = processing.session.stop_session(pending, totals)?;
        record_session_summary(&record.summary, record.duration_ms);
        processing.stats.session = Some(record.summary.clone());

        // Upload
        let (done_tx, done_rx) = oneshot::channel();
        processing
            .dispatch_tx
            .send(DispatchEvent::Session {
                record,
                done: Some(done_tx),
            })
            .await
            .context("Dispatcher stopped before the upload")?;
        let uploads = done_rx.await.unwrap_or_default();
        for upload in &uploads {
            record_upload_outcome(&upload.sink, upload.result.is_ok());
        }
        processing.stats.uploads = uploads;
        processing.session.upload_finished()?;

        // Shutdown
        info!("Shutting down pipeline...");
        let Processing {
            dispatch_tx,
            mut stats,
            ..
        } = processing;
        drop(dispatch_tx);
        if tokio::time::timeout(Duration::from_secs(5), dispatcher_handle)
            .await
            .is_err()
        {
            warn!("Dispatcher did not shut down in time");
        }

        stats.duration = start_time.elapsed();
        info!(
            duration_secs = stats.duration.as_secs_f64(),
            readings = stats.readings,
            detections = stats.detections.total,
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }

    /// Persisted calibration, when one is configured and valid
    fn load_calibration(&self) -> Option<contracts::CalibrationRecord> {
        let path = self.config.calibration_path.clone().or_else(|| {
            self.config
                .device
                .calibration
                .store_path
                .as_ref()
                .map(PathBuf::from)
        })?;
        CalibrationStore::new(path).load_valid()
    }
}

/// Positions present in a recording, in scan order
fn seen_positions(readings: &[Reading]) -> Vec<ActiveSensor> {
    let mut seen = [false; contracts::NUM_POSITIONS];
    for reading in readings {
        seen[reading.position.index()] = true;
    }
    Position::ALL
        .into_iter()
        .filter(|position| seen[position.index()])
        .map(ActiveSensor::from)
        .collect()
}
