//! Simulated sensor tree through detection, session and dispatch.

use std::sync::Arc;
use std::time::Duration;

use contracts::{
    Clock, DetectorConfig, Direction, Position, Reading, SensorSettings, SessionConfig,
    SessionRecord,
};
use detector::DirectionDetector;
use dispatcher::{DispatchEvent, Dispatcher, SinkHandle, SinkUpload};
use hardware::{MuxController, SimConfig, SimulatedBus, Transit, TCA_ADDRESS};
use ingestion::{AcquisitionPipeline, PipelineConfig, SamplingEngine};
use observability::DetectionMetricsAggregator;
use session::{AcquisitionTotals, SessionManager};
use tokio::sync::{mpsc, oneshot};

use crate::fixtures::{upload_recorded, RecordingSink};

fn transit(direction: Direction, entry_us: u64) -> Transit {
    Transit {
        board: None,
        direction,
        entry_us,
        lag_us: 30_000,
        half_width_us: 40_000,
        amplitude: 150,
    }
}

fn simulated_engine(sim: SimConfig) -> SamplingEngine<SimulatedBus> {
    let bus = SimulatedBus::new(sim);
    let clock = bus.clock();
    let mut mux = MuxController::with_address(bus, TCA_ADDRESS);
    let report = mux.discover().unwrap();
    assert_eq!(report.active_count(), 6);
    assert_eq!(report.complete_boards().len(), 3);

    let mut engine = SamplingEngine::new(mux, clock, SensorSettings::default());
    engine.initialize().unwrap();
    engine
}

fn session_manager(engine: &SamplingEngine<SimulatedBus>) -> SessionManager {
    let mut manager = SessionManager::new(
        SessionConfig {
            buffer_capacity: 100_000,
            ..SessionConfig::default()
        },
        "motionplay-device-001",
        SensorSettings::default(),
        engine.clock(),
    );
    manager.set_active_sensors(engine.report().active_sensors());
    manager
}

/// End-to-end: SimulatedBus -> SamplingEngine -> DirectionDetector ->
/// SessionManager -> Dispatcher
#[tokio::test]
async fn test_e2e_simulated_pipeline() {
    let sim = SimConfig {
        transaction_us: 50,
        ..SimConfig::default()
    }
    .with_transits(&[
        transit(Direction::AToB, 1_000_000),
        transit(Direction::BToA, 2_500_000),
    ]);
    let mut engine = simulated_engine(sim);
    let clock = engine.clock();

    let mut detector = DirectionDetector::new(DetectorConfig::default());
    let mut manager = session_manager(&engine);
    manager.start_session().unwrap();

    // Dispatcher with one recording sink
    let sink = RecordingSink::new("recorder");
    let recorded = Arc::clone(&sink.detections);
    let batches = Arc::clone(&sink.batches);
    let (tx, rx) = mpsc::channel::<DispatchEvent>(64);
    let upload = contracts::UploadConfig {
        inter_batch_delay_ms: 0,
        ..Default::default()
    };
    let dispatcher_handle =
        Dispatcher::with_handles(vec![SinkHandle::spawn(sink, 16)], upload, rx).spawn();

    let mut aggregator = DetectionMetricsAggregator::new();
    let mut readings: Vec<Reading> = Vec::new();
    let mut total_readings = 0usize;
    let mut cycles = 0u64;

    while clock.now_us() < 3_300_000 {
        readings.clear();
        engine.scan_cycle(&mut readings);
        cycles += 1;
        for reading in &readings {
            total_readings += 1;
            if let Some(detection) = detector.process(reading) {
                aggregator.update(&detection);
                tx.send(DispatchEvent::Detection(detection)).await.unwrap();
            }
            assert!(manager.ingest(*reading).unwrap());
        }
    }
    if let Some(detection) = detector.flush() {
        aggregator.update(&detection);
        tx.send(DispatchEvent::Detection(detection)).await.unwrap();
    }

    let record = manager
        .stop_session([], AcquisitionTotals::default())
        .unwrap();
    assert_eq!(record.summary.total_cycles, cycles);
    assert_eq!(record.readings.len(), total_readings);

    let (done_tx, done_rx) = oneshot::channel();
    tx.send(DispatchEvent::Session {
        record,
        done: Some(done_tx),
    })
    .await
    .unwrap();
    let outcomes: Vec<SinkUpload> = tokio::time::timeout(Duration::from_secs(10), done_rx)
        .await
        .expect("upload timed out")
        .unwrap();
    manager.upload_finished().unwrap();

    drop(tx);
    let _ = tokio::time::timeout(Duration::from_secs(2), dispatcher_handle).await;

    // Detection results
    assert_eq!(aggregator.total, 2, "one verdict per transit");
    assert_eq!(aggregator.a_to_b, 1);
    assert_eq!(aggregator.b_to_a, 1);
    let recorded = recorded.lock().unwrap();
    let directions: Vec<Direction> = recorded.iter().map(|d| d.direction).collect();
    assert_eq!(directions, [Direction::AToB, Direction::BToA]);
    assert!(recorded[0].t_us > 1_000_000 && recorded[0].t_us < 2_500_000);
    assert!(recorded[1].t_us > 2_500_000);

    // Upload results
    let report = outcomes[0].result.as_ref().unwrap();
    assert_eq!(report.items_sent, total_readings);
    assert_eq!(report.batches_sent, total_readings.div_ceil(25));
    let batches = batches.lock().unwrap();
    assert_eq!(batches.len(), report.batches_sent);
    assert!(batches[0].active_sensors.as_ref().is_some_and(|a| a.len() == 6));
}

/// Threaded acquisition with one flaky sensor; errors reach the session
/// summary through the acquisition totals
#[tokio::test]
async fn test_e2e_threaded_acquisition_counts_errors() {
    let flaky = Position::ALL[3];
    let sim = SimConfig {
        nack_rate: 0.2,
        flaky_positions: vec![flaky],
        ..SimConfig::default()
    };
    let engine = simulated_engine(sim);
    let mut manager = session_manager(&engine);
    manager.start_session().unwrap();

    let mut pipeline = AcquisitionPipeline::new(
        engine,
        PipelineConfig {
            queue_capacity: 8192,
            cycle_rate_hz: 1000,
            pace: false,
            max_cycles: Some(400),
        },
    );
    let rx = pipeline.take_receiver().unwrap();
    pipeline.start().unwrap();

    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        while pipeline.is_running() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(finished.is_ok(), "acquisition did not finish");
    pipeline.stop().unwrap();

    let snapshot = pipeline.metrics().snapshot();
    assert_eq!(snapshot.cycles, 400);
    assert_eq!(snapshot.queue_drops, 0);
    assert!(snapshot.i2c_errors[flaky.index()] > 0);
    assert_eq!(
        snapshot.readings[flaky.index()] + snapshot.i2c_errors[flaky.index()],
        400
    );

    let pending: Vec<Reading> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    let record: SessionRecord = manager
        .stop_session(
            pending,
            AcquisitionTotals {
                per_sensor_i2c_errors: snapshot.i2c_errors,
                queue_drops: snapshot.queue_drops,
                scan_cycles: Some(snapshot.cycles),
            },
        )
        .unwrap();

    assert_eq!(record.summary.total_cycles, 400);
    assert_eq!(record.summary.total_readings(), snapshot.total_readings());
    assert_eq!(
        record.summary.per_sensor_readings[flaky.index()],
        snapshot.readings[flaky.index()]
    );
    assert_eq!(
        record.summary.total_i2c_errors(),
        snapshot.i2c_errors.iter().sum::<u64>()
    );

    let (outcomes, uploaded) = upload_recorded(record).await;
    assert!(outcomes[0].result.is_ok());
    let sent: usize = uploaded.iter().map(|b| b.batch.count).sum();
    assert_eq!(sent as u64, snapshot.total_readings());
}
