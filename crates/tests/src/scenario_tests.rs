//! Direction scenarios on synthetic streams, one reading per position per
//! millisecond, detector defaults throughout.

use std::sync::Arc;

use approx::assert_relative_eq;
use contracts::{
    BoardIndex, CalibrationConfig, CalibrationSnapshot, DetectionResult, DetectorConfig, Direction,
    ManualClock, Position, Reading, SensorSettings, SessionConfig, Side,
};
use detector::{
    CalibrationPublisher, CalibrationWizard, DirectionDetector, WaveState, WizardEvent, WizardStep,
};
use session::{AcquisitionTotals, SessionManager};

use crate::fixtures::{upload_recorded, Scene};

fn s1_scene() -> Scene {
    Scene::baseline(20).transit(BoardIndex::ALL[0], Side::A, 300.0, 30.0)
}

fn run_s1() -> DetectionResult {
    let mut detector = DirectionDetector::new(DetectorConfig::default());
    let results = s1_scene().run(&mut detector, 600);
    assert_eq!(results.len(), 1, "S1 must emit exactly one verdict");
    results.into_iter().next().unwrap()
}

#[test]
fn test_s1_clean_a_to_b_on_board_one() {
    let result = run_s1();
    assert_eq!(result.direction, Direction::AToB);
    assert_eq!(result.detected_module, BoardIndex::ALL[0]);
    assert_eq!(result.modules_detected, 1);
    assert_relative_eq!(result.com_gap_ms, 30.0, epsilon = 1.0);
    assert!(
        (0.55..=0.85).contains(&result.confidence),
        "confidence {}",
        result.confidence
    );
}

#[test]
fn test_s2_consensus_b_to_a_on_every_board() {
    let single = run_s1();

    let scene = BoardIndex::ALL
        .into_iter()
        .fold(Scene::baseline(20), |scene, board| {
            scene.transit(board, Side::B, 305.0, 25.0)
        });
    let mut detector = DirectionDetector::new(DetectorConfig::default());
    let results = scene.run(&mut detector, 600);

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.direction, Direction::BToA);
    assert_eq!(result.modules_detected, 3);
    assert!(result.is_consensus());
    // Equal peak sums: the first board wins the tie
    assert_eq!(result.detected_module, BoardIndex::ALL[0]);
    assert_relative_eq!(result.confidence, 1.0);
    assert!(result.confidence > single.confidence + 0.2);
}

#[test]
fn test_s3_disagreeing_boards_are_unknown() {
    let single = run_s1();

    let scene = Scene::baseline(20)
        .transit(BoardIndex::ALL[0], Side::A, 300.0, 30.0)
        .transit(BoardIndex::ALL[1], Side::B, 300.0, 30.0);
    let mut detector = DirectionDetector::new(DetectorConfig::default());
    let results = scene.run(&mut detector, 600);

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.direction, Direction::Unknown);
    assert_eq!(result.modules_detected, 2);
    assert!(!result.is_consensus());
    // Best board's own confidence, no boost
    assert_relative_eq!(result.confidence, single.confidence, epsilon = 1e-9);
}

#[test]
fn test_s4_simultaneous_drop_is_ignored() {
    let scene = Scene::baseline(20).with_sample_everywhere(500, 5);
    let mut detector = DirectionDetector::new(DetectorConfig::default());
    let results = scene.run(&mut detector, 800);

    assert!(results.is_empty());
    for tracker in detector.trackers() {
        assert_eq!(tracker.state(), WaveState::Idle);
        // Every sample, the dip included, reached the baseline ring
        assert_eq!(tracker.baseline_updates(), 800);
        assert!(tracker.smoothed() <= 20.0);
    }
}

#[test]
fn test_s5_calibration_sets_every_threshold() {
    let publisher = CalibrationPublisher::new();
    let mut wizard = CalibrationWizard::new(
        CalibrationConfig::default(),
        CalibrationSnapshot::from(&SensorSettings::default()),
    )
    .with_publisher(publisher.clone());

    let mut t_us = 0;
    let mut feed = |wizard: &mut CalibrationWizard, ms: u64, value: &dyn Fn(Position) -> u16| {
        let mut events = Vec::new();
        for _ in 0..ms {
            for position in Position::ALL {
                events.extend(wizard.observe(&Reading::new(t_us, position, value(position))));
            }
            t_us += 1000;
        }
        events
    };

    wizard.start().unwrap();
    wizard.confirm();
    for board in BoardIndex::ALL {
        assert_eq!(wizard.step(), WizardStep::Baseline(board));
        feed(&mut wizard, 601, &|_: Position| 20);
        assert_eq!(wizard.step(), WizardStep::Approach(board));
        feed(&mut wizard, 700, &|p: Position| if p.board() == board { 150 } else { 20 });
    }
    assert_eq!(wizard.step(), WizardStep::Summary);
    feed(&mut wizard, 2100, &|_: Position| 20);
    let Some(WizardEvent::Completed(record)) = wizard.confirm() else {
        panic!("wizard did not complete");
    };
    assert!(record.is_valid());

    // Publishing happened on completion; a detector picks it up
    let mut detector =
        DirectionDetector::new(DetectorConfig::default()).with_calibration(publisher.subscribe());
    let results = s1_scene().run(&mut detector, 600);

    for tracker in detector.trackers() {
        assert!(tracker.is_calibrated());
        assert_relative_eq!(tracker.threshold().unwrap(), 85.0);
    }
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].direction, Direction::AToB);

    // A higher rolling baseline does not move a calibrated threshold
    let mut detector =
        DirectionDetector::new(DetectorConfig::default()).with_calibration(publisher.subscribe());
    Scene::baseline(60).run(&mut detector, 300);
    for tracker in detector.trackers() {
        assert_relative_eq!(tracker.threshold().unwrap(), 85.0);
    }
}

#[tokio::test]
async fn test_s6_session_upload_shape() {
    let clock = ManualClock::new(5_000_000);
    let mut manager = SessionManager::new(
        SessionConfig::default(),
        "motionplay-device-001",
        SensorSettings::default(),
        Arc::new(clock.clone()),
    );
    manager.set_active_sensors(Position::ALL.into_iter().map(Into::into).collect());
    manager.start_session().unwrap();

    for reading in Scene::baseline(20).readings(0..10) {
        assert!(manager.ingest(reading).unwrap());
    }
    clock.advance_us(10_000);
    let record = manager
        .stop_session([], AcquisitionTotals::default())
        .unwrap();

    let summary = &record.summary;
    assert_eq!(summary.total_cycles, 10);
    assert_eq!(summary.per_sensor_readings.iter().sum::<u64>(), 60);
    assert_relative_eq!(summary.measured_cycle_rate_hz, 1000.0);

    let (outcomes, batches) = upload_recorded(record).await;
    assert_eq!(outcomes.len(), 1);
    let report = outcomes[0].result.as_ref().unwrap();
    assert_eq!(report.batches_sent, 3);
    assert_eq!(report.items_sent, 60);

    let counts: Vec<usize> = batches.iter().map(|b| b.batch.count).collect();
    assert_eq!(counts, [25, 25, 10]);
    for (envelope, count) in batches.iter().zip(counts) {
        assert_eq!(envelope.batch.readings.len(), count);
        assert_eq!(envelope.session_id, "001_5000");
    }
    assert!(batches[0].batch.is_first);
    assert!(batches[0].summary.is_some());
    assert!(batches[1..]
        .iter()
        .all(|b| !b.batch.is_first && b.summary.is_none() && b.sensor_config.is_none()));

    manager.upload_finished().unwrap();
}
