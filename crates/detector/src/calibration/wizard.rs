//! Calibration wizard
//!
//! Guided flow, one baseline and one approach capture per board:
//!
//! ```text
//! idle -> intro -> baseline(P1) -> approach(P1) -> ... -> approach(P3) -> summary -> complete
//! ```
//!
//! The wizard is driven by the reading stream and two user signals
//! (`confirm`, `cancel`). Step timing uses reading timestamps; a step's
//! clock starts with the first reading observed in it.

use std::fmt;

use contracts::{
    BoardCalibration, BoardIndex, CalibrationConfig, CalibrationRecord, CalibrationSnapshot,
    Reading, NUM_BOARDS,
};
use tracing::{debug, info, instrument, warn};

use crate::calibration::publisher::CalibrationPublisher;
use crate::calibration::stats::StatsAccumulator;
use crate::error::{DetectorError, Result};

/// Wizard step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WizardStep {
    #[default]
    Idle,
    Intro,
    /// Nothing in front of the board
    Baseline(BoardIndex),
    /// Object held in front of the board
    Approach(BoardIndex),
    Summary,
    Complete,
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Intro => f.write_str("intro"),
            Self::Baseline(board) => write!(f, "baseline_{board}"),
            Self::Approach(board) => write!(f, "approach_{board}"),
            Self::Summary => f.write_str("summary"),
            Self::Complete => f.write_str("complete"),
        }
    }
}

/// Outcome worth telling the operator about
#[derive(Debug, Clone, PartialEq)]
pub enum WizardEvent {
    /// Approach capture held long enough
    BoardCaptured {
        board: BoardIndex,
        calibration: BoardCalibration,
    },
    /// No sustained elevation before the approach timeout
    BoardTimedOut { board: BoardIndex },
    /// Record finalized and published
    Completed(CalibrationRecord),
    /// Summary found invalid boards; nothing was published
    Failed { boards: Vec<BoardIndex> },
    Cancelled,
}

/// Calibration state machine
pub struct CalibrationWizard {
    config: CalibrationConfig,
    sensor: CalibrationSnapshot,
    publisher: Option<CalibrationPublisher>,
    step: WizardStep,
    step_since_us: Option<u64>,
    last_t_us: Option<u64>,
    baseline: StatsAccumulator,
    signal: StatsAccumulator,
    /// Start of the current sustained elevation
    capture_since_us: Option<u64>,
    record: CalibrationRecord,
}

impl CalibrationWizard {
    pub fn new(config: CalibrationConfig, sensor: CalibrationSnapshot) -> Self {
        Self {
            config,
            sensor,
            publisher: None,
            step: WizardStep::Idle,
            step_since_us: None,
            last_t_us: None,
            baseline: StatsAccumulator::new(),
            signal: StatsAccumulator::new(),
            capture_since_us: None,
            record: CalibrationRecord::new(sensor),
        }
    }

    /// Publish completed records here
    pub fn with_publisher(mut self, publisher: CalibrationPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    /// Any step between `Idle` and `Complete`
    pub fn is_active(&self) -> bool {
        !matches!(self.step, WizardStep::Idle | WizardStep::Complete)
    }

    /// Record being built; finalized only after `Completed`
    pub fn record(&self) -> &CalibrationRecord {
        &self.record
    }

    #[instrument(name = "wizard_start", skip(self))]
    pub fn start(&mut self) -> Result<()> {
        if self.is_active() {
            return Err(DetectorError::WizardBusy {
                step: self.step.to_string(),
            });
        }
        self.record = CalibrationRecord::new(self.sensor);
        self.last_t_us = None;
        if self.config.intro_ms == 0 {
            self.enter(WizardStep::Baseline(BoardIndex::ALL[0]));
        } else {
            self.enter(WizardStep::Intro);
        }
        info!("Calibration started");
        Ok(())
    }

    /// User confirmation: skips the intro, completes the summary once it
    /// has been shown long enough
    #[instrument(name = "wizard_confirm", skip(self), fields(step = %self.step))]
    pub fn confirm(&mut self) -> Option<WizardEvent> {
        match self.step {
            WizardStep::Intro => {
                self.enter(WizardStep::Baseline(BoardIndex::ALL[0]));
                None
            }
            WizardStep::Summary => {
                if let Some(event) = self.check_summary() {
                    return Some(event);
                }
                let shown_us = match (self.step_since_us, self.last_t_us) {
                    (Some(since), Some(now)) => now.saturating_sub(since),
                    _ => 0,
                };
                if shown_us >= self.config.summary_min_ms * 1000 {
                    Some(self.complete())
                } else {
                    debug!(shown_ms = shown_us / 1000, "Summary not shown long enough");
                    None
                }
            }
            _ => None,
        }
    }

    /// Abort from any active step; the published calibration is untouched
    #[instrument(name = "wizard_cancel", skip(self), fields(step = %self.step))]
    pub fn cancel(&mut self) -> Option<WizardEvent> {
        if !self.is_active() {
            return None;
        }
        self.enter(WizardStep::Idle);
        metrics::counter!("motion_play_calibration_total", "status" => "cancelled").increment(1);
        info!("Calibration cancelled");
        Some(WizardEvent::Cancelled)
    }

    /// Advance on one reading
    pub fn observe(&mut self, reading: &Reading) -> Option<WizardEvent> {
        if !self.is_active() {
            return None;
        }
        let t_us = reading.t_us;
        self.last_t_us = Some(t_us);
        let since = *self.step_since_us.get_or_insert(t_us);
        let elapsed_us = t_us.saturating_sub(since);

        match self.step {
            WizardStep::Intro => {
                if elapsed_us >= self.config.intro_ms * 1000 {
                    self.enter(WizardStep::Baseline(BoardIndex::ALL[0]));
                }
                None
            }
            WizardStep::Baseline(board) => {
                if reading.position.board() == board {
                    self.baseline.push(reading.proximity);
                }
                if elapsed_us >= self.config.baseline_window_ms * 1000 {
                    debug!(
                        board = %board,
                        samples = self.baseline.count(),
                        max = self.baseline.max(),
                        "Baseline captured"
                    );
                    self.enter(WizardStep::Approach(board));
                }
                None
            }
            WizardStep::Approach(board) => self.observe_approach(board, reading, elapsed_us),
            WizardStep::Summary => self.check_summary(),
            WizardStep::Idle | WizardStep::Complete => None,
        }
    }

    fn observe_approach(
        &mut self,
        board: BoardIndex,
        reading: &Reading,
        elapsed_us: u64,
    ) -> Option<WizardEvent> {
        let t_us = reading.t_us;
        let baseline_max = self.baseline.max();
        let elevated_above = (f64::from(baseline_max) * self.config.elevation_factor)
            .max(f64::from(self.config.elevation_floor));
        let lost_below = baseline_max.saturating_add(self.config.elevation_lost_margin);

        if reading.position.board() == board {
            let value = reading.proximity;
            if f64::from(value) > elevated_above {
                if self.capture_since_us.is_none() {
                    self.capture_since_us = Some(t_us);
                    self.signal.reset();
                }
                self.signal.push(value);
            } else if value < lost_below && self.capture_since_us.is_some() {
                debug!(board = %board, value, "Elevation lost, capture restarts");
                self.capture_since_us = None;
                self.signal.reset();
            }
        }

        if let Some(start) = self.capture_since_us {
            if t_us.saturating_sub(start) >= self.config.sustain_ms * 1000 {
                let calibration = self.finish_board(board);
                return Some(WizardEvent::BoardCaptured { board, calibration });
            }
        }

        if elapsed_us >= self.config.approach_timeout_ms * 1000 {
            warn!(board = %board, "No sustained signal before timeout");
            self.signal.reset();
            self.finish_board(board);
            return Some(WizardEvent::BoardTimedOut { board });
        }
        None
    }

    /// Fill the board's entry and move to the next board or the summary
    fn finish_board(&mut self, board: BoardIndex) -> BoardCalibration {
        let mut entry = BoardCalibration::empty(board);
        entry.baseline_min = self.baseline.min();
        entry.baseline_max = self.baseline.max();
        entry.baseline_mean = self.baseline.mean();
        entry.baseline_stddev = self.baseline.stddev();
        entry.signal_min = self.signal.min();
        entry.signal_max = self.signal.max();
        entry.signal_mean = self.signal.mean();
        entry.compute_threshold();
        entry.valid = entry.baseline_stddev.is_finite()
            && !self.signal.is_empty()
            && entry.baseline_max < entry.signal_min
            && self.baseline.count() >= self.config.min_samples
            && self.signal.count() >= self.config.min_samples;

        info!(
            board = %board,
            baseline_max = entry.baseline_max,
            signal_min = entry.signal_min,
            threshold = entry.threshold,
            valid = entry.valid,
            "Board calibrated"
        );
        self.record.boards[board.index()] = entry.clone();

        let next = board.index() + 1;
        if next < NUM_BOARDS {
            self.enter(WizardStep::Baseline(BoardIndex::ALL[next]));
        } else {
            self.enter(WizardStep::Summary);
        }
        entry
    }

    fn check_summary(&mut self) -> Option<WizardEvent> {
        let failed = self.record.failed_boards();
        if failed.is_empty() {
            return None;
        }
        warn!(failed = ?failed, "Calibration failed, keeping previous");
        metrics::counter!("motion_play_calibration_total", "status" => "failed").increment(1);
        self.enter(WizardStep::Idle);
        Some(WizardEvent::Failed { boards: failed })
    }

    fn complete(&mut self) -> WizardEvent {
        let timestamp_ms = self.last_t_us.unwrap_or(0) / 1000;
        self.record.finalize(timestamp_ms);

        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish(self.record.clone()) {
                warn!(error = %e, "Calibration not published");
                self.enter(WizardStep::Idle);
                return WizardEvent::Failed {
                    boards: self.record.failed_boards(),
                };
            }
        }

        metrics::counter!("motion_play_calibration_total", "status" => "completed").increment(1);
        info!(timestamp_ms, "Calibration complete");
        self.enter(WizardStep::Complete);
        WizardEvent::Completed(self.record.clone())
    }

    fn enter(&mut self, step: WizardStep) {
        debug!(from = %self.step, to = %step, "Wizard step");
        self.step = step;
        self.step_since_us = None;
        match step {
            WizardStep::Baseline(_) => {
                self.baseline.reset();
                self.signal.reset();
                self.capture_since_us = None;
            }
            WizardStep::Approach(_) => {
                self.signal.reset();
                self.capture_since_us = None;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Position, SensorSettings};

    /// Feeds all six positions every millisecond
    struct Feed {
        t_us: u64,
    }

    impl Feed {
        fn new() -> Self {
            Self { t_us: 0 }
        }

        /// Run `ms` cycles; `value` picks each position's reading
        fn run(
            &mut self,
            wizard: &mut CalibrationWizard,
            ms: u64,
            value: impl Fn(Position) -> u16,
        ) -> Vec<WizardEvent> {
            let mut events = Vec::new();
            for _ in 0..ms {
                for position in Position::ALL {
                    let reading = Reading::new(self.t_us, position, value(position));
                    events.extend(wizard.observe(&reading));
                }
                self.t_us += 1000;
            }
            events
        }
    }

    fn wizard() -> CalibrationWizard {
        CalibrationWizard::new(
            CalibrationConfig::default(),
            CalibrationSnapshot::from(&SensorSettings::default()),
        )
    }

    /// Baseline, then hold 150 in front of the board being approached
    fn run_all_boards(wizard: &mut CalibrationWizard, feed: &mut Feed) -> Vec<WizardEvent> {
        let mut events = Vec::new();
        for board in BoardIndex::ALL {
            assert_eq!(wizard.step(), WizardStep::Baseline(board));
            events.extend(feed.run(wizard, 601, |_| 20));
            assert_eq!(wizard.step(), WizardStep::Approach(board));
            events.extend(feed.run(wizard, 700, |p| if p.board() == board { 150 } else { 20 }));
        }
        events
    }

    #[test]
    fn test_full_run_publishes_record() {
        let publisher = CalibrationPublisher::new();
        let mut wizard = wizard().with_publisher(publisher.clone());
        let mut feed = Feed::new();

        wizard.start().unwrap();
        assert_eq!(wizard.step(), WizardStep::Intro);
        assert!(wizard.confirm().is_none());

        let events = run_all_boards(&mut wizard, &mut feed);
        let captured = events
            .iter()
            .filter(|e| matches!(e, WizardEvent::BoardCaptured { .. }))
            .count();
        assert_eq!(captured, 3);
        assert_eq!(wizard.step(), WizardStep::Summary);

        // Summary must be shown for two seconds first
        feed.run(&mut wizard, 100, |_| 20);
        assert!(wizard.confirm().is_none());
        feed.run(&mut wizard, 2000, |_| 20);
        let Some(WizardEvent::Completed(record)) = wizard.confirm() else {
            panic!("expected completion");
        };

        assert!(record.is_valid());
        for board in BoardIndex::ALL {
            assert_eq!(record.threshold_for(board), Some(85));
            let entry = &record.boards[board.index()];
            assert_eq!(entry.baseline_max, 20);
            assert_eq!(entry.signal_min, 150);
            assert_eq!(entry.baseline_stddev, 0.0);
        }
        assert_eq!(wizard.step(), WizardStep::Complete);
        assert_eq!(publisher.current().as_deref(), Some(&record));
    }

    #[test]
    fn test_intro_times_out_by_itself() {
        let mut wizard = wizard();
        let mut feed = Feed::new();
        wizard.start().unwrap();
        feed.run(&mut wizard, 3000, |_| 20);
        assert_eq!(wizard.step(), WizardStep::Intro);
        feed.run(&mut wizard, 2, |_| 20);
        assert_eq!(wizard.step(), WizardStep::Baseline(BoardIndex::ALL[0]));
    }

    #[test]
    fn test_approach_timeout_fails_summary() {
        let publisher = CalibrationPublisher::new();
        let mut wizard = wizard().with_publisher(publisher.clone());
        let mut feed = Feed::new();
        wizard.start().unwrap();
        wizard.confirm();

        feed.run(&mut wizard, 601, |_| 20);
        let events = feed.run(&mut wizard, 10_001, |_| 20);
        assert_eq!(
            events,
            [WizardEvent::BoardTimedOut {
                board: BoardIndex::ALL[0]
            }]
        );
        assert_eq!(wizard.step(), WizardStep::Baseline(BoardIndex::ALL[1]));

        // Remaining boards succeed; the summary still fails on P1
        let mut events = Vec::new();
        for board in &BoardIndex::ALL[1..] {
            events.extend(feed.run(&mut wizard, 601, |_| 20));
            let board = *board;
            events.extend(feed.run(&mut wizard, 700, |p| if p.board() == board { 150 } else { 20 }));
        }
        events.extend(feed.run(&mut wizard, 1, |_| 20));
        assert_eq!(
            events.last(),
            Some(&WizardEvent::Failed {
                boards: vec![BoardIndex::ALL[0]]
            })
        );
        assert_eq!(wizard.step(), WizardStep::Idle);
        assert!(publisher.current().is_none());
    }

    #[test]
    fn test_lost_elevation_restarts_capture() {
        let mut wizard = wizard();
        let mut feed = Feed::new();
        wizard.start().unwrap();
        wizard.confirm();
        feed.run(&mut wizard, 601, |_| 20);

        // 400 ms elevated, drop back to baseline, then 400 ms again: not sustained
        feed.run(&mut wizard, 400, |_| 150);
        feed.run(&mut wizard, 1, |_| 20);
        let events = feed.run(&mut wizard, 400, |_| 150);
        assert!(events.is_empty());
        assert_eq!(wizard.step(), WizardStep::Approach(BoardIndex::ALL[0]));

        let events = feed.run(&mut wizard, 101, |_| 150);
        assert!(matches!(
            events.as_slice(),
            [WizardEvent::BoardCaptured { board, .. }] if *board == BoardIndex::ALL[0]
        ));
    }

    #[test]
    fn test_signal_below_elevation_is_ignored() {
        let mut wizard = wizard();
        let mut feed = Feed::new();
        wizard.start().unwrap();
        wizard.confirm();
        feed.run(&mut wizard, 601, |_| 20);
        // max(20 * 2, 10) = 40; 40 is not above it
        feed.run(&mut wizard, 1000, |_| 40);
        assert_eq!(wizard.step(), WizardStep::Approach(BoardIndex::ALL[0]));
        assert!(wizard.signal.is_empty());
    }

    #[test]
    fn test_cancel_and_restart() {
        let mut wizard = wizard();
        assert!(wizard.cancel().is_none());
        wizard.start().unwrap();
        assert!(matches!(wizard.start(), Err(DetectorError::WizardBusy { .. })));
        assert_eq!(wizard.cancel(), Some(WizardEvent::Cancelled));
        assert_eq!(wizard.step(), WizardStep::Idle);
        wizard.start().unwrap();
    }

    #[test]
    fn test_readings_ignored_when_idle() {
        let mut wizard = wizard();
        let mut feed = Feed::new();
        assert!(feed.run(&mut wizard, 10, |_| 500).is_empty());
        assert_eq!(wizard.step(), WizardStep::Idle);
    }
}
