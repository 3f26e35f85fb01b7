//! Per-sensor wave tracker
//!
//! Smooths raw proximity, learns a baseline while idle and follows one wave
//! envelope at a time: idle -> in_wave -> complete -> idle. The tracker is
//! pure: it sees one reading at a time and knows nothing about scheduling.

use contracts::{DetectorConfig, Position};
use tracing::trace;

use crate::ring::SampleRing;

/// Wave envelope state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaveState {
    #[default]
    Idle,
    InWave,
    Complete,
}

/// A finished wave, as seen by the pairer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletedWave {
    pub start_us: u64,
    pub end_us: u64,
    pub peak: f64,
    pub peak_time_us: u64,
    /// Signal-weighted mean time (us)
    pub center_of_mass_us: f64,
    pub baseline_max: f64,
    pub threshold: f64,
}

impl CompletedWave {
    pub fn duration_ms(&self) -> f64 {
        (self.end_us - self.start_us) as f64 / 1000.0
    }

    pub fn center_of_mass_ms(&self) -> f64 {
        self.center_of_mass_us / 1000.0
    }

    pub fn peak_time_ms(&self) -> f64 {
        self.peak_time_us as f64 / 1000.0
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct WaveFields {
    start_us: u64,
    end_us: u64,
    peak: f64,
    peak_time_us: u64,
    /// Sum of smoothed * (t - start), in us
    weighted_sum: f64,
    total_weight: f64,
    center_of_mass_us: f64,
}

/// Baseline, threshold and wave envelope of one sensor
#[derive(Debug)]
pub struct WaveTracker {
    position: Position,
    config: DetectorConfig,
    smoothing: SampleRing,
    baseline: SampleRing,
    baseline_ready: bool,
    baseline_updates: u64,
    updates_since_recompute: usize,
    /// `None` until the baseline is ready
    threshold: Option<f64>,
    /// Fixed threshold from a valid calibration
    calibrated: Option<f64>,
    state: WaveState,
    wave: WaveFields,
    last_smoothed: f64,
}

impl WaveTracker {
    pub fn new(position: Position, config: &DetectorConfig) -> Self {
        Self {
            position,
            config: config.clone(),
            smoothing: SampleRing::new(config.smoothing_window),
            baseline: SampleRing::new(config.baseline_window),
            baseline_ready: false,
            baseline_updates: 0,
            updates_since_recompute: 0,
            threshold: None,
            calibrated: None,
            state: WaveState::Idle,
            wave: WaveFields::default(),
            last_smoothed: 0.0,
        }
    }

    /// Feed one raw proximity sample taken at `t_us`
    pub fn update(&mut self, t_us: u64, proximity: u16) -> WaveState {
        self.smoothing.push(f64::from(proximity));
        let smoothed = self.smoothing.mean();
        self.last_smoothed = smoothed;

        // An unpaired wave expires before this sample is considered
        if self.state == WaveState::Complete
            && (t_us.saturating_sub(self.wave.end_us) as f64) > self.config.max_peak_gap_ms * 1000.0
        {
            trace!(position = %self.position, "Unpaired wave expired");
            self.reset_wave();
        }

        if self.state == WaveState::Idle {
            self.push_baseline(smoothed);
        }

        let Some(threshold) = self.threshold else {
            return self.state;
        };

        match self.state {
            WaveState::Idle => {
                if smoothed > threshold {
                    self.state = WaveState::InWave;
                    self.wave = WaveFields {
                        start_us: t_us,
                        peak: smoothed,
                        peak_time_us: t_us,
                        weighted_sum: 0.0,
                        total_weight: smoothed,
                        ..WaveFields::default()
                    };
                    trace!(position = %self.position, t_us, smoothed, threshold, "Wave started");
                }
            }
            WaveState::InWave => {
                if smoothed > self.wave.peak {
                    self.wave.peak = smoothed;
                    self.wave.peak_time_us = t_us;
                }
                let offset = (t_us - self.wave.start_us) as f64;
                self.wave.weighted_sum += smoothed * offset;
                self.wave.total_weight += smoothed;

                let exit_level = threshold.max(self.wave.peak * self.config.exit_fraction);
                let elapsed_ms = offset / 1000.0;
                if smoothed < exit_level || elapsed_ms > self.config.max_wave_duration_ms {
                    self.complete_wave(t_us);
                }
            }
            WaveState::Complete => {}
        }

        self.state
    }

    fn push_baseline(&mut self, smoothed: f64) {
        self.baseline.push(smoothed);
        self.baseline_updates += 1;

        if !self.baseline_ready {
            if self.baseline.is_full() {
                self.baseline_ready = true;
                self.recompute_threshold();
                trace!(position = %self.position, threshold = ?self.threshold, "Baseline ready");
            }
            return;
        }

        self.updates_since_recompute += 1;
        if self.updates_since_recompute >= self.config.recompute_interval {
            self.recompute_threshold();
        }
    }

    fn complete_wave(&mut self, t_us: u64) {
        self.wave.end_us = t_us;
        let com_offset = if self.wave.total_weight > 0.0 {
            self.wave.weighted_sum / self.wave.total_weight
        } else {
            (self.wave.peak_time_us - self.wave.start_us) as f64
        };
        self.wave.center_of_mass_us = self.wave.start_us as f64 + com_offset;
        self.state = WaveState::Complete;
        trace!(
            position = %self.position,
            peak = self.wave.peak,
            duration_ms = (t_us - self.wave.start_us) as f64 / 1000.0,
            "Wave complete"
        );
    }

    fn recompute_threshold(&mut self) {
        self.updates_since_recompute = 0;
        if !self.baseline_ready {
            self.threshold = None;
            return;
        }
        self.threshold = Some(self.calibrated.unwrap_or_else(|| self.adaptive_threshold()));
    }

    /// `baseline_max + max(baseline_max * (multiplier - 1), min_rise)`
    pub fn adaptive_threshold(&self) -> f64 {
        let baseline_max = self.baseline.max();
        let rise = (baseline_max * (self.config.peak_multiplier - 1.0)).max(self.config.min_rise);
        baseline_max + rise
    }

    /// Install or clear a calibrated threshold; a ready tracker re-derives
    /// its threshold immediately
    pub fn set_calibrated_threshold(&mut self, threshold: Option<u16>) {
        self.calibrated = threshold.map(f64::from);
        if self.baseline_ready {
            self.recompute_threshold();
        }
    }

    /// Back to idle; baseline, smoothing and threshold survive
    pub fn reset_wave(&mut self) {
        self.state = WaveState::Idle;
        self.wave = WaveFields::default();
    }

    /// Back to the freshly constructed state, keeping the calibration
    pub fn full_reset(&mut self) {
        self.reset_wave();
        self.smoothing.clear();
        self.baseline.clear();
        self.baseline_ready = false;
        self.baseline_updates = 0;
        self.updates_since_recompute = 0;
        self.threshold = None;
        self.last_smoothed = 0.0;
    }

    /// The finished wave, while in `Complete`
    pub fn completed(&self) -> Option<CompletedWave> {
        (self.state == WaveState::Complete).then(|| CompletedWave {
            start_us: self.wave.start_us,
            end_us: self.wave.end_us,
            peak: self.wave.peak,
            peak_time_us: self.wave.peak_time_us,
            center_of_mass_us: self.wave.center_of_mass_us,
            baseline_max: self.baseline.max(),
            threshold: self.threshold.unwrap_or(0.0),
        })
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn state(&self) -> WaveState {
        self.state
    }

    pub fn is_baseline_ready(&self) -> bool {
        self.baseline_ready
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated.is_some()
    }

    pub fn baseline_len(&self) -> usize {
        self.baseline.len()
    }

    /// Samples pushed into the baseline since the last full reset
    pub fn baseline_updates(&self) -> u64 {
        self.baseline_updates
    }

    pub fn baseline_max(&self) -> f64 {
        self.baseline.max()
    }

    pub fn smoothed(&self) -> f64 {
        self.last_smoothed
    }

    /// Current peak while a wave is open or complete; 0 when idle
    pub fn peak(&self) -> f64 {
        self.wave.peak
    }

    pub fn center_of_mass_us(&self) -> f64 {
        self.wave.center_of_mass_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ready_tracker(level: u16) -> (WaveTracker, u64) {
        let mut tracker = WaveTracker::new(Position::ALL[0], &DetectorConfig::default());
        let mut t = 0;
        for _ in 0..200 {
            tracker.update(t, level);
            t += 1000;
        }
        (tracker, t)
    }

    #[test]
    fn test_not_ready_until_ring_fills() {
        let mut tracker = WaveTracker::new(Position::ALL[0], &DetectorConfig::default());
        for i in 0..199u64 {
            tracker.update(i * 1000, 20);
        }
        assert!(!tracker.is_baseline_ready());
        assert_eq!(tracker.threshold(), None);

        // A strong signal before the baseline is ready never opens a wave
        let mut early = WaveTracker::new(Position::ALL[0], &DetectorConfig::default());
        for i in 0..150u64 {
            early.update(i * 1000, 20);
        }
        for i in 150..170u64 {
            assert_eq!(early.update(i * 1000, 500), WaveState::Idle);
        }
        assert_eq!(early.threshold(), None);
    }

    #[test]
    fn test_adaptive_threshold() {
        let (tracker, _) = ready_tracker(20);
        assert!(tracker.is_baseline_ready());
        // max(20 * 0.5, 10) = 10
        assert_relative_eq!(tracker.threshold().unwrap(), 30.0);

        let (tracker, _) = ready_tracker(100);
        // max(100 * 0.5, 10) = 50
        assert_relative_eq!(tracker.threshold().unwrap(), 150.0);
    }

    #[test]
    fn test_equal_to_threshold_does_not_start_wave() {
        let (mut tracker, mut t) = ready_tracker(20);
        // Average of five 30s is exactly the threshold
        for _ in 0..5 {
            tracker.update(t, 30);
            t += 1000;
        }
        assert_eq!(tracker.state(), WaveState::Idle);
        assert_relative_eq!(tracker.smoothed(), 30.0);

        tracker.update(t, 31);
        assert_eq!(tracker.state(), WaveState::InWave);
    }

    #[test]
    fn test_baseline_frozen_during_wave() {
        let (mut tracker, mut t) = ready_tracker(20);
        let before = tracker.baseline_updates();
        for _ in 0..5 {
            tracker.update(t, 200);
            t += 1000;
        }
        assert_eq!(tracker.state(), WaveState::InWave);
        let at_entry = tracker.baseline_updates();
        // The upcrossing sample was taken while idle
        assert!(at_entry > before);

        for _ in 0..10 {
            tracker.update(t, 200);
            t += 1000;
        }
        assert_eq!(tracker.baseline_updates(), at_entry);
    }

    #[test]
    fn test_wave_completes_on_exit_and_expires() {
        let (mut tracker, mut t) = ready_tracker(20);
        for value in [100, 100, 100, 100, 100, 100, 100, 100, 20, 20, 20, 20, 20] {
            tracker.update(t, value);
            t += 1000;
        }
        assert_eq!(tracker.state(), WaveState::Complete);
        let wave = tracker.completed().unwrap();
        assert!(wave.peak >= wave.threshold);
        assert!(wave.center_of_mass_us >= wave.start_us as f64);
        assert!(wave.center_of_mass_us <= wave.end_us as f64);

        // Stays complete up to max_peak_gap after its end
        let end = wave.end_us;
        while t <= end + 150_000 {
            tracker.update(t, 20);
            t += 1000;
        }
        assert_eq!(tracker.state(), WaveState::Complete);
        tracker.update(end + 151_000, 20);
        assert_eq!(tracker.state(), WaveState::Idle);
        assert_eq!(tracker.peak(), 0.0);
    }

    #[test]
    fn test_wave_forced_complete_at_max_duration() {
        let (mut tracker, mut t) = ready_tracker(20);
        let mut start = None;
        loop {
            let state = tracker.update(t, 300);
            if state == WaveState::InWave && start.is_none() {
                start = Some(t);
            }
            if state == WaveState::Complete {
                break;
            }
            t += 1000;
        }
        // First tick past the limit, not the tick that reaches it
        let wave = tracker.completed().unwrap();
        assert_eq!(wave.start_us, start.unwrap());
        assert_relative_eq!(wave.duration_ms(), 201.0);
    }

    #[test]
    fn test_center_of_mass_of_symmetric_pulse() {
        let (mut tracker, mut t) = ready_tracker(20);
        let unsmoothed = DetectorConfig {
            smoothing_window: 1,
            ..Default::default()
        };
        let mut tracker_raw = WaveTracker::new(Position::ALL[1], &unsmoothed);
        let mut t_raw = 0;
        for _ in 0..200 {
            tracker_raw.update(t_raw, 20);
            t_raw += 1000;
        }
        // 40 60 80 60 40 then baseline: symmetric around the middle sample
        let middle = t_raw + 2000;
        for value in [40, 60, 80, 60, 40, 20] {
            tracker_raw.update(t_raw, value);
            t_raw += 1000;
        }
        let wave = tracker_raw.completed().unwrap();
        // Exit sample (20) carries weight too, pulling slightly late
        assert!((wave.center_of_mass_us - middle as f64).abs() < 500.0);
        assert_eq!(wave.peak_time_us, middle);

        // The smoothed tracker still sees one wave
        for value in [40, 60, 80, 60, 40, 20, 20, 20, 20, 20] {
            tracker.update(t, value);
            t += 1000;
        }
        assert_eq!(tracker.state(), WaveState::Complete);
    }

    #[test]
    fn test_calibrated_threshold_overrides_adaptive() {
        let (mut tracker, _) = ready_tracker(20);
        tracker.set_calibrated_threshold(Some(85));
        assert_relative_eq!(tracker.threshold().unwrap(), 85.0);
        tracker.set_calibrated_threshold(None);
        assert_relative_eq!(tracker.threshold().unwrap(), 30.0);
    }

    #[test]
    fn test_calibration_waits_for_baseline() {
        let mut tracker = WaveTracker::new(Position::ALL[0], &DetectorConfig::default());
        tracker.set_calibrated_threshold(Some(85));
        assert_eq!(tracker.threshold(), None);
        for i in 0..200u64 {
            tracker.update(i * 1000, 20);
        }
        assert_relative_eq!(tracker.threshold().unwrap(), 85.0);
    }

    #[test]
    fn test_full_reset_restarts_learning() {
        let (mut tracker, t) = ready_tracker(20);
        tracker.update(t, 200);
        tracker.full_reset();
        assert!(!tracker.is_baseline_ready());
        assert_eq!(tracker.baseline_len(), 0);
        assert_eq!(tracker.baseline_updates(), 0);
        assert_eq!(tracker.state(), WaveState::Idle);
        assert_eq!(tracker.threshold(), None);
    }
}
