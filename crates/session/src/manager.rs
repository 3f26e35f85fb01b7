//! Session manager
//!
//! `idle -> collecting -> uploading -> idle`. At most one session exists at
//! a time. The buffer is bounded: once full, further readings are counted
//! and dropped, never evicting what was already collected.

use std::mem;
use std::sync::Arc;

use contracts::{
    ActiveSensor, Clock, ContractError, InterruptEvent, Reading, SensorConfigReport,
    SensorSettings, SessionConfig, SessionKind, SessionRecord, SessionState, SessionSummary,
};
use tracing::{debug, info, instrument, warn};

use crate::summary::{finalize_summary, AcquisitionTotals};

/// Builds one session at a time and hands it off by move
pub struct SessionManager {
    config: SessionConfig,
    device_id: String,
    settings: SensorSettings,
    clock: Arc<dyn Clock>,
    active_sensors: Vec<ActiveSensor>,

    state: SessionState,
    session_id: Option<String>,
    start_time_ms: u64,
    last_start_ms: Option<u64>,
    readings: Vec<Reading>,
    events: Vec<InterruptEvent>,
    summary: SessionSummary,
    last_index: Option<usize>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        device_id: impl Into<String>,
        settings: SensorSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            device_id: device_id.into(),
            settings,
            clock,
            active_sensors: Vec::new(),
            state: SessionState::Idle,
            session_id: None,
            start_time_ms: 0,
            last_start_ms: None,
            readings: Vec::new(),
            events: Vec::new(),
            summary: SessionSummary::default(),
            last_index: None,
        }
    }

    /// Sensors reported in the next sessions' metadata
    pub fn set_active_sensors(&mut self, active_sensors: Vec<ActiveSensor>) {
        self.active_sensors = active_sensors;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Buffered items of the current session
    pub fn len(&self) -> usize {
        match self.config.kind {
            SessionKind::Proximity => self.readings.len(),
            SessionKind::Interrupt => self.events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Running counters of the current session
    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    #[instrument(name = "session_start", skip(self), fields(device_id = %self.device_id))]
    pub fn start_session(&mut self) -> Result<&str, ContractError> {
        if self.state != SessionState::Idle {
            return Err(ContractError::session_state("start_session", self.state));
        }

        // Ids must not repeat even when two sessions start within one ms
        let now_ms = self.clock.now_ms();
        let start_ms = match self.last_start_ms {
            Some(last) if now_ms <= last => last + 1,
            _ => now_ms,
        };
        self.last_start_ms = Some(start_ms);
        self.start_time_ms = start_ms;

        self.readings.clear();
        self.readings.reserve(self.config.buffer_capacity);
        self.events.clear();
        self.summary = SessionSummary::default();
        self.last_index = None;

        let id = format!("{}_{}", device_suffix(&self.device_id), start_ms);
        info!(session_id = %id, kind = ?self.config.kind, "Session started");
        self.state = SessionState::Collecting;
        Ok(self.session_id.insert(id).as_str())
    }

    /// Buffer one reading. Returns false when the buffer was full.
    pub fn ingest(&mut self, reading: Reading) -> Result<bool, ContractError> {
        if self.state != SessionState::Collecting {
            return Err(ContractError::session_state("ingest", self.state));
        }
        self.count_cycle(reading.position.index());

        if self.readings.len() >= self.config.buffer_capacity {
            self.record_buffer_drop();
            return Ok(false);
        }
        self.summary.per_sensor_readings[reading.position.index()] += 1;
        self.readings.push(reading);
        Ok(true)
    }

    /// Buffer one interrupt event (interrupt sessions)
    pub fn ingest_event(&mut self, event: InterruptEvent) -> Result<bool, ContractError> {
        if self.state != SessionState::Collecting {
            return Err(ContractError::session_state("ingest_event", self.state));
        }
        if self.events.len() >= self.config.buffer_capacity {
            self.record_buffer_drop();
            return Ok(false);
        }
        if let Some(position) = event.position {
            self.summary.per_sensor_readings[position.index()] += 1;
        }
        self.events.push(event);
        Ok(true)
    }

    /// Drain what is still queued, close the session and hand the record
    /// off. The manager stays in `Uploading` until `upload_finished`.
    #[instrument(name = "session_stop", skip_all, fields(session_id = ?self.session_id))]
    pub fn stop_session(
        &mut self,
        pending: impl IntoIterator<Item = Reading>,
        totals: AcquisitionTotals,
    ) -> Result<SessionRecord, ContractError> {
        if self.state != SessionState::Collecting {
            return Err(ContractError::session_state("stop_session", self.state));
        }

        let mut drained = 0usize;
        for reading in pending {
            self.ingest(reading)?;
            drained += 1;
        }

        let duration_ms = self.clock.now_ms().saturating_sub(self.start_time_ms);
        self.summary.per_sensor_i2c_errors = totals.per_sensor_i2c_errors;
        self.summary.queue_drops = totals.queue_drops;
        if let Some(cycles) = totals.scan_cycles {
            self.summary.total_cycles = cycles;
        }
        finalize_summary(
            &mut self.summary,
            &self.settings,
            duration_ms,
            self.active_sensors.len(),
        );

        let record = SessionRecord {
            session_id: self.session_id.clone().unwrap_or_default(),
            device_id: self.device_id.clone(),
            kind: self.config.kind,
            start_time_ms: self.start_time_ms,
            duration_ms,
            readings: mem::take(&mut self.readings),
            events: mem::take(&mut self.events),
            active_sensors: self.active_sensors.clone(),
            sensor_config: SensorConfigReport::new(
                &self.settings,
                self.summary.measured_cycle_rate_hz,
            ),
            summary: self.summary.clone(),
        };

        if record.summary.buffer_drops > 0 {
            warn!(buffer_drops = record.summary.buffer_drops, "Session buffer overflowed");
        }
        info!(
            duration_ms,
            drained,
            items = record.len(),
            cycles = record.summary.total_cycles,
            rate_hz = record.summary.measured_cycle_rate_hz,
            "Session stopped"
        );
        metrics::counter!("motion_play_sessions_total").increment(1);

        self.state = SessionState::Uploading;
        Ok(record)
    }

    /// The sink is done with the last record
    pub fn upload_finished(&mut self) -> Result<(), ContractError> {
        if self.state != SessionState::Uploading {
            return Err(ContractError::session_state("upload_finished", self.state));
        }
        debug!(session_id = ?self.session_id, "Upload finished");
        self.state = SessionState::Idle;
        self.session_id = None;
        Ok(())
    }

    /// A position that does not come after the previous one opens a cycle
    fn count_cycle(&mut self, index: usize) {
        match self.last_index {
            Some(last) if index > last => {}
            _ => self.summary.total_cycles += 1,
        }
        self.last_index = Some(index);
    }

    fn record_buffer_drop(&mut self) {
        self.summary.buffer_drops += 1;
        metrics::counter!("motion_play_buffer_drops_total").increment(1);
    }
}

/// Part of the device id after the last '-'
fn device_suffix(device_id: &str) -> &str {
    device_id.rsplit('-').next().unwrap_or(device_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use contracts::{BoardIndex, InterruptKind, ManualClock, Position};

    fn manager(capacity: usize) -> (SessionManager, ManualClock) {
        let clock = ManualClock::new(52_340_000);
        let config = SessionConfig {
            buffer_capacity: capacity,
            ..Default::default()
        };
        let mut manager = SessionManager::new(
            config,
            "motionplay-device-001",
            SensorSettings::default(),
            Arc::new(clock.clone()),
        );
        manager.set_active_sensors(Position::ALL.into_iter().map(ActiveSensor::from).collect());
        (manager, clock)
    }

    fn cycle(t_ms: u64) -> impl Iterator<Item = Reading> {
        Position::ALL
            .into_iter()
            .map(move |p| Reading::new(t_ms * 1000, p, 20))
    }

    #[test]
    fn test_session_id_and_states() {
        let (mut manager, _) = manager(100);
        assert_eq!(manager.start_session().unwrap(), "001_52340");
        assert_eq!(manager.state(), SessionState::Collecting);
        assert!(manager.start_session().is_err());

        manager.stop_session([], AcquisitionTotals::default()).unwrap();
        assert_eq!(manager.state(), SessionState::Uploading);
        assert!(manager.start_session().is_err());
        assert!(manager.ingest(Reading::new(0, Position::ALL[0], 1)).is_err());

        manager.upload_finished().unwrap();
        assert_eq!(manager.state(), SessionState::Idle);
        // Same clock reading, still a fresh id
        assert_eq!(manager.start_session().unwrap(), "001_52341");
    }

    #[test]
    fn test_counts_cycles_and_rate() {
        let (mut manager, clock) = manager(1000);
        manager.start_session().unwrap();
        for t in 0..10 {
            for reading in cycle(t) {
                assert!(manager.ingest(reading).unwrap());
            }
        }
        clock.advance_us(10_000);
        let record = manager.stop_session([], AcquisitionTotals::default()).unwrap();

        assert_eq!(record.summary.total_cycles, 10);
        assert_eq!(record.summary.total_readings(), 60);
        assert_relative_eq!(record.summary.measured_cycle_rate_hz, 1000.0);
        assert_eq!(record.summary.theoretical_max_readings, 60);
        assert_eq!(record.duration_ms, 10);
        assert_eq!(record.readings.len(), 60);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_engine_cycle_count_covers_lost_cycles() {
        let (mut manager, clock) = manager(1000);
        manager.start_session().unwrap();
        // Cycles 3, 4 and 7 never reached the buffer
        for t in [0, 1, 2, 5, 6, 8, 9] {
            for reading in cycle(t) {
                manager.ingest(reading).unwrap();
            }
        }
        clock.advance_us(10_000);
        let totals = AcquisitionTotals {
            queue_drops: 18,
            scan_cycles: Some(10),
            ..Default::default()
        };
        let record = manager.stop_session([], totals).unwrap();

        assert_eq!(record.summary.total_cycles, 10);
        assert_eq!(record.summary.total_readings(), 42);
        assert_relative_eq!(record.summary.measured_cycle_rate_hz, 1000.0);
    }

    #[test]
    fn test_full_buffer_drops_newest() {
        let (mut manager, clock) = manager(8);
        manager.start_session().unwrap();
        let mut accepted = 0;
        for t in 0..2 {
            for reading in cycle(t) {
                accepted += usize::from(manager.ingest(reading).unwrap());
            }
        }
        assert_eq!(accepted, 8);

        clock.advance_us(2_000);
        let totals = AcquisitionTotals {
            per_sensor_i2c_errors: [0, 0, 1, 0, 0, 0],
            queue_drops: 3,
            scan_cycles: None,
        };
        let pending: Vec<Reading> = cycle(2).collect();
        let record = manager.stop_session(pending, totals).unwrap();

        assert_eq!(record.summary.buffer_drops, 4 + 6);
        assert_eq!(record.summary.queue_drops, 3);
        assert_eq!(record.summary.total_i2c_errors(), 1);
        assert_eq!(record.summary.total_cycles, 3);
        // The first readings survive, in order
        assert_eq!(record.readings[0].t_us, 0);
        assert!(record.readings.windows(2).all(|w| w[0].t_us <= w[1].t_us));
    }

    #[test]
    fn test_empty_session_all_zero() {
        let (mut manager, _) = manager(100);
        manager.start_session().unwrap();
        let record = manager.stop_session([], AcquisitionTotals::default()).unwrap();
        let summary = &record.summary;
        assert_eq!(summary.total_cycles, 0);
        assert_eq!(summary.total_readings(), 0);
        assert_eq!(summary.buffer_drops, 0);
        assert_eq!(summary.queue_drops, 0);
        assert_eq!(summary.measured_cycle_rate_hz, 0.0);
        assert_eq!(summary.theoretical_max_readings, 0);
        assert!(record.is_empty());
    }

    #[test]
    fn test_interrupt_session_buffers_events() {
        let clock = ManualClock::new(0);
        let config = SessionConfig {
            kind: SessionKind::Interrupt,
            ..Default::default()
        };
        let mut manager =
            SessionManager::new(config, "dev-9", SensorSettings::default(), Arc::new(clock));
        manager.start_session().unwrap();
        manager
            .ingest_event(InterruptEvent {
                t_us: 10,
                board: BoardIndex::ALL[1],
                position: Some(Position::ALL[3]),
                kind: InterruptKind::Rising,
                raw_flags: 0x02,
            })
            .unwrap();
        assert_eq!(manager.len(), 1);
        let record = manager.stop_session([], AcquisitionTotals::default()).unwrap();
        assert_eq!(record.kind, SessionKind::Interrupt);
        assert_eq!(record.len(), 1);
        assert_eq!(record.summary.per_sensor_readings[3], 1);
        assert_eq!(record.session_id, "9_0");
    }
}
