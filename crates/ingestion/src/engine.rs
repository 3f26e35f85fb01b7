//! Sampling engine - one scan cycle over every present sensor
//!
//! Owns the switch tree (and through it the bus) and the sensor driver.
//! A failed or overlong transaction skips that position for the cycle and
//! is counted; nothing is retried inside a scan.

use std::sync::Arc;

use contracts::{BusError, Clock, I2cBus, Position, Reading, SensorSettings, NUM_POSITIONS};
use hardware::{vcnl4040, DiscoveryReport, HardwareError, MuxController, Vcnl4040};
use tracing::{debug, info, instrument, trace, warn};

use crate::error::Result;
use crate::metrics::ScanMetrics;

/// Default limit for one select or register read
pub const DEFAULT_TRANSACTION_TIMEOUT_MS: u32 = 100;

/// Outcome of one scan cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub readings: usize,
    pub errors: usize,
    pub duration_us: u64,
}

/// Dual-multiplexer scan loop body
pub struct SamplingEngine<B> {
    mux: MuxController<B>,
    driver: Vcnl4040,
    clock: Arc<dyn Clock>,
    settings: SensorSettings,
    active: Vec<Position>,
    metrics: Arc<ScanMetrics>,
    last_t_us: [Option<u64>; NUM_POSITIONS],
    transaction_timeout_us: u64,
}

impl<B: I2cBus> SamplingEngine<B> {
    /// Wrap a discovered switch tree. Only positions present in the
    /// discovery report are scanned.
    pub fn new(mux: MuxController<B>, clock: Arc<dyn Clock>, settings: SensorSettings) -> Self {
        let active = mux.report().active_positions();
        Self {
            mux,
            driver: Vcnl4040::new(),
            clock,
            settings,
            active,
            metrics: Arc::new(ScanMetrics::new()),
            last_t_us: [None; NUM_POSITIONS],
            transaction_timeout_us: u64::from(DEFAULT_TRANSACTION_TIMEOUT_MS) * 1000,
        }
    }

    /// A select or read slower than `ms` on the engine clock counts as a
    /// bus timeout for that position
    pub fn with_transaction_timeout_ms(mut self, ms: u32) -> Self {
        self.transaction_timeout_us = u64::from(ms) * 1000;
        self
    }

    /// Share counters with an existing owner
    pub fn with_metrics(mut self, metrics: Arc<ScanMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Write the polling configuration to every active sensor. A sensor that
    /// cannot be configured is dropped from the scan.
    #[instrument(name = "sampling_initialize", skip(self), fields(active = self.active.len()))]
    pub fn initialize(&mut self) -> Result<()> {
        let mut configured = Vec::with_capacity(self.active.len());
        for position in self.active.clone() {
            let outcome = self.mux.select(position).and_then(|_| {
                self.driver
                    .configure_polling(self.mux.bus_mut(), &self.settings)
                    .map_err(|e| hardware::HardwareError::bus(position.name(), e))
            });
            match outcome {
                Ok(_) => configured.push(position),
                Err(e) => {
                    self.metrics.record_i2c_error(position);
                    warn!(position = %position, error = %e, "Sensor configuration failed, skipping");
                }
            }
        }
        self.active = configured;
        info!(
            active = self.active.len(),
            led_current = %self.settings.led_current,
            integration_time = %self.settings.integration_time,
            "Sensors configured for polling"
        );
        Ok(())
    }

    /// Measure and write a cover cancellation level on every active sensor
    #[instrument(name = "sampling_cover_cancellation", skip(self))]
    pub fn cover_cancellation(&mut self, samples: u16) -> [Option<u16>; NUM_POSITIONS] {
        let mut levels = [None; NUM_POSITIONS];
        for position in self.active.clone() {
            if self.mux.select(position).is_err() {
                self.metrics.record_i2c_error(position);
                continue;
            }
            match self
                .driver
                .calibrate_cancellation(self.mux.bus_mut(), samples)
            {
                Ok(level) => levels[position.index()] = Some(level),
                Err(e) => {
                    self.metrics.record_i2c_error(position);
                    warn!(position = %position, error = %e, "Cover cancellation failed");
                }
            }
        }
        levels
    }

    /// Run one cycle: for each active position select, read, stamp, emit
    pub fn scan_cycle(&mut self, out: &mut Vec<Reading>) -> CycleReport {
        let started = self.clock.now_us();
        let mut report = CycleReport::default();

        for index in 0..self.active.len() {
            let position = self.active[index];
            match self.read_position(position) {
                Ok(reading) => {
                    self.metrics.record_reading(position);
                    out.push(reading);
                    report.readings += 1;
                }
                Err(e) => {
                    self.metrics.record_i2c_error(position);
                    report.errors += 1;
                    trace!(position = %position, error = %e, "Read failed, position skipped this cycle");
                }
            }
        }

        report.duration_us = self.clock.now_us().saturating_sub(started);
        self.metrics.record_cycle(report.duration_us);
        report
    }

    /// Take `cycles` scans and keep each position's maximum proximity
    pub fn measure_baselines(&mut self, cycles: usize) -> [Option<u16>; NUM_POSITIONS] {
        let mut maxima = [None::<u16>; NUM_POSITIONS];
        let mut buffer = Vec::with_capacity(self.active.len());
        for _ in 0..cycles {
            buffer.clear();
            self.scan_cycle(&mut buffer);
            for reading in &buffer {
                let slot = &mut maxima[reading.position.index()];
                *slot = Some(slot.map_or(reading.proximity, |m| m.max(reading.proximity)));
            }
        }
        debug!(?maxima, cycles, "Measured baselines");
        maxima
    }

    fn read_position(&mut self, position: Position) -> Result<Reading> {
        let begun = self.clock.now_us();
        self.mux.select(position)?;
        self.within_deadline(position, self.mux.tca_address(), begun)?;

        let proximity = self.timed_read(position, Vcnl4040::read_proximity)?;
        let ambient = if self.settings.read_ambient {
            Some(self.timed_read(position, Vcnl4040::read_ambient)?)
        } else {
            None
        };

        // Strictly increasing per position even on a coarse clock
        let mut t_us = self.clock.now_us();
        if let Some(last) = self.last_t_us[position.index()] {
            if t_us <= last {
                t_us = last + 1;
            }
        }
        self.last_t_us[position.index()] = Some(t_us);

        Ok(Reading {
            t_us,
            position,
            proximity,
            ambient,
        })
    }

    fn timed_read(
        &mut self,
        position: Position,
        read: fn(&Vcnl4040, &mut B) -> std::result::Result<u16, BusError>,
    ) -> Result<u16> {
        let begun = self.clock.now_us();
        let value = read(&self.driver, self.mux.bus_mut())
            .map_err(|e| HardwareError::bus(position.name(), e))?;
        self.within_deadline(position, vcnl4040::ADDRESS, begun)?;
        Ok(value)
    }

    fn within_deadline(&self, position: Position, address: u8, begun: u64) -> Result<()> {
        let waited_us = self.clock.now_us().saturating_sub(begun);
        if waited_us <= self.transaction_timeout_us {
            return Ok(());
        }
        let waited_ms = u32::try_from(waited_us / 1000).unwrap_or(u32::MAX);
        Err(HardwareError::bus(position.name(), BusError::Timeout { address, waited_ms }).into())
    }

    /// Positions being scanned, in scan order
    pub fn active_positions(&self) -> &[Position] {
        &self.active
    }

    pub fn report(&self) -> DiscoveryReport {
        self.mux.report()
    }

    pub fn settings(&self) -> &SensorSettings {
        &self.settings
    }

    pub fn metrics(&self) -> Arc<ScanMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn mux_mut(&mut self) -> &mut MuxController<B> {
        &mut self.mux
    }

    /// Leave every channel disabled and hand back the switch tree
    pub fn shutdown(mut self) -> MuxController<B> {
        if let Err(e) = self.mux.disable_all() {
            warn!(error = %e, "Failed to disable mux channels on shutdown");
        }
        self.mux
    }
}
