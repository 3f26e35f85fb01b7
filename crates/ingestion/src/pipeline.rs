//! Acquisition pipeline
//!
//! Runs the sampling engine on a dedicated thread and publishes readings
//! into a bounded queue. The scan never blocks on the consumer: a full
//! queue drops the reading and counts it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::{I2cBus, Reading};
use tracing::{debug, info, instrument, warn};

use crate::engine::SamplingEngine;
use crate::error::{IngestionError, Result};
use crate::metrics::ScanMetrics;

/// Acquisition loop settings
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Reading queue capacity
    pub queue_capacity: usize,

    /// Target scan cycles per second (each cycle reads every position once)
    pub cycle_rate_hz: u32,

    /// Sleep to hold the target rate; off means scan back to back
    pub pace: bool,

    /// Stop by itself after this many cycles
    pub max_cycles: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            cycle_rate_hz: 1000,
            pace: true,
            max_cycles: None,
        }
    }
}

impl PipelineConfig {
    fn period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.cycle_rate_hz.max(1)))
    }
}

/// Owns the acquisition thread and the producer side of the reading queue
pub struct AcquisitionPipeline<B> {
    engine: Option<SamplingEngine<B>>,
    config: PipelineConfig,
    metrics: Arc<ScanMetrics>,
    tx: Sender<Reading>,
    rx: Option<Receiver<Reading>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<SamplingEngine<B>>>,
}

impl<B: I2cBus + Send + 'static> AcquisitionPipeline<B> {
    pub fn new(engine: SamplingEngine<B>, config: PipelineConfig) -> Self {
        let (tx, rx) = bounded(config.queue_capacity.max(1));
        let metrics = engine.metrics();
        Self {
            engine: Some(engine),
            config,
            metrics,
            tx,
            rx: Some(rx),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Spawn the scan thread
    #[instrument(name = "acquisition_start", skip(self), fields(rate_hz = self.config.cycle_rate_hz))]
    pub fn start(&mut self) -> Result<()> {
        let Some(mut engine) = self.engine.take() else {
            return Err(IngestionError::AlreadyRunning);
        };

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let tx = self.tx.clone();
        let metrics = Arc::clone(&self.metrics);
        let config = self.config.clone();

        info!(
            active = engine.active_positions().len(),
            queue_capacity = config.queue_capacity,
            "Starting acquisition"
        );

        let spawned = thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || {
                scan_loop(&mut engine, &tx, &metrics, &running, &config);
                running.store(false, Ordering::SeqCst);
                engine
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(IngestionError::Io(e))
            }
        }
    }

    /// Stop scanning and take the engine back. In-flight cycles complete and
    /// post their readings first.
    #[instrument(name = "acquisition_stop", skip(self))]
    pub fn stop(&mut self) -> Result<SamplingEngine<B>> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(engine) = self.engine.take() {
            return Ok(engine);
        }
        let handle = self
            .handle
            .take()
            .ok_or_else(|| IngestionError::ThreadUnavailable {
                message: "acquisition was never started".to_string(),
            })?;
        let engine = handle
            .join()
            .map_err(|_| IngestionError::ThreadUnavailable {
                message: "acquisition thread panicked".to_string(),
            })?;
        let snapshot = self.metrics.snapshot();
        info!(
            cycles = snapshot.cycles,
            readings = snapshot.total_readings(),
            queue_drops = snapshot.queue_drops,
            "Acquisition stopped"
        );
        Ok(engine)
    }

    /// Consumer side of the reading queue; `None` after the first call
    pub fn take_receiver(&mut self) -> Option<Receiver<Reading>> {
        self.rx.take()
    }

    pub fn metrics(&self) -> Arc<ScanMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Whether the scan thread is still producing
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl<B> Drop for AcquisitionPipeline<B> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn scan_loop<B: I2cBus>(
    engine: &mut SamplingEngine<B>,
    tx: &Sender<Reading>,
    metrics: &ScanMetrics,
    running: &AtomicBool,
    config: &PipelineConfig,
) {
    let period = config.period();
    let mut buffer = Vec::with_capacity(engine.active_positions().len());
    let mut next_deadline = Instant::now();
    let mut cycles: u64 = 0;

    debug!(period_us = period.as_micros() as u64, "Scan loop started");

    while running.load(Ordering::Relaxed) {
        if config.max_cycles.is_some_and(|max| cycles >= max) {
            break;
        }

        buffer.clear();
        engine.scan_cycle(&mut buffer);
        cycles += 1;

        for reading in buffer.drain(..) {
            match tx.try_send(reading) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => metrics.record_queue_drop(),
                Err(TrySendError::Closed(_)) => {
                    warn!("Reading queue closed, stopping acquisition");
                    return;
                }
            }
        }

        if config.pace {
            next_deadline += period;
            let now = Instant::now();
            if next_deadline > now {
                thread::sleep(next_deadline - now);
            } else {
                // Overran; do not try to catch up with a burst
                next_deadline = now;
            }
        }
    }

    debug!(cycles, "Scan loop finished");
}
