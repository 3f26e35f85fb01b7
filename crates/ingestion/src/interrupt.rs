//! Interrupt posture
//!
//! Each board's two sensors share one interrupt line. The line handler only
//! captures a timestamp and enqueues the board; the scanner later reads both
//! flag registers on that board to name the sensor and the cause.

use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::{
    BoardIndex, I2cBus, InterruptEvent, InterruptKind, InterruptSettings, Position, SensorSettings,
    Side, NUM_POSITIONS,
};
use hardware::{HardwareError, InterruptThresholds, MuxController, Vcnl4040};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::metrics::ScanMetrics;

/// Raw line edge as captured by the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEdge {
    pub t_us: u64,
    pub board: BoardIndex,
}

/// Handler side of the edge queue
#[derive(Clone)]
pub struct EdgeSender {
    tx: Sender<LineEdge>,
    metrics: Arc<ScanMetrics>,
}

impl EdgeSender {
    /// Enqueue an edge. Returns false if it was dropped.
    pub fn notify(&self, t_us: u64, board: BoardIndex) -> bool {
        match self.tx.try_send(LineEdge { t_us, board }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.metrics.record_edge_drop();
                false
            }
        }
    }
}

/// Turns queued line edges into interrupt events
pub struct InterruptScanner {
    edges: Receiver<LineEdge>,
    sender: EdgeSender,
    driver: Vcnl4040,
    thresholds: [Option<InterruptThresholds>; NUM_POSITIONS],
    metrics: Arc<ScanMetrics>,
}

impl InterruptScanner {
    pub fn new(capacity: usize, metrics: Arc<ScanMetrics>) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            edges: rx,
            sender: EdgeSender {
                tx,
                metrics: Arc::clone(&metrics),
            },
            driver: Vcnl4040::new(),
            thresholds: [None; NUM_POSITIONS],
            metrics,
        }
    }

    /// Handle for the line handler
    pub fn sender(&self) -> EdgeSender {
        self.sender.clone()
    }

    /// Switch every present sensor with a known baseline to the interrupt
    /// posture. Returns how many sensors were armed.
    #[instrument(name = "interrupt_arm", skip_all)]
    pub fn arm<B: I2cBus>(
        &mut self,
        mux: &mut MuxController<B>,
        settings: &SensorSettings,
        interrupt: &InterruptSettings,
        baselines: &[Option<u16>; NUM_POSITIONS],
    ) -> Result<usize> {
        let mut armed = 0;
        for position in Position::ALL {
            let Some(baseline) = baselines[position.index()] else {
                continue;
            };
            if !mux.is_present(position) {
                continue;
            }
            mux.select(position)?;
            let thresholds = self
                .driver
                .configure_interrupt(mux.bus_mut(), settings, interrupt, baseline)
                .map_err(|e| HardwareError::bus(position.name(), e))?;
            self.thresholds[position.index()] = Some(thresholds);
            armed += 1;
        }
        info!(armed, margin = interrupt.threshold_margin, "Interrupt posture armed");
        Ok(armed)
    }

    /// Thresholds written to a position, if armed
    pub fn thresholds(&self, position: Position) -> Option<InterruptThresholds> {
        self.thresholds[position.index()]
    }

    /// Drain queued edges, resolve each against the board's flag registers
    /// and append the resulting events. Returns the number appended.
    pub fn service<B: I2cBus>(
        &mut self,
        mux: &mut MuxController<B>,
        out: &mut Vec<InterruptEvent>,
    ) -> usize {
        let before = out.len();
        while let Ok(edge) = self.edges.try_recv() {
            let mut resolved = false;
            for side in [Side::A, Side::B] {
                let position = edge.board.position(side);
                if !mux.is_present(position) {
                    continue;
                }
                let flags = mux.select(position).and_then(|_| {
                    self.driver
                        .read_interrupt_flags(mux.bus_mut())
                        .map_err(|e| HardwareError::bus(position.name(), e))
                });
                let flags = match flags {
                    Ok(flags) => flags,
                    Err(e) => {
                        self.metrics.record_i2c_error(position);
                        warn!(position = %position, error = %e, "Failed to read interrupt flags");
                        continue;
                    }
                };

                // Both flags can be latched when the object came and went
                // between two services
                for (set, kind) in [
                    (flags.is_close(), InterruptKind::Rising),
                    (flags.is_away(), InterruptKind::Falling),
                ] {
                    if set {
                        out.push(InterruptEvent {
                            t_us: edge.t_us,
                            board: edge.board,
                            position: Some(position),
                            kind,
                            raw_flags: flags.0,
                        });
                        resolved = true;
                    }
                }
            }
            if !resolved {
                debug!(board = %edge.board, t_us = edge.t_us, "Edge without proximity flags");
            }
        }
        out.len() - before
    }

    /// Queued edges not serviced yet
    pub fn pending(&self) -> usize {
        self.edges.len()
    }
}
