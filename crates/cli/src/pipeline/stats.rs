//! Run statistics and summary output.

use std::time::Duration;

use contracts::{Position, SessionSummary};
use dispatcher::SinkUpload;
use observability::DetectionMetricsAggregator;

/// Statistics from one run
#[derive(Debug, Default)]
pub struct RunStats {
    /// Readings taken off the queue (including the final drain)
    pub readings: u64,

    /// Verdict counts and running statistics
    pub detections: DetectionMetricsAggregator,

    /// Total duration of the run
    pub duration: Duration,

    pub active_sensors: usize,

    pub active_sinks: usize,

    /// Fixed calibrated thresholds were in force
    pub calibrated: bool,

    pub session_id: String,

    /// Finalized session counters
    pub session: Option<SessionSummary>,

    /// Per-sink upload outcome
    pub uploads: Vec<SinkUpload>,

    /// Collection was ended by a signal
    pub interrupted: bool,
}

impl RunStats {
    /// Readings per second over the whole run
    pub fn reading_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.readings as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                      Run Statistics                          ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Session: {}", self.session_id);
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Readings: {}", self.readings);
        println!("   ├─ Reading rate: {:.1}/s", self.reading_rate());
        println!("   ├─ Active sensors: {}", self.active_sensors);
        println!("   ├─ Active sinks: {}", self.active_sinks);
        println!(
            "   └─ Thresholds: {}",
            if self.calibrated {
                "calibrated"
            } else {
                "adaptive"
            }
        );

        if let Some(summary) = &self.session {
            println!("\n📈 Session");
            println!("   ├─ Cycles: {}", summary.total_cycles);
            println!("   ├─ Cycle rate: {:.1} Hz", summary.measured_cycle_rate_hz);
            println!(
                "   ├─ Theoretical max readings: {}",
                summary.theoretical_max_readings
            );
            println!("   ├─ Buffer drops: {}", summary.buffer_drops);
            println!("   ├─ Queue drops: {}", summary.queue_drops);
            println!("   └─ Per sensor (readings / I2C errors):");
            for (i, position) in Position::ALL.into_iter().enumerate() {
                let prefix = if i == Position::ALL.len() - 1 {
                    "└─"
                } else {
                    "├─"
                };
                println!(
                    "      {} {}: {} / {}",
                    prefix,
                    position.name(),
                    summary.per_sensor_readings[position.index()],
                    summary.per_sensor_i2c_errors[position.index()]
                );
            }
        }

        println!("\n🎯 Detections");
        for line in self.detections.summary().to_string().lines().skip(1) {
            println!("   {}", line);
        }

        if !self.uploads.is_empty() {
            println!("\n📤 Uploads");
            for (i, upload) in self.uploads.iter().enumerate() {
                let prefix = if i == self.uploads.len() - 1 {
                    "└─"
                } else {
                    "├─"
                };
                match &upload.result {
                    Ok(report) => println!(
                        "   {} {}: {} batches, {} items, {} retries",
                        prefix, upload.sink, report.batches_sent, report.items_sent, report.retries
                    ),
                    Err(e) => println!("   {} {}: failed ({})", prefix, upload.sink, e),
                }
            }
        }

        if self.interrupted {
            println!("\n⚠️  Collection ended by signal");
        }

        println!();
    }
}
