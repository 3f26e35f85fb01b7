//! LedResponder - local result display
//!
//! One task owns the strip. Every verdict replaces whatever is showing and
//! re-arms the single off timer. Verdicts arriving faster than the task runs
//! collapse to the newest one.

use std::time::Duration;

use contracts::{Direction, LedConfig, LedSurface, Rgb};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, instrument, trace, warn};

/// Handle to the LED task
pub struct LedResponder {
    tx: watch::Sender<Option<Direction>>,
    worker_handle: JoinHandle<()>,
}

impl LedResponder {
    /// Take ownership of the strip and start the display task
    pub fn spawn<L: LedSurface + 'static>(surface: L, config: LedConfig) -> Self {
        let (tx, rx) = watch::channel(None);
        let worker_handle = tokio::spawn(led_worker(surface, rx, config));
        Self { tx, worker_handle }
    }

    /// Show a verdict (fire-and-forget). Replaces any verdict the task has
    /// not picked up yet; false once the task is gone.
    pub fn show(&self, direction: Direction) -> bool {
        // Marks the value changed even when it equals the previous verdict
        self.tx.send_modify(|pending| *pending = Some(direction));
        if self.tx.is_closed() {
            warn!(%direction, "LED task stopped, verdict not shown");
            return false;
        }
        true
    }

    /// Stop the task; the strip is left off
    #[instrument(name = "led_responder_shutdown", skip(self))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(error = ?e, "LED task panicked");
        }
    }
}

fn hold_time(config: &LedConfig, direction: Direction) -> Duration {
    let ms = if direction.is_known() {
        config.result_duration_ms
    } else {
        config.unknown_flash_ms
    };
    Duration::from_millis(ms)
}

async fn led_worker<L: LedSurface>(
    mut surface: L,
    mut rx: watch::Receiver<Option<Direction>>,
    config: LedConfig,
) {
    surface.set_brightness(config.brightness);
    surface.fill(Rgb::OFF);

    let mut deadline: Option<Instant> = None;
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = *rx.borrow_and_update();
                if let Some(direction) = latest {
                    surface.fill(Rgb::for_direction(direction));
                    deadline = Some(Instant::now() + hold_time(&config, direction));
                    trace!(%direction, "LED showing");
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                surface.fill(Rgb::OFF);
                deadline = None;
            }
        }
    }

    surface.fill(Rgb::OFF);
    debug!("LED task stopped");
}
