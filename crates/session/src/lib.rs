//! # Session
//!
//! Session lifecycle and buffering.
//!
//! Responsibilities:
//! - One session at a time: `idle -> collecting -> uploading -> idle`
//! - Bounded, append-only buffer of readings or interrupt events
//! - Per-session counters and derived rates (`finalize_summary`)
//! - Handing the finished `SessionRecord` to the uploader by move
//!
//! ## Usage Example
//!
//! ```ignore
//! use session::{AcquisitionTotals, SessionManager};
//!
//! let mut manager = SessionManager::new(config.session.clone(), device_id, settings, clock);
//! manager.set_active_sensors(report.active_sensors());
//! manager.start_session()?;
//! while let Ok(reading) = rx.recv().await {
//!     manager.ingest(reading)?;
//! }
//! let pending = std::iter::from_fn(|| rx.try_recv().ok());
//! let record = manager.stop_session(pending, totals)?;
//! ```

mod manager;
mod summary;

pub use manager::SessionManager;
pub use summary::{finalize_summary, AcquisitionTotals};
