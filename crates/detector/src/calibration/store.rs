//! Calibration persistence
//!
//! One bincode file per device. Anything that fails to decode, carries the
//! wrong magic or schema version, or has an invalid board loads as "no
//! valid calibration".

use std::fs;
use std::path::{Path, PathBuf};

use contracts::{CalibrationRecord, CALIBRATION_MAGIC, CALIBRATION_VERSION};
use tracing::{debug, info, instrument, warn};

use crate::error::{DetectorError, Result};

#[derive(Debug, Clone)]
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the record, replacing any previous file in one rename
    #[instrument(name = "calibration_save", skip_all, fields(path = %self.path.display()))]
    pub fn save(&self, record: &CalibrationRecord) -> Result<()> {
        if !record.is_valid() {
            return Err(DetectorError::InvalidCalibration {
                message: "only finalized, fully valid records are stored".to_string(),
            });
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let bytes = bincode::serialize(record).map_err(|e| DetectorError::Encode {
            message: e.to_string(),
        })?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, &bytes)?;
        fs::rename(&staging, &self.path)?;

        info!(bytes = bytes.len(), "Calibration saved");
        Ok(())
    }

    /// Decode the stored record without judging it
    pub fn load(&self) -> Result<CalibrationRecord> {
        let bytes = fs::read(&self.path)?;
        bincode::deserialize(&bytes).map_err(|e| DetectorError::Encode {
            message: e.to_string(),
        })
    }

    /// The stored record if present and usable
    pub fn load_valid(&self) -> Option<CalibrationRecord> {
        let record = match self.load() {
            Ok(record) => record,
            Err(DetectorError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored calibration");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Stored calibration unreadable");
                return None;
            }
        };

        if record.magic != CALIBRATION_MAGIC || record.version != CALIBRATION_VERSION {
            warn!(
                magic = record.magic,
                version = record.version,
                "Stored calibration has a foreign layout"
            );
            return None;
        }
        if !record.is_valid() {
            warn!(failed = ?record.failed_boards(), "Stored calibration has invalid boards");
            return None;
        }

        info!(timestamp_ms = record.timestamp_ms, "Loaded stored calibration");
        Some(record)
    }

    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
