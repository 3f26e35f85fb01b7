//! Replay source - feed a recorded reading stream back into the pipeline
//!
//! Recordings are JSON lines, one `Reading` per line. Playback keeps the
//! recorded spacing divided by a speed multiplier.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_channel::{bounded, Receiver};
use contracts::Reading;
use tracing::{debug, info, instrument};

use crate::error::{IngestionError, Result};

/// Recorded reading stream
#[derive(Debug, Clone)]
pub struct ReplaySource {
    readings: Vec<Reading>,
    /// Playback speed (1.0 = recorded speed); non-positive plays unpaced
    speed_multiplier: f64,
}

impl ReplaySource {
    /// Load a JSONL recording. Blank lines are skipped; readings are
    /// ordered by timestamp, keeping file order for equal stamps.
    #[instrument(name = "replay_load", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);

        let mut readings = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let reading: Reading =
                serde_json::from_str(line).map_err(|e| IngestionError::ReplayParse {
                    path: path.display().to_string(),
                    line: index + 1,
                    message: e.to_string(),
                })?;
            readings.push(reading);
        }

        info!(readings = readings.len(), "Loaded replay recording");
        Ok(Self::from_readings(readings))
    }

    pub fn from_readings(mut readings: Vec<Reading>) -> Self {
        readings.sort_by_key(|reading| reading.t_us);
        Self {
            readings,
            speed_multiplier: 1.0,
        }
    }

    pub fn with_speed(mut self, speed_multiplier: f64) -> Self {
        self.speed_multiplier = speed_multiplier;
        self
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Recorded span from first to last reading
    pub fn duration_us(&self) -> u64 {
        match (self.readings.first(), self.readings.last()) {
            (Some(first), Some(last)) => last.t_us - first.t_us,
            _ => 0,
        }
    }

    /// Play back on a dedicated thread into a bounded queue. Playback waits
    /// for queue space instead of dropping.
    pub fn spawn(self, queue_capacity: usize) -> Result<ReplayHandle> {
        let (tx, rx) = bounded(queue_capacity.max(1));
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let speed = self.speed_multiplier;
        let readings = self.readings;

        let handle = thread::Builder::new()
            .name("replay".to_string())
            .spawn(move || {
                let Some(first) = readings.first().map(|r| r.t_us) else {
                    flag.store(false, Ordering::SeqCst);
                    return 0;
                };
                let started = Instant::now();
                let mut sent = 0usize;

                for reading in readings {
                    if !flag.load(Ordering::Relaxed) {
                        debug!(sent, "Replay stopped");
                        break;
                    }
                    if speed.is_finite() && speed > 0.0 {
                        let offset_s = (reading.t_us - first) as f64 / 1e6;
                        let target = Duration::from_secs_f64(offset_s / speed);
                        let elapsed = started.elapsed();
                        if target > elapsed {
                            thread::sleep(target - elapsed);
                        }
                    }
                    if tx.send_blocking(reading).is_err() {
                        break;
                    }
                    sent += 1;
                }

                flag.store(false, Ordering::SeqCst);
                info!(sent, "Replay completed");
                sent
            })?;

        Ok(ReplayHandle {
            rx: Some(rx),
            running,
            handle: Some(handle),
        })
    }
}

/// Running playback
pub struct ReplayHandle {
    rx: Option<Receiver<Reading>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<usize>>,
}

impl ReplayHandle {
    pub fn take_receiver(&mut self) -> Option<Receiver<Reading>> {
        self.rx.take()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop early and wait for the thread. Returns readings sent.
    pub fn stop(&mut self) -> Result<usize> {
        self.running.store(false, Ordering::SeqCst);
        // Unblock a producer waiting on a full queue
        self.rx.take();
        self.join()
    }

    /// Wait for playback to finish. Returns readings sent.
    pub fn join(&mut self) -> Result<usize> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| IngestionError::ThreadUnavailable {
                message: "replay thread panicked".to_string(),
            }),
            None => Ok(0),
        }
    }
}

impl Drop for ReplayHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Append-only JSONL recorder, the inverse of `ReplaySource::load`
pub struct JsonlRecorder {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl JsonlRecorder {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(&path)?);
        Ok(Self {
            path,
            writer,
            written: 0,
        })
    }

    pub fn record(&mut self, reading: &Reading) -> Result<()> {
        serde_json::to_writer(&mut self.writer, reading).map_err(std::io::Error::from)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and report what was written
    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        debug!(path = %self.path.display(), written = self.written, "Recording closed");
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Position;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn sample(count: u64) -> Vec<Reading> {
        (0..count)
            .map(|i| Reading::new(i * 1000, Position::ALL[(i % 6) as usize], 20 + i as u16))
            .collect()
    }

    #[test]
    fn test_record_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run.jsonl");

        let mut recorder = JsonlRecorder::create(&path).unwrap();
        for reading in sample(12) {
            recorder.record(&reading).unwrap();
        }
        assert_eq!(recorder.finish().unwrap(), 12);

        let source = ReplaySource::load(&path).unwrap();
        assert_eq!(source.readings(), sample(12).as_slice());
        assert_eq!(source.duration_us(), 11_000);
    }

    #[test]
    fn test_load_sorts_and_skips_blank_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"t_us": 3000, "position": 1, "prox": 30}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"t_us": 1000, "position": 0, "prox": 10}}"#).unwrap();
        writeln!(file, r#"{{"t_us": 1000, "position": 2, "proximity": 11}}"#).unwrap();

        let source = ReplaySource::load(file.path()).unwrap();
        let order: Vec<_> = source.readings().iter().map(|r| r.proximity).collect();
        assert_eq!(order, [10, 11, 30]);
    }

    #[test]
    fn test_parse_error_names_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"t_us": 1, "position": 0, "prox": 1}}"#).unwrap();
        writeln!(file, r#"{{"t_us": 2, "position": 9, "prox": 1}}"#).unwrap();

        match ReplaySource::load(file.path()) {
            Err(IngestionError::ReplayParse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_unpaced_playback_delivers_everything() {
        let source = ReplaySource::from_readings(sample(100)).with_speed(0.0);
        let mut handle = source.spawn(8).unwrap();
        let rx = handle.take_receiver().unwrap();

        let mut received = Vec::new();
        while let Ok(reading) = rx.recv_blocking() {
            received.push(reading);
        }
        assert_eq!(handle.join().unwrap(), 100);
        assert_eq!(received, sample(100));
    }

    #[test]
    fn test_paced_playback_respects_spacing() {
        // 20 ms recorded span at 2x speed
        let readings = vec![
            Reading::new(0, Position::ALL[0], 1),
            Reading::new(20_000, Position::ALL[0], 2),
        ];
        let started = Instant::now();
        let mut handle = ReplaySource::from_readings(readings)
            .with_speed(2.0)
            .spawn(4)
            .unwrap();
        let rx = handle.take_receiver().unwrap();
        while rx.recv_blocking().is_ok() {}
        assert!(started.elapsed() >= Duration::from_millis(10));
        assert!(!handle.is_running());
    }

    #[test]
    fn test_stop_unblocks_full_queue() {
        let mut handle = ReplaySource::from_readings(sample(50))
            .with_speed(0.0)
            .spawn(1)
            .unwrap();
        let sent = handle.stop().unwrap();
        assert!(sent < 50);
    }
}
