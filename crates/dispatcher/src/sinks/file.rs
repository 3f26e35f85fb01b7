//! FileSink - writes detections and session uploads as JSON lines
//!
//! Layout under `base_path`:
//! - `detections.jsonl`: one stamped detection per line
//! - `sessions/<session_id>.jsonl`: one upload envelope per line

use chrono::{SecondsFormat, Utc};
use contracts::{ContractError, DetectionResult, ResultSink, UploadEnvelope};
use serde_json::json;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, instrument};

const DETECTIONS_FILE: &str = "detections.jsonl";
const SESSIONS_DIR: &str = "sessions";

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Base output directory
    pub base_path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        Self { base_path }
    }
}

/// Sink that writes to disk files
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    detections: BufWriter<File>,
}

impl FileSink {
    /// Create a new FileSink
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        fs::create_dir_all(config.base_path.join(SESSIONS_DIR))?;
        let detections = OpenOptions::new()
            .create(true)
            .append(true)
            .open(config.base_path.join(DETECTIONS_FILE))?;

        Ok(Self {
            name: name.into(),
            config,
            detections: BufWriter::new(detections),
        })
    }

    /// Open `base_path` from sink params
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params);
        Self::new(name, config)
    }

    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    /// Path of one session's upload file
    pub fn session_path(&self, session_id: &str) -> PathBuf {
        self.config
            .base_path
            .join(SESSIONS_DIR)
            .join(format!("{session_id}.jsonl"))
    }

    fn append_detection(&mut self, detection: &DetectionResult) -> std::io::Result<()> {
        let line = json!({
            "received_at": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "detection": detection,
        });
        serde_json::to_writer(&mut self.detections, &line).map_err(std::io::Error::from)?;
        self.detections.write_all(b"\n")?;
        self.detections.flush()
    }

    fn append_envelope(&self, envelope: &UploadEnvelope) -> std::io::Result<()> {
        // The first batch starts the file over, so a re-upload replaces it
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(!envelope.batch.is_first)
            .truncate(envelope.batch.is_first)
            .open(self.session_path(&envelope.session_id))?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, envelope).map_err(std::io::Error::from)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    fn sink_error(&self, e: std::io::Error) -> ContractError {
        error!(sink = %self.name, error = %e, "Write failed");
        ContractError::sink_write(&self.name, e.to_string())
    }
}

impl ResultSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write_detection",
        skip(self, detection),
        fields(sink = %self.name, t_us = detection.t_us)
    )]
    async fn write_detection(&mut self, detection: &DetectionResult) -> Result<(), ContractError> {
        self.append_detection(detection)
            .map_err(|e| self.sink_error(e))
    }

    #[instrument(
        name = "file_sink_write_batch",
        skip(self, envelope),
        fields(sink = %self.name, session_id = %envelope.session_id, batch = envelope.batch.index)
    )]
    async fn write_batch(&mut self, envelope: &UploadEnvelope) -> Result<(), ContractError> {
        self.append_envelope(envelope)
            .map_err(|e| self.sink_error(e))
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.detections
            .flush()
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush().await?;
        debug!(sink = %self.name, "FileSink closed");
        Ok(())
    }
}
