//! NetworkSink - one UDP datagram per verdict or upload batch.
//!
//! Every datagram is a [`Frame`]: a `kind` tag plus the payload, so a
//! collector can tell live verdicts from session batches without
//! inspecting the body.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use contracts::{ContractError, DetectionResult, ResultSink, UploadEnvelope};
use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::{debug, instrument, warn};

/// Largest payload a single IPv4 UDP datagram can carry
const UDP_PAYLOAD_LIMIT: usize = 65_507;

/// Wire encoding of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Json,
    Bincode,
}

impl WireFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(Self::Json),
            "bincode" => Some(Self::Bincode),
            _ => None,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Frame<'a> {
    Detection(&'a DetectionResult),
    Batch(&'a UploadEnvelope),
}

/// Collector address and framing for a [`NetworkSink`]
#[derive(Debug, Clone)]
pub struct NetworkTarget {
    pub addr: SocketAddr,
    pub format: WireFormat,
    /// Frames larger than this are refused, never fragmented
    pub max_datagram: usize,
}

impl NetworkTarget {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            format: WireFormat::default(),
            max_datagram: UDP_PAYLOAD_LIMIT,
        }
    }

    /// Read `addr`, `format` and `max_datagram` from sink params
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let raw = params.get("addr").ok_or("network sink requires 'addr'")?;
        let addr = raw
            .parse()
            .map_err(|e| format!("'{raw}' is not a socket address: {e}"))?;
        let mut target = Self::new(addr);

        if let Some(format) = params.get("format") {
            target.format = WireFormat::parse(format)
                .ok_or_else(|| format!("format must be json or bincode, got '{format}'"))?;
        }
        if let Some(limit) = params.get("max_datagram") {
            let limit: usize = limit
                .parse()
                .map_err(|_| format!("max_datagram '{limit}' is not a byte count"))?;
            target.max_datagram = limit.min(UDP_PAYLOAD_LIMIT);
        }
        Ok(target)
    }
}

/// Sends frames to a UDP collector
pub struct NetworkSink {
    name: String,
    target: NetworkTarget,
    socket: Option<UdpSocket>,
    frames_sent: u64,
}

impl NetworkSink {
    #[instrument(name = "network_sink_connect", skip(name, target), fields(addr = %target.addr))]
    pub async fn connect(name: impl Into<String>, target: NetworkTarget) -> std::io::Result<Self> {
        let name = name.into();
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(target.addr).await?;
        debug!(sink = %name, addr = %target.addr, format = ?target.format, "Collector socket ready");

        Ok(Self {
            name,
            target,
            socket: Some(socket),
            frames_sent: 0,
        })
    }

    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let target =
            NetworkTarget::from_params(params).map_err(|e| ContractError::sink_write(&name, e))?;
        match Self::connect(name.clone(), target).await {
            Ok(sink) => Ok(sink),
            Err(e) => Err(ContractError::sink_connection(name, e.to_string())),
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    fn frame(&self, frame: &Frame<'_>) -> Result<Bytes, ContractError> {
        let encoded = match self.target.format {
            WireFormat::Json => serde_json::to_vec(frame).map_err(|e| e.to_string()),
            WireFormat::Bincode => bincode::serialize(frame).map_err(|e| e.to_string()),
        }
        .map_err(|e| ContractError::sink_write(&self.name, format!("encode: {e}")))?;

        if encoded.len() > self.target.max_datagram {
            return Err(ContractError::sink_write(
                &self.name,
                format!(
                    "frame is {} bytes, limit {}",
                    encoded.len(),
                    self.target.max_datagram
                ),
            ));
        }
        Ok(Bytes::from(encoded))
    }

    async fn send(&mut self, frame: Frame<'_>) -> Result<(), ContractError> {
        let payload = self.frame(&frame)?;
        let Some(socket) = self.socket.as_ref() else {
            return Err(ContractError::sink_write(&self.name, "sink is closed"));
        };

        if let Err(e) = socket.send(&payload).await {
            // Treated as transient so the upload loop may retry the batch
            warn!(sink = %self.name, error = %e, "Datagram not sent");
            return Err(ContractError::sink_connection(&self.name, e.to_string()));
        }
        self.frames_sent += 1;
        Ok(())
    }
}

impl ResultSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "network_sink_write_detection",
        skip(self, detection),
        fields(sink = %self.name, direction = ?detection.direction)
    )]
    async fn write_detection(&mut self, detection: &DetectionResult) -> Result<(), ContractError> {
        self.send(Frame::Detection(detection)).await
    }

    #[instrument(
        name = "network_sink_write_batch",
        skip(self, envelope),
        fields(sink = %self.name, session_id = %envelope.session_id, batch = envelope.batch.index)
    )]
    async fn write_batch(&mut self, envelope: &UploadEnvelope) -> Result<(), ContractError> {
        self.send(Frame::Batch(envelope)).await
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        if self.socket.take().is_some() {
            debug!(sink = %self.name, frames = self.frames_sent, "Collector socket closed");
        }
        Ok(())
    }
}
