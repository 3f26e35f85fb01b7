//! Dispatcher error types

use contracts::ContractError;
use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// A batch failed for good; the rest of the session was not sent
    #[error("upload of session {session_id} to '{sink_name}' aborted at batch {batch}/{total}: {source}")]
    UploadAborted {
        sink_name: String,
        session_id: String,
        batch: usize,
        total: usize,
        #[source]
        source: ContractError,
    },

    /// Sink worker is gone
    #[error("sink '{sink_name}' worker closed")]
    WorkerClosed { sink_name: String },

    /// Sink write error (from contract)
    #[error("sink error: {0}")]
    Contract(#[from] ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn worker_closed(sink_name: impl Into<String>) -> Self {
        Self::WorkerClosed {
            sink_name: sink_name.into(),
        }
    }
}
