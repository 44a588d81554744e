//! Error types for the multi-stream writer.

use std::time::Duration;
use thiserror::Error;

/// Error surfaced at `WriterBuilder::build()` time. Never surfaced at runtime.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("streams list must not be empty")]
    EmptyRoster,

    #[error("firstSpeculativeTimeoutMs must be > 0, got {0:?}")]
    FirstTimeoutNotPositive(Duration),

    #[error("firstSpeculativeTimeoutMs ({first:?}) must be <= maxSpeculativeTimeoutMs ({max:?})")]
    FirstExceedsMax { first: Duration, max: Duration },

    #[error("maxSpeculativeTimeoutMs ({max:?}) must be < requestTimeoutMs ({request:?})")]
    MaxExceedsRequestTimeout { max: Duration, request: Duration },

    #[error("speculativeBackoffMultiplier must be > 0, got {0}")]
    MultiplierNotPositive(f64),

    #[error("bufferSize must be > 0")]
    ZeroBufferSize,

    #[error("bufferSize ({buffer_size}) exceeds MAX_RECORDSET_SIZE ({max})")]
    BufferSizeExceedsMax { buffer_size: usize, max: usize },

    #[error("a wire client is required")]
    MissingWireClient,
}

/// Errors surfaced through a single `write()` call's future.
#[derive(Debug, Clone, Error)]
pub enum WriteError {
    /// Payload exceeds `MAX_RECORD_SIZE`. Never retried, never buffered.
    #[error("record of {len} bytes exceeds the {max} byte record limit")]
    RecordTooLong { len: usize, max: usize },

    /// The record-set writer rejected an append; the buffer holding this
    /// record (and every other record in it) was aborted.
    #[error("framing error: {0}")]
    Framing(String),

    /// Every roster stream was tried, or the hard deadline elapsed, before
    /// any attempt succeeded.
    #[error("record set timed out after {elapsed:?} ({tried} of {roster_size} streams tried)")]
    SetDeadline {
        elapsed: Duration,
        tried: usize,
        roster_size: usize,
    },

    /// The writer has been closed; no further writes are admitted.
    #[error("writer is closed")]
    Closed,
}

/// Failures surfaced by a single attempt against the wire client. These are
/// never returned to callers directly -- the dispatch state machine treats
/// every `WireError` as a speculation trigger, not a user-visible failure.
#[derive(Debug, Clone, Error)]
pub enum WireError {
    #[error("request to stream {stream} timed out")]
    Timeout { stream: String },

    #[error("transport error talking to stream {stream}: {message}")]
    Transport { stream: String, message: String },

    #[error("stream {stream} rejected the write with status {status}")]
    Rejected { stream: String, status: u16 },
}

impl WireError {
    pub fn stream(&self) -> &str {
        match self {
            WireError::Timeout { stream } => stream,
            WireError::Transport { stream, .. } => stream,
            WireError::Rejected { stream, .. } => stream,
        }
    }
}
