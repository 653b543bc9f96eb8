//! Error types for the request task.
//!
//! # Design
//! Every failure a task can report falls into a small closed set of kinds.
//! Each kind carries a stable negative integer code so the C bridge can hand
//! a plain status back to callers that cannot match on Rust enums. Transport
//! failures keep their own enum because the engine reports them before the
//! task decides what they mean.

use thiserror::Error;

/// Errors returned by `RequestTask` operations.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The operation is not valid in the task's current phase, e.g. waiting
    /// on a task that was never armed or arming a task twice.
    #[error("invalid task state: {operation} not allowed while {phase}")]
    State {
        operation: &'static str,
        phase: &'static str,
    },

    /// A setter received an empty or otherwise unusable argument. The task
    /// is left unchanged and remains usable.
    #[error("invalid configuration for {field}: {reason}")]
    ConfigInvalid {
        field: &'static str,
        reason: String,
    },

    /// The capture buffer could not be reserved.
    #[error("failed to allocate {requested} byte capture buffer")]
    AllocationFailed { requested: usize },

    /// Filesystem work around the temp file or an upload attachment failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The transfer succeeded but the bytes on disk do not match the
    /// length the server announced.
    #[error("downloaded size mismatch: expected {expected} bytes, found {actual}")]
    Validation { expected: u64, actual: u64 },

    /// The transport engine failed the transfer.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl TaskError {
    pub const STATE: i32 = -1;
    pub const CONFIG_INVALID: i32 = -2;
    pub const ALLOCATION_FAILED: i32 = -3;
    pub const IO: i32 = -4;
    pub const VALIDATION: i32 = -5;
    pub const TRANSPORT: i32 = -6;

    /// Stable status code for this error kind. Success is `0`.
    pub fn code(&self) -> i32 {
        match self {
            TaskError::State { .. } => Self::STATE,
            TaskError::ConfigInvalid { .. } => Self::CONFIG_INVALID,
            TaskError::AllocationFailed { .. } => Self::ALLOCATION_FAILED,
            TaskError::Io { .. } => Self::IO,
            TaskError::Validation { .. } => Self::VALIDATION,
            TaskError::Transport(_) => Self::TRANSPORT,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        TaskError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        TaskError::ConfigInvalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Failures reported by a `Transport` while performing a request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Name resolution or TCP/TLS connection setup failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// A configured timeout elapsed.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Throughput stayed below the configured floor for the whole window.
    #[error("transfer too slow: {bytes} bytes in {window_secs}s, below {limit} bytes/s")]
    LowSpeed {
        bytes: u64,
        window_secs: u64,
        limit: u64,
    },

    /// The sink accepted fewer bytes than it was given.
    #[error("write callback accepted {accepted} of {offered} bytes")]
    WriteAborted { offered: usize, accepted: usize },

    /// The server answered with an error status and the task was configured
    /// to treat that as a failure.
    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("invalid proxy {proxy}: {reason}")]
    InvalidProxy { proxy: String, reason: String },

    #[error("tls setup failed: {0}")]
    Tls(String),

    #[error("transport error: {0}")]
    Other(String),
}
