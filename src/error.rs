//! Harness error types

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::topology::HostAddress;
use crate::types::DecodeError;

/// Outcome class of a failed procedure call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    /// The procedure rolled back on request
    UserAbort,
    /// The engine rejected the call (constraint, planning, type error, ...)
    GracefulFailure,
    /// The engine failed internally
    UnexpectedFailure,
    /// The connection dropped mid-call
    ConnectionLost,
}

/// A structured procedure call failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcCallFailure {
    pub procedure: String,
    pub status: CallStatus,
    pub message: String,
}

impl ProcCallFailure {
    pub fn new(procedure: impl Into<String>, status: CallStatus, message: impl Into<String>) -> Self {
        Self {
            procedure: procedure.into(),
            status,
            message: message.into(),
        }
    }

    /// A rejection by the engine, the common case
    pub fn graceful(procedure: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(procedure, CallStatus::GracefulFailure, message)
    }
}

impl fmt::Display for ProcCallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "procedure {} failed ({:?}): {}",
            self.procedure, self.status, self.message
        )
    }
}

/// Harness errors
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Connection refused while acquiring a client (retried once)
    #[error("connection refused by {address}")]
    ConnectionRefused { address: HostAddress },

    /// Any other connect failure (not retried)
    #[error("failed to connect to {address}: {message}")]
    Connect { address: HostAddress, message: String },

    #[error("connect to {address} timed out after {timeout:?}")]
    ConnectTimeout {
        address: HostAddress,
        timeout: Duration,
    },

    /// Engine-reported call failure
    #[error("{0}")]
    ProcedureCall(ProcCallFailure),

    #[error("call to {procedure} timed out after {timeout:?}")]
    CallTimeout {
        procedure: String,
        timeout: Duration,
    },

    #[error("topology {topology} failed to compile its schema")]
    CompileFailed { topology: String },

    #[error("topology {topology} failed to start: {message}")]
    Startup { topology: String, message: String },

    #[error("topology {topology} is not running")]
    NotRunning { topology: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no host {host} (topology has {count})")]
    NoSuchHost { host: usize, count: usize },

    /// Teardown found schema changes the test did not revert
    #[error("test {test} changed the catalog without restoring it:\n{diff}")]
    CatalogDrift { test: String, diff: String },

    #[error("client handle is closed")]
    Closed,

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// The structured call failure, if this is one
    pub fn as_call_failure(&self) -> Option<&ProcCallFailure> {
        match self {
            HarnessError::ProcedureCall(f) => Some(f),
            _ => None,
        }
    }
}

impl From<ProcCallFailure> for HarnessError {
    fn from(f: ProcCallFailure) -> Self {
        HarnessError::ProcedureCall(f)
    }
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;
