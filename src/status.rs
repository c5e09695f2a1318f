//! Status taxonomy shared by every fallible core operation.
//!
//! Operations return [`LbResult<T>`]; a value is produced only on success.
//! [`Status`] is the flat, loggable view of an outcome.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result alias used across the crate.
pub type LbResult<T> = Result<T, LbError>;

/// Errors produced by core operations.
#[derive(Debug, Error)]
pub enum LbError {
    /// An allocation could not be satisfied.
    #[error("out of memory")]
    OutOfMemory,

    /// An OS-level call failed.
    #[error("{op} failed: {source}")]
    System {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// A caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The object is not in a state that permits the operation.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// A bounded collection is full.
    #[error("limit exceeded: capacity {capacity}")]
    LimitExceeded { capacity: usize },

    /// Nothing was available to satisfy the request.
    #[error("empty")]
    Empty,
}

impl LbError {
    /// Wrap the calling thread's last OS error.
    pub fn last_os(op: &'static str) -> Self {
        LbError::System {
            op,
            source: io::Error::last_os_error(),
        }
    }

    pub fn system(op: &'static str, source: io::Error) -> Self {
        LbError::System { op, source }
    }

    /// The status variant this error maps to.
    pub fn status(&self) -> Status {
        match self {
            LbError::OutOfMemory => Status::OutOfMemory,
            LbError::System { .. } => Status::System,
            LbError::InvalidArgument(_) => Status::InvalidArgument,
            LbError::InvalidState(_) => Status::InvalidState,
            LbError::LimitExceeded { .. } => Status::LimitExceeded,
            LbError::Empty => Status::Empty,
        }
    }

    /// Raw errno for `System` errors, if the OS reported one.
    pub fn errno(&self) -> Option<i32> {
        match self {
            LbError::System { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

impl From<std::collections::TryReserveError> for LbError {
    fn from(_: std::collections::TryReserveError) -> Self {
        LbError::OutOfMemory
    }
}

/// Flat status code, one per outcome kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    OutOfMemory,
    System,
    InvalidArgument,
    InvalidState,
    LimitExceeded,
    Empty,
}

impl Status {
    /// Short tag used in log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::OutOfMemory => "NOMEM",
            Status::System => "SYS",
            Status::InvalidArgument => "INVAL",
            Status::InvalidState => "STATE",
            Status::LimitExceeded => "LIMIT",
            Status::Empty => "EMPTY",
        }
    }

    /// Status of an operation outcome.
    pub fn of<T>(result: &LbResult<T>) -> Status {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&LbError> for Status {
    fn from(err: &LbError) -> Self {
        err.status()
    }
}
