//! # Error Types
//!
//! Every fallible operation returns [`CaError`]. Callers that only need to
//! branch use [`CaError::status`], which collapses the error onto the closed
//! [`CaStatus`] code set.

use std::fmt;

use thiserror::Error;

use super::connectivity::{ConnectivityMask, ConnectivityType};

/// The closed set of result codes every entry point maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaStatus {
    Ok,
    InvalidParam,
    Failed,
    ServerStartedAlready,
}

impl fmt::Display for CaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::InvalidParam => "INVALID_PARAM",
            Self::Failed => "FAILED",
            Self::ServerStartedAlready => "SERVER_STARTED_ALREADY",
        };
        f.write_str(s)
    }
}

/// Errors raised by the connectivity layer and its adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaError {
    /// Rejected synchronously; nothing was changed.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// An adapter or resource failed.
    #[error("operation failed: {0}")]
    Failed(String),

    /// The server was already running; the running instance is untouched.
    #[error("server already started")]
    ServerStartedAlready,

    /// One or more adapters could not be started during selection.
    #[error("selection partially failed: started [{started}], failed {}", format_failures(.failed))]
    SelectionFailed {
        /// Adapters that are now running.
        started: ConnectivityMask,
        /// Adapters that failed, with the reason.
        failed: Vec<(ConnectivityType, String)>,
    },
}

impl CaError {
    /// Shorthand for [`CaError::InvalidParam`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParam(msg.into())
    }

    /// Shorthand for [`CaError::Failed`].
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// The status code this error maps to.
    #[must_use]
    pub fn status(&self) -> CaStatus {
        match self {
            Self::InvalidParam(_) => CaStatus::InvalidParam,
            Self::Failed(_) | Self::SelectionFailed { .. } => CaStatus::Failed,
            Self::ServerStartedAlready => CaStatus::ServerStartedAlready,
        }
    }
}

fn format_failures(failed: &[(ConnectivityType, String)]) -> String {
    let parts: Vec<String> = failed
        .iter()
        .map(|(ty, reason)| format!("{ty}: {reason}"))
        .collect();
    format!("[{}]", parts.join(", "))
}

/// Result alias used throughout the crate.
pub type CaResult<T> = Result<T, CaError>;

/// Collapse a result onto its status code.
pub fn status_of<T>(result: &CaResult<T>) -> CaStatus {
    match result {
        Ok(_) => CaStatus::Ok,
        Err(e) => e.status(),
    }
}
