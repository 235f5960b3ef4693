// SPDX-License-Identifier: MPL-2.0

//! Error types for the capture pipeline

use crate::backends::Status;
use std::fmt;

/// Result type alias using VideoError
pub type VideoResult<T> = Result<T, VideoError>;

/// Capture pipeline error
///
/// Every variant is terminal for the session: nothing is retried, the session
/// aborts the remaining steps and runs its full teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoError {
    /// A hardware component could not be instantiated or lacks expected ports
    CreationFailure {
        message: String,
        status: Option<Status>,
    },
    /// A format commit or parameter set was rejected
    ConfigurationFailure {
        message: String,
        status: Option<Status>,
    },
    /// The camera to encoder tunnel could not be created or enabled
    ConnectionFailure {
        message: String,
        status: Option<Status>,
    },
    /// File open, file write or buffer pool allocation failed
    ResourceFailure {
        message: String,
        status: Option<Status>,
    },
    /// Pool exhausted or required state missing inside the delivery callback
    FatalInvariantViolation(String),
    /// The capture wait was cancelled by an interrupt signal
    Interrupted,
}

impl VideoError {
    pub fn creation(message: impl Into<String>, status: Status) -> Self {
        VideoError::CreationFailure {
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn configuration(message: impl Into<String>, status: Status) -> Self {
        VideoError::ConfigurationFailure {
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn connection(message: impl Into<String>, status: Status) -> Self {
        VideoError::ConnectionFailure {
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn resource(message: impl Into<String>, status: Status) -> Self {
        VideoError::ResourceFailure {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Framework status code attached to this error, if any
    pub fn status(&self) -> Option<Status> {
        match self {
            VideoError::CreationFailure { status, .. }
            | VideoError::ConfigurationFailure { status, .. }
            | VideoError::ConnectionFailure { status, .. }
            | VideoError::ResourceFailure { status, .. } => *status,
            VideoError::FatalInvariantViolation(_) | VideoError::Interrupted => None,
        }
    }
}

fn write_with_status(
    f: &mut fmt::Formatter<'_>,
    kind: &str,
    message: &str,
    status: &Option<Status>,
) -> fmt::Result {
    match status {
        Some(status) => write!(f, "{}: {} ({})", kind, message, status),
        None => write!(f, "{}: {}", kind, message),
    }
}

impl fmt::Display for VideoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoError::CreationFailure { message, status } => {
                write_with_status(f, "Creation failed", message, status)
            }
            VideoError::ConfigurationFailure { message, status } => {
                write_with_status(f, "Configuration rejected", message, status)
            }
            VideoError::ConnectionFailure { message, status } => {
                write_with_status(f, "Connection failed", message, status)
            }
            VideoError::ResourceFailure { message, status } => {
                write_with_status(f, "Resource unavailable", message, status)
            }
            VideoError::FatalInvariantViolation(msg) => write!(f, "Fatal invariant violation: {}", msg),
            VideoError::Interrupted => write!(f, "Capture interrupted"),
        }
    }
}

impl std::error::Error for VideoError {}

// Conversions for I/O errors
impl From<std::io::Error> for VideoError {
    fn from(err: std::io::Error) -> Self {
        VideoError::ResourceFailure {
            message: err.to_string(),
            status: None,
        }
    }
}
