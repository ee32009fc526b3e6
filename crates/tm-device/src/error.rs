use std::fmt;

use thiserror::Error;

/// Failure status codes reported by the device.
///
/// A fallible runtime call that does not return `Ok` fails with exactly one
/// of these codes; `DeviceError::status` recovers the code from an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Device memory capacity exhausted.
    MemoryAllocation,
    /// An argument was out of range (zero-length buffer, size mismatch).
    InvalidValue,
    /// Grid or block dimensions the device cannot execute.
    InvalidConfiguration,
    /// A kernel invocation faulted during execution.
    LaunchFailure,
    /// Asynchronous work has not completed yet.
    NotReady,
    /// Handle does not belong to this device, or was never initialised.
    InvalidResourceHandle,
    /// The device thread is gone.
    DeviceUnavailable,
}

impl Status {
    /// Stable numeric code for this status.
    pub fn code(&self) -> u32 {
        match self {
            Status::MemoryAllocation => 2,
            Status::InvalidValue => 1,
            Status::InvalidConfiguration => 9,
            Status::LaunchFailure => 4,
            Status::NotReady => 600,
            Status::InvalidResourceHandle => 400,
            Status::DeviceUnavailable => 46,
        }
    }

    /// Human-readable description of the status.
    pub fn description(&self) -> &'static str {
        match self {
            Status::MemoryAllocation => "out of device memory",
            Status::InvalidValue => "invalid argument",
            Status::InvalidConfiguration => "invalid configuration argument",
            Status::LaunchFailure => "unspecified launch failure",
            Status::NotReady => "device not ready",
            Status::InvalidResourceHandle => "invalid resource handle",
            Status::DeviceUnavailable => "device unavailable",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.description(), self.code())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("out of device memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },
    #[error("invalid launch configuration: {0}")]
    InvalidConfiguration(String),
    #[error("size mismatch: device buffer holds {expected} elements, host slice has {got}")]
    SizeMismatch { expected: usize, got: usize },
    #[error("kernel '{kernel}' failed during execution: {reason}")]
    LaunchFailure { kernel: String, reason: String },
    #[error("{0}")]
    InvalidHandle(String),
    #[error("event not ready")]
    NotReady,
    #[error("device thread is no longer running")]
    Unavailable,
    #[error("{status}: {detail}")]
    Runtime { status: Status, detail: String },
}

impl DeviceError {
    /// The runtime status code this error reports.
    pub fn status(&self) -> Status {
        match self {
            DeviceError::OutOfMemory { .. } => Status::MemoryAllocation,
            DeviceError::InvalidConfiguration(_) => Status::InvalidConfiguration,
            DeviceError::SizeMismatch { .. } => Status::InvalidValue,
            DeviceError::LaunchFailure { .. } => Status::LaunchFailure,
            DeviceError::InvalidHandle(_) => Status::InvalidResourceHandle,
            DeviceError::NotReady => Status::NotReady,
            DeviceError::Unavailable => Status::DeviceUnavailable,
            DeviceError::Runtime { status, .. } => *status,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            DeviceError::InvalidConfiguration("x".into()).status(),
            Status::InvalidConfiguration
        );
        assert_eq!(
            DeviceError::OutOfMemory {
                requested: 8,
                available: 4
            }
            .status(),
            Status::MemoryAllocation
        );
        assert_eq!(DeviceError::NotReady.status(), Status::NotReady);
    }

    #[test]
    fn test_status_display() {
        let s = Status::InvalidConfiguration.to_string();
        assert!(s.contains("invalid configuration argument"));
        assert!(s.contains("code 9"));
    }
}
