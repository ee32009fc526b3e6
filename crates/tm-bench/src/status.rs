use tm_device::{DeviceError, Status};

use crate::error::{BenchError, Result};

/// Passes a successful runtime result through; turns a failure into a fatal
/// `BenchError::Runtime`.
///
/// `op` names the runtime call for the diagnostic, which the entry point
/// prints once via [`diagnostic`]. There is no retry.
pub fn check<T>(op: &'static str, result: tm_device::Result<T>) -> Result<T> {
    result.map_err(|source| {
        tracing::debug!(op, status = source.status().code(), "runtime call failed");
        BenchError::Runtime { op, source }
    })
}

/// Diagnostic line for a failed runtime call.
///
/// Invalid launch configurations get their own message because they point at
/// the tiling geometry rather than at the device.
pub fn diagnostic(op: &str, err: &DeviceError) -> String {
    let status = err.status();
    match status {
        Status::InvalidConfiguration => format!(
            "{op}: invalid launch configuration [status {}]: check grid and block dimensions against device limits ({err})",
            status.code()
        ),
        _ => format!(
            "{op}: runtime error [status {}] {}: {err}",
            status.code(),
            status.description()
        ),
    }
}

/// The single line printed to stderr when a run ends in failure.
pub fn failure_message(err: &BenchError) -> String {
    match err {
        BenchError::Runtime { op, source } => diagnostic(op, source),
        other => other.to_string(),
    }
}
