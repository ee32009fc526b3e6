use thiserror::Error;
use tm_device::DeviceError;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("{op} failed: {source}")]
    Runtime {
        op: &'static str,
        #[source]
        source: DeviceError,
    },
    #[error("verification failed at ({row}, {col}): expected {expected}, got {actual}")]
    Verification {
        row: usize,
        col: usize,
        expected: f32,
        actual: f32,
    },
    #[error("invalid benchmark configuration: {0}")]
    InvalidConfig(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Process exit code for errors that terminate normally.
    ///
    /// Verification failures abort instead, so they have no code here.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            BenchError::Verification { .. } => None,
            _ => Some(1),
        }
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;
