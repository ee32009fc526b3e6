use crate::error::{BenchError, Result};

/// Number of timed trials per run.
pub const NUM_TRIALS: usize = 10;

/// Tile edge length: invocations per block along each axis.
pub const TILE_WIDTH: u32 = 16;

/// Edge length of every matrix in the benchmark.
pub const MATRIX_WIDTH: usize = 512;

/// Period of the ramp used to fill the input matrices.
pub const RAMP_PERIOD: usize = 2048;

/// Parameters of one benchmark run.
///
/// `Default` uses the compiled-in constants; tests construct other sizes
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchConfig {
    pub trials: usize,
    pub tile_width: u32,
    pub width: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            trials: NUM_TRIALS,
            tile_width: TILE_WIDTH,
            width: MATRIX_WIDTH,
        }
    }
}

impl BenchConfig {
    /// Rejects configurations the driver cannot run at all.
    ///
    /// The tile width is not checked here: launch geometry is the device's
    /// call, and a bad tile surfaces as an invalid launch configuration.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 {
            return Err(BenchError::InvalidConfig(
                "matrix width must be > 0".to_string(),
            ));
        }
        if self.trials == 0 {
            return Err(BenchError::InvalidConfig(
                "trial count must be > 0".to_string(),
            ));
        }
        if self.width > u32::MAX as usize {
            return Err(BenchError::InvalidConfig(format!(
                "matrix width {} does not fit a launch grid",
                self.width
            )));
        }
        Ok(())
    }

    /// Elements per matrix (`width²`).
    pub fn elements(&self) -> usize {
        self.width * self.width
    }
}
