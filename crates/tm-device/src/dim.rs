use std::fmt;

use crate::error::{DeviceError, Result};

/// A three-component extent used for grid and block dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dim3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dim3 {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Dim3 { x, y, z }
    }

    /// A two-dimensional extent (`z = 1`).
    pub const fn xy(x: u32, y: u32) -> Self {
        Dim3 { x, y, z: 1 }
    }

    /// Total number of cells covered (product of all components).
    pub fn count(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// Inverse of row-major linearisation: `x` varies fastest.
    pub fn unflatten(&self, linear: u64) -> Dim3 {
        let x = self.x as u64;
        let y = self.y as u64;
        Dim3 {
            x: (linear % x) as u32,
            y: ((linear / x) % y) as u32,
            z: (linear / (x * y)) as u32,
        }
    }

    fn has_zero(&self) -> bool {
        self.x == 0 || self.y == 0 || self.z == 0
    }

    fn exceeds(&self, max: &Dim3) -> bool {
        self.x > max.x || self.y > max.y || self.z > max.z
    }
}

impl fmt::Display for Dim3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Hardware limits a launch configuration is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_threads_per_block: u32,
    pub max_block_dim: Dim3,
    pub max_grid_dim: Dim3,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        DeviceLimits {
            max_threads_per_block: 1024,
            max_block_dim: Dim3::new(1024, 1024, 64),
            max_grid_dim: Dim3::new(i32::MAX as u32, 65535, 65535),
        }
    }
}

/// Grid and block geometry for one kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub grid: Dim3,
    pub block: Dim3,
}

impl LaunchConfig {
    pub fn new(grid: Dim3, block: Dim3) -> Self {
        LaunchConfig { grid, block }
    }

    /// Total number of invocations this launch schedules.
    pub fn total_threads(&self) -> u64 {
        self.grid.count() * self.block.count()
    }

    /// Checks the geometry against `limits`.
    ///
    /// # Errors
    /// Returns `DeviceError::InvalidConfiguration` if any grid or block
    /// component is zero or exceeds its limit, or if the block holds more
    /// threads than the device allows.
    pub fn validate(&self, limits: &DeviceLimits) -> Result<()> {
        if self.block.has_zero() {
            return Err(DeviceError::InvalidConfiguration(format!(
                "block dimension {} has a zero component",
                self.block
            )));
        }
        if self.grid.has_zero() {
            return Err(DeviceError::InvalidConfiguration(format!(
                "grid dimension {} has a zero component",
                self.grid
            )));
        }
        if self.block.count() > limits.max_threads_per_block as u64 {
            return Err(DeviceError::InvalidConfiguration(format!(
                "block {} has {} threads, device maximum is {}",
                self.block,
                self.block.count(),
                limits.max_threads_per_block
            )));
        }
        if self.block.exceeds(&limits.max_block_dim) {
            return Err(DeviceError::InvalidConfiguration(format!(
                "block dimension {} exceeds maximum {}",
                self.block, limits.max_block_dim
            )));
        }
        if self.grid.exceeds(&limits.max_grid_dim) {
            return Err(DeviceError::InvalidConfiguration(format!(
                "grid dimension {} exceeds maximum {}",
                self.grid, limits.max_grid_dim
            )));
        }
        Ok(())
    }
}

/// Position of a single invocation within its launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadIndex {
    pub grid_dim: Dim3,
    pub block_dim: Dim3,
    pub block_idx: Dim3,
    pub thread_idx: Dim3,
}

impl ThreadIndex {
    /// Global x coordinate: `block_idx.x * block_dim.x + thread_idx.x`.
    pub fn global_x(&self) -> usize {
        self.block_idx.x as usize * self.block_dim.x as usize + self.thread_idx.x as usize
    }

    /// Global y coordinate: `block_idx.y * block_dim.y + thread_idx.y`.
    pub fn global_y(&self) -> usize {
        self.block_idx.y as usize * self.block_dim.y as usize + self.thread_idx.y as usize
    }
}
