//! `tm-bench` - Tiled parallel matrix multiply benchmark.
//!
//! This crate provides:
//! - `MatMulKernel`, one invocation per output element over a square tiling
//! - `run_trial`, a single timed upload/launch/download round trip
//! - `verify`, a sequential reference check with zero tolerance
//! - `Driver`, which repeats trials, averages timings and verifies the result
//! - `status::check`, which turns runtime failures into fatal errors

pub mod config;
pub mod driver;
pub mod error;
pub mod geometry;
pub mod kernel;
pub mod matrix;
pub mod status;
pub mod trial;
pub mod verify;

pub use config::BenchConfig;
pub use driver::{BenchReport, Driver};
pub use error::{BenchError, Result};
pub use geometry::TileGeometry;
pub use kernel::MatMulKernel;
pub use matrix::{DeviceMatrix, HostMatrix};
pub use trial::{run_trial, DeviceOperands, HostOperands};
pub use verify::{reference_matmul, verify};
