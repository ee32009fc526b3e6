//! `tm-device` - Emulated accelerator runtime for the tiled matmul benchmark.
//!
//! This crate provides:
//! - A `Device` with its own memory pool and an in-order command queue
//! - `DeviceBuffer` handles passed to kernels in place of device pointers
//! - `Event` timing markers recorded into the queue
//! - Launch geometry (`Dim3`, `LaunchConfig`) validated against device limits
//! - The `Kernel` trait implemented by device-side routines
//! - Runtime `Status` codes and the `DeviceError` type

pub mod device;
pub mod dim;
pub mod error;
pub mod event;
pub mod kernel;
pub mod memory;

// Re-export primary types at the crate root for convenience.
pub use device::{Device, DeviceConfig};
pub use dim::{DeviceLimits, Dim3, LaunchConfig, ThreadIndex};
pub use error::{DeviceError, Result, Status};
pub use event::Event;
pub use kernel::Kernel;
pub use memory::{DeviceBuffer, ELEMENT_SIZE};
