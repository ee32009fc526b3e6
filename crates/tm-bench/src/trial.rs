use std::sync::Arc;

use tm_device::{Device, Event};

use crate::error::{BenchError, Result};
use crate::geometry::TileGeometry;
use crate::kernel::MatMulKernel;
use crate::matrix::{DeviceMatrix, HostMatrix};
use crate::status::check;

/// Left, right and output matrices in host memory.
#[derive(Debug, Clone)]
pub struct HostOperands {
    pub left: HostMatrix,
    pub right: HostMatrix,
    pub out: HostMatrix,
}

impl HostOperands {
    /// Ramp-filled inputs and a zeroed output.
    pub fn ramp(width: usize, period: usize) -> Self {
        HostOperands {
            left: HostMatrix::ramp(width, period),
            right: HostMatrix::ramp(width, period),
            out: HostMatrix::zeros(width),
        }
    }

    pub fn width(&self) -> usize {
        self.out.width()
    }
}

/// Device-resident counterparts of `HostOperands`.
#[derive(Debug)]
pub struct DeviceOperands {
    pub left: DeviceMatrix,
    pub right: DeviceMatrix,
    pub out: DeviceMatrix,
}

impl DeviceOperands {
    /// Allocates all three matrices, or none: if a later allocation fails
    /// the earlier ones are released before the error is returned.
    pub fn alloc(device: &Device, width: usize) -> Result<Self> {
        let left = DeviceMatrix::alloc(device, width)?;
        let right = match DeviceMatrix::alloc(device, width) {
            Ok(m) => m,
            Err(err) => return Err(release_after(device, [left], err)),
        };
        let out = match DeviceMatrix::alloc(device, width) {
            Ok(m) => m,
            Err(err) => return Err(release_after(device, [left, right], err)),
        };
        Ok(DeviceOperands { left, right, out })
    }

    /// Releases every matrix, reporting the first failure.
    pub fn free(self, device: &Device) -> Result<()> {
        [
            self.left.free(device),
            self.right.free(device),
            self.out.free(device),
        ]
        .into_iter()
        .collect()
    }
}

fn release_after<const N: usize>(
    device: &Device,
    matrices: [DeviceMatrix; N],
    err: BenchError,
) -> BenchError {
    for m in matrices {
        if let Err(e) = m.free(device) {
            tracing::warn!(error = %e, "release after failed allocation");
        }
    }
    err
}

/// Runs one timed trial and returns its elapsed time in milliseconds.
///
/// The interval covers the input uploads, the launch and the output
/// download. `host.out` is overwritten on success; on a launch failure it is
/// left untouched.
pub fn run_trial(
    device: &Device,
    host: &mut HostOperands,
    dev: &DeviceOperands,
    tile_width: u32,
) -> Result<f32> {
    let start = device.create_event();
    let stop = device.create_event();
    check("event record", device.record_event(&start))?;

    check(
        "host-to-device copy",
        device.copy_to_device(host.left.as_slice(), dev.left.buffer()),
    )?;
    check(
        "host-to-device copy",
        device.copy_to_device(host.right.as_slice(), dev.right.buffer()),
    )?;

    let geometry = TileGeometry::new(host.width(), tile_width);
    let kernel = Arc::new(MatMulKernel::new(&dev.left, &dev.right, &dev.out));
    device.launch(&geometry.launch_config(), kernel);
    check("kernel launch", device.take_last_error())?;

    check(
        "device-to-host copy",
        device.copy_to_host(dev.out.buffer(), host.out.as_mut_slice()),
    )?;

    check("event record", device.record_event(&stop))?;
    check("event synchronize", stop.synchronize())?;
    let elapsed_ms = check("event elapsed time", Event::elapsed_ms(&start, &stop))?;

    tracing::debug!(
        grid = %geometry.grid,
        block = %geometry.block,
        idle_invocations = geometry.idle_invocations(host.width()),
        elapsed_ms,
        "trial complete"
    );
    Ok(elapsed_ms)
}
