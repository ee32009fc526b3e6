use tm_device::{Device, DeviceBuffer, ELEMENT_SIZE};

use crate::error::Result;
use crate::status;

/// A square `f32` matrix in host memory, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct HostMatrix {
    width: usize,
    data: Vec<f32>,
}

impl HostMatrix {
    /// Wraps row-major data of a `width × width` matrix.
    ///
    /// # Panics
    /// Panics if `data.len() != width * width`.
    pub fn from_vec(width: usize, data: Vec<f32>) -> Self {
        assert_eq!(
            data.len(),
            width * width,
            "data length {} does not match a {width}x{width} matrix",
            data.len()
        );
        HostMatrix { width, data }
    }

    pub fn zeros(width: usize) -> Self {
        HostMatrix {
            width,
            data: vec![0.0; width * width],
        }
    }

    /// Fills element `i` with `i - cor`, where `cor` restarts at every
    /// multiple of `period`.
    ///
    /// Values stay in `[0, period)`, small integers that `f32` holds exactly.
    pub fn ramp(width: usize, period: usize) -> Self {
        let n = width * width;
        let mut data = Vec::with_capacity(n);
        let mut cor = 0;
        for i in 0..n {
            if i % period == 0 {
                cor = i;
            }
            data.push((i - cor) as f32);
        }
        HostMatrix { width, data }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn size_in_bytes(&self) -> usize {
        self.data.len() * ELEMENT_SIZE
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

/// A square matrix resident in device memory.
#[derive(Debug)]
pub struct DeviceMatrix {
    width: usize,
    buffer: DeviceBuffer,
}

impl DeviceMatrix {
    /// Allocates a zeroed `width × width` matrix on `device`.
    pub fn alloc(device: &Device, width: usize) -> Result<Self> {
        let buffer = status::check("device alloc", device.alloc(width * width))?;
        Ok(DeviceMatrix { width, buffer })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn buffer(&self) -> &DeviceBuffer {
        &self.buffer
    }

    pub fn size_in_bytes(&self) -> usize {
        self.buffer.size_in_bytes()
    }

    /// Returns the allocation to the device.
    pub fn free(self, device: &Device) -> Result<()> {
        status::check("device free", device.free(self.buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RAMP_PERIOD;
    use tm_device::DeviceConfig;

    #[test]
    fn test_ramp_small_is_index() {
        let m = HostMatrix::ramp(4, RAMP_PERIOD);
        let expected: Vec<f32> = (0..16).map(|i| i as f32).collect();
        assert_eq!(m.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_ramp_resets_every_period() {
        let m = HostMatrix::ramp(64, RAMP_PERIOD);
        let data = m.as_slice();
        assert_eq!(data[0], 0.0);
        assert_eq!(data[2047], 2047.0);
        assert_eq!(data[2048], 0.0);
        assert_eq!(data[2049], 1.0);
        assert_eq!(data[4095], 2047.0);
        assert!(data
            .iter()
            .enumerate()
            .all(|(i, &v)| v == (i % RAMP_PERIOD) as f32));
    }

    #[test]
    fn test_ramp_is_deterministic() {
        assert_eq!(HostMatrix::ramp(100, 7), HostMatrix::ramp(100, 7));
    }

    #[test]
    fn test_get_row_major() {
        let m = HostMatrix::from_vec(2, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(m.as_slice()[1], 2.0);
        assert_eq!(m.as_slice()[2], 3.0);
        assert_eq!(m.size_in_bytes(), 16);
    }

    #[test]
    #[should_panic]
    fn test_from_vec_wrong_len() {
        HostMatrix::from_vec(3, vec![0.0; 4]);
    }

    #[test]
    fn test_device_matrix_matches_host_size() {
        let device = Device::new(DeviceConfig::default()).unwrap();
        let host = HostMatrix::zeros(8);
        let dev = DeviceMatrix::alloc(&device, 8).unwrap();
        assert_eq!(dev.width(), host.width());
        assert_eq!(dev.size_in_bytes(), host.size_in_bytes());
        dev.free(&device).unwrap();
        assert_eq!(device.memory_used_bytes(), 0);
    }
}
