use tm_device::{DeviceBuffer, Kernel, ThreadIndex};

use crate::matrix::DeviceMatrix;

/// One invocation per output element: `out[row, col]` is the dot product of
/// row `row` of `left` with column `col` of `right`.
///
/// `row` comes from the y axis of the launch and `col` from the x axis.
/// Invocations past the matrix edge return without touching memory.
#[derive(Debug, Clone)]
pub struct MatMulKernel {
    left: DeviceBuffer,
    right: DeviceBuffer,
    out: DeviceBuffer,
    width: usize,
}

impl MatMulKernel {
    pub fn new(left: &DeviceMatrix, right: &DeviceMatrix, out: &DeviceMatrix) -> Self {
        MatMulKernel {
            left: left.buffer().clone(),
            right: right.buffer().clone(),
            out: out.buffer().clone(),
            width: out.width(),
        }
    }
}

impl Kernel for MatMulKernel {
    fn name(&self) -> &str {
        "matmul"
    }

    fn invoke(&self, index: &ThreadIndex) {
        let row = index.global_y();
        let col = index.global_x();
        let w = self.width;
        if row >= w || col >= w {
            return;
        }

        let mut sum = 0.0f32;
        for k in 0..w {
            sum += self.left.load(row * w + k) * self.right.load(k * w + col);
        }
        self.out.store(row * w + col, sum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_device::{Device, DeviceConfig, Dim3};

    fn index(block_idx: Dim3, thread_idx: Dim3) -> ThreadIndex {
        ThreadIndex {
            grid_dim: Dim3::xy(2, 2),
            block_dim: Dim3::xy(4, 4),
            block_idx,
            thread_idx,
        }
    }

    fn setup(width: usize) -> (Device, DeviceMatrix, DeviceMatrix, DeviceMatrix) {
        let device = Device::new(DeviceConfig::default()).unwrap();
        let a = DeviceMatrix::alloc(&device, width).unwrap();
        let b = DeviceMatrix::alloc(&device, width).unwrap();
        let c = DeviceMatrix::alloc(&device, width).unwrap();
        (device, a, b, c)
    }

    #[test]
    fn test_single_invocation_dot_product() {
        let (device, a, b, c) = setup(2);
        // [1,2;3,4] @ [5,6;7,8] = [19,22;43,50]
        device.copy_to_device(&[1.0, 2.0, 3.0, 4.0], a.buffer()).unwrap();
        device.copy_to_device(&[5.0, 6.0, 7.0, 8.0], b.buffer()).unwrap();
        let k = MatMulKernel::new(&a, &b, &c);

        k.invoke(&index(Dim3::xy(0, 0), Dim3::xy(1, 1)));
        assert_eq!(c.buffer().load(3), 50.0);
        // Other elements untouched.
        assert_eq!(c.buffer().load(0), 0.0);

        k.invoke(&index(Dim3::xy(0, 0), Dim3::xy(0, 1)));
        assert_eq!(c.buffer().load(2), 43.0);
    }

    #[test]
    fn test_out_of_bounds_invocation_writes_nothing() {
        let (device, a, b, c) = setup(5);
        device.copy_to_device(&[1.0; 25], a.buffer()).unwrap();
        device.copy_to_device(&[1.0; 25], b.buffer()).unwrap();
        device.copy_to_device(&[-1.0; 25], c.buffer()).unwrap();
        let k = MatMulKernel::new(&a, &b, &c);

        // Block (1,1), thread (3,3) maps to (7,7), outside a 5x5 matrix.
        k.invoke(&index(Dim3::xy(1, 1), Dim3::xy(3, 3)));
        // Block (1,0), thread (1,0) maps to col 5, just past the edge.
        k.invoke(&index(Dim3::xy(1, 0), Dim3::xy(1, 0)));
        assert!((0..25).all(|i| c.buffer().load(i) == -1.0));

        // Block (1,1), thread (0,0) maps to (4,4), the last valid element.
        k.invoke(&index(Dim3::xy(1, 1), Dim3::xy(0, 0)));
        assert_eq!(c.buffer().load(24), 5.0);
    }
}
