use crate::error::{BenchError, Result};
use crate::matrix::HostMatrix;

/// Sequential dot product of row `row` of `left` and column `col` of
/// `right`, accumulated with `k` ascending.
fn dot(left: &[f32], right: &[f32], width: usize, row: usize, col: usize) -> f32 {
    let mut sum = 0.0f32;
    for k in 0..width {
        sum += left[row * width + k] * right[k * width + col];
    }
    sum
}

/// Sequential triple-loop product `left @ right`.
///
/// # Panics
/// Panics if the matrices differ in width.
pub fn reference_matmul(left: &HostMatrix, right: &HostMatrix) -> HostMatrix {
    assert_eq!(left.width(), right.width(), "matrix widths differ");
    let w = left.width();
    let (a, b) = (left.as_slice(), right.as_slice());
    let mut c = vec![0.0f32; w * w];
    for i in 0..w {
        for j in 0..w {
            c[i * w + j] = dot(a, b, w, i, j);
        }
    }
    HostMatrix::from_vec(w, c)
}

/// Recomputes `left @ right` sequentially and requires `out` to match every
/// element exactly.
///
/// Exact comparison holds because the reference accumulates in the same
/// order as the kernel and the generated inputs are small integers.
///
/// # Errors
/// `BenchError::Verification` for the first mismatching element in
/// row-major order.
pub fn verify(left: &HostMatrix, right: &HostMatrix, out: &HostMatrix) -> Result<()> {
    let w = out.width();
    if left.width() != w || right.width() != w {
        return Err(BenchError::InvalidConfig(format!(
            "cannot verify: widths {} @ {} -> {}",
            left.width(),
            right.width(),
            w
        )));
    }
    let (a, b, c) = (left.as_slice(), right.as_slice(), out.as_slice());
    for row in 0..w {
        for col in 0..w {
            let expected = dot(a, b, w, row, col);
            let actual = c[row * w + col];
            if expected != actual {
                return Err(BenchError::Verification {
                    row,
                    col,
                    expected,
                    actual,
                });
            }
        }
    }
    tracing::debug!(width = w, "verification passed");
    Ok(())
}
