use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{DeviceError, Result};

/// Size of one device element (`f32`) in bytes.
pub const ELEMENT_SIZE: usize = std::mem::size_of::<f32>();

#[derive(Debug)]
struct Allocation {
    id: u64,
    device_id: u64,
    words: Box<[AtomicU32]>,
}

/// Handle to an `f32` allocation in device memory.
///
/// Cloning the handle is the analogue of copying a device pointer: all clones
/// refer to the same storage. Elements are stored as `f32` bit patterns in
/// atomic words so concurrent invocations can read inputs and write
/// disjoint outputs without locking. Relaxed ordering suffices because the
/// command queue orders every launch against the transfers around it.
#[derive(Debug, Clone)]
pub struct DeviceBuffer {
    inner: Arc<Allocation>,
}

impl DeviceBuffer {
    pub(crate) fn zeroed(id: u64, device_id: u64, len: usize) -> Self {
        let words = (0..len).map(|_| AtomicU32::new(0)).collect();
        DeviceBuffer {
            inner: Arc::new(Allocation {
                id,
                device_id,
                words,
            }),
        }
    }

    /// Number of `f32` elements in this buffer.
    pub fn len(&self) -> usize {
        self.inner.words.len()
    }

    /// Returns true if the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_in_bytes(&self) -> usize {
        self.len() * ELEMENT_SIZE
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    pub(crate) fn device_id(&self) -> u64 {
        self.inner.device_id
    }

    /// Reads element `i`.
    ///
    /// # Panics
    /// Panics if `i >= len()`. Inside a kernel the panic is reported as a
    /// launch failure.
    #[inline]
    pub fn load(&self, i: usize) -> f32 {
        f32::from_bits(self.inner.words[i].load(Ordering::Relaxed))
    }

    /// Writes element `i`.
    ///
    /// # Panics
    /// Panics if `i >= len()`.
    #[inline]
    pub fn store(&self, i: usize, value: f32) {
        self.inner.words[i].store(value.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn write_from(&self, src: &[f32]) -> Result<()> {
        self.check_len(src.len())?;
        for (word, v) in self.inner.words.iter().zip(src) {
            word.store(v.to_bits(), Ordering::Relaxed);
        }
        Ok(())
    }

    pub(crate) fn read_into(&self, dst: &mut [f32]) -> Result<()> {
        self.check_len(dst.len())?;
        for (v, word) in dst.iter_mut().zip(self.inner.words.iter()) {
            *v = f32::from_bits(word.load(Ordering::Relaxed));
        }
        Ok(())
    }

    fn check_len(&self, got: usize) -> Result<()> {
        if got != self.len() {
            return Err(DeviceError::SizeMismatch {
                expected: self.len(),
                got,
            });
        }
        Ok(())
    }
}
