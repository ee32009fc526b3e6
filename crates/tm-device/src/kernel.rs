use std::fmt::Debug;

use crate::dim::ThreadIndex;

/// Device-side routine executed once per invocation of a launch.
///
/// Invocations run concurrently with no defined order and no way to
/// communicate; an implementation reads its inputs through the
/// `DeviceBuffer` handles it captured and writes only the locations derived
/// from its own `ThreadIndex`. A panic inside `invoke` is reported by the
/// device as a launch failure.
pub trait Kernel: Send + Sync + Debug {
    /// Returns the name of this kernel (used in logs and error messages).
    fn name(&self) -> &str;

    /// Runs a single invocation.
    fn invoke(&self, index: &ThreadIndex);
}
