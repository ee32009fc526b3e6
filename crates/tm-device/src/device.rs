use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::dim::{DeviceLimits, LaunchConfig, ThreadIndex};
use crate::error::{DeviceError, Result, Status};
use crate::event::Event;
use crate::kernel::Kernel;
use crate::memory::{DeviceBuffer, ELEMENT_SIZE};

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Static description of an emulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub name: String,
    /// Total device memory; allocations beyond it fail.
    pub memory_capacity_bytes: usize,
    /// Worker threads executing kernel blocks. Zero picks rayon's default.
    pub worker_threads: usize,
    pub limits: DeviceLimits,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            name: "tm-emulated-device".to_string(),
            memory_capacity_bytes: 1 << 30,
            worker_threads: 0,
            limits: DeviceLimits::default(),
        }
    }
}

enum Command {
    Launch {
        config: LaunchConfig,
        kernel: Arc<dyn Kernel>,
    },
    Record(Event),
    Fence(mpsc::Sender<()>),
    Shutdown,
}

/// Sticky execution fault, shared between the host handle and the queue.
#[derive(Debug, Default)]
struct FaultSlot(Mutex<Option<DeviceError>>);

impl FaultSlot {
    fn lock(&self) -> MutexGuard<'_, Option<DeviceError>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self) -> Option<DeviceError> {
        self.lock().clone()
    }

    fn set(&self, err: DeviceError) {
        let mut slot = self.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

struct QueueWorker {
    receiver: mpsc::Receiver<Command>,
    pool: ThreadPool,
    fault: Arc<FaultSlot>,
}

impl QueueWorker {
    fn run(self) {
        tracing::debug!("device queue started");
        for command in self.receiver.iter() {
            match command {
                Command::Launch { config, kernel } => self.execute(&config, kernel.as_ref()),
                Command::Record(event) => event.complete(Instant::now()),
                Command::Fence(done) => {
                    // The host may have given up waiting; nothing to report.
                    let _ = done.send(());
                }
                Command::Shutdown => break,
            }
        }
        tracing::debug!("device queue stopped");
    }

    fn execute(&self, config: &LaunchConfig, kernel: &dyn Kernel) {
        if self.fault.get().is_some() {
            tracing::warn!(kernel = kernel.name(), "skipping launch on faulted device");
            return;
        }
        let grid = config.grid;
        let block = config.block;
        tracing::debug!(kernel = kernel.name(), %grid, %block, "executing launch");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.pool.install(|| {
                (0..grid.count()).into_par_iter().for_each(|linear| {
                    let block_idx = grid.unflatten(linear);
                    for t in 0..block.count() {
                        let index = ThreadIndex {
                            grid_dim: grid,
                            block_dim: block,
                            block_idx,
                            thread_idx: block.unflatten(t),
                        };
                        kernel.invoke(&index);
                    }
                });
            })
        }));

        if let Err(payload) = outcome {
            let reason = panic_message(payload.as_ref());
            tracing::error!(kernel = kernel.name(), %reason, "kernel faulted");
            self.fault.set(DeviceError::LaunchFailure {
                kernel: kernel.name().to_string(),
                reason,
            });
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "kernel panicked".to_string()
    }
}

/// An emulated accelerator.
///
/// The device owns a memory pool, one in-order command queue serviced by a
/// dedicated thread, and a rayon pool that runs the blocks of each launch in
/// parallel. Transfers block the host until all earlier queued work is done;
/// launches and event records return immediately.
pub struct Device {
    id: u64,
    config: DeviceConfig,
    worker_threads: usize,
    sender: mpsc::Sender<Command>,
    handle: Option<JoinHandle<()>>,
    fault: Arc<FaultSlot>,
    last_error: Mutex<Option<DeviceError>>,
    allocations: Mutex<HashMap<u64, usize>>,
    next_buffer_id: AtomicU64,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("worker_threads", &self.worker_threads)
            .finish()
    }
}

impl Device {
    /// Brings up a device with the given configuration.
    ///
    /// # Errors
    /// Returns `DeviceUnavailable` if the worker pool or queue thread cannot
    /// be started.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let id = NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(move |i| format!("tm-device{id}-worker{i}"))
            .build()
            .map_err(|e| DeviceError::Runtime {
                status: Status::DeviceUnavailable,
                detail: format!("failed to build worker pool: {e}"),
            })?;
        let worker_threads = pool.current_num_threads();

        let (sender, receiver) = mpsc::channel();
        let fault = Arc::new(FaultSlot::default());
        let worker = QueueWorker {
            receiver,
            pool,
            fault: Arc::clone(&fault),
        };
        let handle = std::thread::Builder::new()
            .name(format!("tm-device{id}-queue"))
            .spawn(move || worker.run())
            .map_err(|e| DeviceError::Runtime {
                status: Status::DeviceUnavailable,
                detail: format!("failed to spawn queue thread: {e}"),
            })?;

        tracing::info!(
            device = %config.name,
            worker_threads,
            capacity_bytes = config.memory_capacity_bytes,
            "device ready"
        );

        Ok(Device {
            id,
            config,
            worker_threads,
            sender,
            handle: Some(handle),
            fault,
            last_error: Mutex::new(None),
            allocations: Mutex::new(HashMap::new()),
            next_buffer_id: AtomicU64::new(1),
        })
    }

    /// Bytes held by live allocations.
    pub fn memory_used_bytes(&self) -> usize {
        self.allocations().values().sum()
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    fn allocations(&self) -> MutexGuard<'_, HashMap<u64, usize>> {
        self.allocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check_fault(&self) -> Result<()> {
        match self.fault.get() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check_owned(&self, buf: &DeviceBuffer) -> Result<()> {
        if buf.device_id() != self.id || !self.allocations().contains_key(&buf.id()) {
            return Err(DeviceError::InvalidHandle(format!(
                "buffer {} is not a live allocation of device {}",
                buf.id(),
                self.id
            )));
        }
        Ok(())
    }

    /// Allocates `len` zero-initialised `f32` elements of device memory.
    ///
    /// # Errors
    /// `InvalidValue` for `len == 0`, `MemoryAllocation` if the request does
    /// not fit in the remaining capacity.
    pub fn alloc(&self, len: usize) -> Result<DeviceBuffer> {
        self.check_fault()?;
        if len == 0 {
            return Err(DeviceError::Runtime {
                status: Status::InvalidValue,
                detail: "cannot allocate a zero-length buffer".to_string(),
            });
        }
        let available = self
            .config
            .memory_capacity_bytes
            .saturating_sub(self.memory_used_bytes());
        let requested = len.checked_mul(ELEMENT_SIZE).unwrap_or(usize::MAX);
        if requested > available {
            return Err(DeviceError::OutOfMemory {
                requested,
                available,
            });
        }

        let id = self.next_buffer_id.fetch_add(1, Ordering::Relaxed);
        let buf = DeviceBuffer::zeroed(id, self.id, len);
        self.allocations().insert(id, requested);
        tracing::debug!(buffer = id, bytes = requested, "device alloc");
        Ok(buf)
    }

    /// Releases a device allocation. Other clones of the handle must not be
    /// used afterwards.
    pub fn free(&self, buf: DeviceBuffer) -> Result<()> {
        self.check_owned(&buf)?;
        self.allocations().remove(&buf.id());
        tracing::debug!(buffer = buf.id(), "device free");
        Ok(())
    }

    /// Waits until every command queued so far has executed.
    fn drain(&self) -> Result<()> {
        let (done, wait) = mpsc::channel();
        self.sender
            .send(Command::Fence(done))
            .map_err(|_| DeviceError::Unavailable)?;
        wait.recv().map_err(|_| DeviceError::Unavailable)
    }

    /// Copies a host slice into a device buffer of the same length.
    ///
    /// Blocks until all previously queued work has finished, then copies.
    pub fn copy_to_device(&self, src: &[f32], dst: &DeviceBuffer) -> Result<()> {
        self.check_owned(dst)?;
        self.drain()?;
        self.check_fault()?;
        dst.write_from(src)
    }

    /// Copies a device buffer into a host slice of the same length.
    ///
    /// Blocks until all previously queued work has finished, then copies.
    /// An execution fault from earlier work surfaces here.
    pub fn copy_to_host(&self, src: &DeviceBuffer, dst: &mut [f32]) -> Result<()> {
        self.check_owned(src)?;
        self.drain()?;
        self.check_fault()?;
        src.read_into(dst)
    }

    /// Queues `kernel` for execution with the given geometry.
    ///
    /// Launches are asynchronous: a bad configuration is not returned here
    /// but recorded for `take_last_error`.
    pub fn launch(&self, config: &LaunchConfig, kernel: Arc<dyn Kernel>) {
        let outcome = config.validate(&self.config.limits).and_then(|_| {
            tracing::debug!(
                kernel = kernel.name(),
                threads = config.total_threads(),
                "queue launch"
            );
            self.sender
                .send(Command::Launch {
                    config: *config,
                    kernel,
                })
                .map_err(|_| DeviceError::Unavailable)
        });
        if let Err(err) = outcome {
            *self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(err);
        }
    }

    /// Returns and clears the error recorded by the most recent failed
    /// launch. Execution faults are reported by blocking calls instead.
    pub fn take_last_error(&self) -> Result<()> {
        match self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Blocks until all queued work has completed.
    pub fn synchronize(&self) -> Result<()> {
        self.drain()?;
        self.check_fault()
    }

    pub fn create_event(&self) -> Event {
        Event::new(self.id)
    }

    /// Queues a timing marker; it is stamped when the queue reaches it.
    pub fn record_event(&self, event: &Event) -> Result<()> {
        if event.device_id() != self.id {
            return Err(DeviceError::InvalidHandle(
                "event belongs to another device".to_string(),
            ));
        }
        event.mark_pending();
        if self.sender.send(Command::Record(event.clone())).is_err() {
            event.reset();
            return Err(DeviceError::Unavailable);
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // Queued work ahead of the shutdown command still runs.
        let _ = self.sender.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("device queue thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dim::Dim3;

    fn device() -> Device {
        Device::new(DeviceConfig {
            worker_threads: 2,
            ..DeviceConfig::default()
        })
        .unwrap()
    }

    /// Writes each invocation's linear global index into `out`.
    #[derive(Debug)]
    struct IotaKernel {
        out: DeviceBuffer,
        width: usize,
    }

    impl Kernel for IotaKernel {
        fn name(&self) -> &str {
            "iota"
        }

        fn invoke(&self, index: &ThreadIndex) {
            let (x, y) = (index.global_x(), index.global_y());
            if x < self.width && y < self.width {
                self.out.store(y * self.width + x, (y * self.width + x) as f32);
            }
        }
    }

    #[derive(Debug)]
    struct FaultingKernel;

    impl Kernel for FaultingKernel {
        fn name(&self) -> &str {
            "faulting"
        }

        fn invoke(&self, _index: &ThreadIndex) {
            panic!("illegal address");
        }
    }

    #[test]
    fn test_alloc_accounting() {
        let d = device();
        let b = d.alloc(16).unwrap();
        assert_eq!(b.len(), 16);
        assert_eq!(d.memory_used_bytes(), 64);
        assert_eq!(d.worker_threads(), 2);
        d.free(b).unwrap();
        assert_eq!(d.memory_used_bytes(), 0);
    }

    #[test]
    fn test_alloc_zero_is_invalid_value() {
        let d = device();
        let err = d.alloc(0).unwrap_err();
        assert_eq!(err.status(), Status::InvalidValue);
    }

    #[test]
    fn test_alloc_out_of_memory() {
        let d = Device::new(DeviceConfig {
            memory_capacity_bytes: 64,
            worker_threads: 1,
            ..DeviceConfig::default()
        })
        .unwrap();
        let _a = d.alloc(10).unwrap();
        let err = d.alloc(10).unwrap_err();
        assert_eq!(err.status(), Status::MemoryAllocation);
        assert!(matches!(
            err,
            DeviceError::OutOfMemory {
                requested: 40,
                available: 24
            }
        ));
    }

    #[test]
    fn test_double_free_is_invalid_handle() {
        let d = device();
        let b = d.alloc(4).unwrap();
        let alias = b.clone();
        d.free(b).unwrap();
        let err = d.free(alias).unwrap_err();
        assert_eq!(err.status(), Status::InvalidResourceHandle);
    }

    #[test]
    fn test_foreign_buffer_rejected() {
        let d1 = device();
        let d2 = device();
        let b = d1.alloc(4).unwrap();
        let err = d2.copy_to_device(&[0.0; 4], &b).unwrap_err();
        assert_eq!(err.status(), Status::InvalidResourceHandle);
    }

    #[test]
    fn test_copy_roundtrip() {
        let d = device();
        let b = d.alloc(3).unwrap();
        d.copy_to_device(&[1.5, -2.0, 4.0], &b).unwrap();
        let mut host = [0.0; 3];
        d.copy_to_host(&b, &mut host).unwrap();
        assert_eq!(host, [1.5, -2.0, 4.0]);
    }

    #[test]
    fn test_copy_size_mismatch() {
        let d = device();
        let b = d.alloc(3).unwrap();
        let err = d.copy_to_device(&[1.0, 2.0], &b).unwrap_err();
        assert_eq!(err.status(), Status::InvalidValue);
    }

    #[test]
    fn test_launch_covers_every_invocation() {
        let d = device();
        let width = 5;
        let out = d.alloc(width * width).unwrap();
        let kernel = Arc::new(IotaKernel {
            out: out.clone(),
            width,
        });
        // 2x2 grid of 4x4 blocks covers 8x8 > 5x5.
        d.launch(&LaunchConfig::new(Dim3::xy(2, 2), Dim3::xy(4, 4)), kernel);
        d.take_last_error().unwrap();
        let mut host = vec![0.0; width * width];
        d.copy_to_host(&out, &mut host).unwrap();
        let expected: Vec<f32> = (0..width * width).map(|i| i as f32).collect();
        assert_eq!(host, expected);
    }

    #[test]
    fn test_invalid_launch_recorded_then_cleared() {
        let d = device();
        let out = d.alloc(4).unwrap();
        let kernel = Arc::new(IotaKernel { out, width: 2 });
        d.launch(&LaunchConfig::new(Dim3::xy(1, 1), Dim3::xy(0, 0)), kernel);
        let err = d.take_last_error().unwrap_err();
        assert_eq!(err.status(), Status::InvalidConfiguration);
        assert!(d.take_last_error().is_ok());
        // Not an execution fault: the device is still usable.
        assert!(d.synchronize().is_ok());
    }

    #[test]
    fn test_kernel_fault_is_sticky() {
        let d = device();
        let b = d.alloc(1).unwrap();
        d.launch(
            &LaunchConfig::new(Dim3::xy(1, 1), Dim3::xy(1, 1)),
            Arc::new(FaultingKernel),
        );
        assert!(d.take_last_error().is_ok());
        let err = d.synchronize().unwrap_err();
        assert_eq!(err.status(), Status::LaunchFailure);
        assert!(err.to_string().contains("illegal address"));
        let mut host = [0.0; 1];
        assert!(d.copy_to_host(&b, &mut host).is_err());
        assert!(d.alloc(1).is_err());
    }

    #[test]
    fn test_events_bracket_work() {
        let d = device();
        let start = d.create_event();
        let stop = d.create_event();
        d.record_event(&start).unwrap();
        let out = d.alloc(64 * 64).unwrap();
        d.launch(
            &LaunchConfig::new(Dim3::xy(4, 4), Dim3::xy(16, 16)),
            Arc::new(IotaKernel { out, width: 64 }),
        );
        d.record_event(&stop).unwrap();
        stop.synchronize().unwrap();
        let ms = Event::elapsed_ms(&start, &stop).unwrap();
        assert!(ms >= 0.0);
    }

    #[test]
    fn test_event_from_other_device_rejected() {
        let d1 = device();
        let d2 = device();
        let e = d1.create_event();
        assert!(d2.record_event(&e).is_err());
    }

    #[test]
    fn test_record_on_stopped_queue_leaves_event_waitable() {
        let mut d = device();
        d.sender.send(Command::Shutdown).unwrap();
        if let Some(handle) = d.handle.take() {
            handle.join().unwrap();
        }
        let e = d.create_event();
        assert_eq!(d.record_event(&e), Err(DeviceError::Unavailable));
        // Returns immediately instead of waiting on a record that never ran.
        e.synchronize().unwrap();
        assert!(matches!(
            Event::elapsed_ms(&e, &e),
            Err(DeviceError::InvalidHandle(_))
        ));
    }
}
