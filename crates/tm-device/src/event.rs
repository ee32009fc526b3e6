use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::error::{DeviceError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
enum EventState {
    Created,
    Pending,
    Complete(Instant),
}

#[derive(Debug)]
struct EventInner {
    device_id: u64,
    state: Mutex<EventState>,
    completed: Condvar,
}

/// A timing marker placed in the device command queue.
///
/// The marker is stamped with the current instant when the device thread
/// reaches it, so the interval between two markers covers exactly the work
/// queued between them. Dropping the event destroys it.
#[derive(Debug, Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    pub(crate) fn new(device_id: u64) -> Self {
        Event {
            inner: Arc::new(EventInner {
                device_id,
                state: Mutex::new(EventState::Created),
                completed: Condvar::new(),
            }),
        }
    }

    pub(crate) fn device_id(&self) -> u64 {
        self.inner.device_id
    }

    fn state(&self) -> MutexGuard<'_, EventState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn mark_pending(&self) {
        *self.state() = EventState::Pending;
    }

    pub(crate) fn complete(&self, at: Instant) {
        *self.state() = EventState::Complete(at);
        self.inner.completed.notify_all();
    }

    /// Drops a pending record that never reached the queue.
    pub(crate) fn reset(&self) {
        *self.state() = EventState::Created;
        self.inner.completed.notify_all();
    }

    /// Blocks the calling thread until the device has reached this marker.
    pub fn synchronize(&self) -> Result<()> {
        let mut state = self.state();
        while matches!(*state, EventState::Pending) {
            state = self
                .inner
                .completed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    fn timestamp(&self) -> Result<Instant> {
        match *self.state() {
            EventState::Complete(at) => Ok(at),
            EventState::Pending => Err(DeviceError::NotReady),
            EventState::Created => Err(DeviceError::InvalidHandle(
                "event was never recorded".to_string(),
            )),
        }
    }

    /// Milliseconds elapsed between two completed markers.
    ///
    /// # Errors
    /// `NotReady` if either marker is still pending, `InvalidHandle` if either
    /// was never recorded.
    pub fn elapsed_ms(start: &Event, stop: &Event) -> Result<f32> {
        let begin = start.timestamp()?;
        let end = stop.timestamp()?;
        Ok(end.saturating_duration_since(begin).as_secs_f32() * 1000.0)
    }
}
