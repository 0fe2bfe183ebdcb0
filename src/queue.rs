//! The legacy id-based queue facade (`spec.md` §4.7, §6): validates,
//! forwards to HAL, and never constructs new core objects of its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::device::Device;
use crate::error::DeviceError;
use crate::hal::HalHandle;
use crate::resource::{Buffer, CommandBuffer};

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum QueueSubmitError {
    #[error("device has been destroyed")]
    DeviceDestroyed,
    #[error("command buffer belongs to a different device")]
    ForeignCommandBuffer,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("write of {len} bytes at offset {offset} overflows buffer of size {size}")]
pub struct BufferWriteOutOfBounds {
    pub offset: u64,
    pub len: u64,
    pub size: u64,
}

/// A device's default command queue (`spec.md` GLOSSARY). Holds its own
/// HAL fence, created once at construction, used to observe submission
/// completion (SPEC_FULL §F).
pub struct Queue {
    pub device: Arc<Device>,
    fence: Box<dyn HalHandle>,
    last_submission_index: AtomicU64,
}

impl Queue {
    pub fn new(device: Arc<Device>) -> Result<Self, DeviceError> {
        if !device.is_valid() {
            return Err(DeviceError::DeviceDestroyed);
        }
        let guard = device.snatch_lock.read();
        let hal = device
            .hal_device
            .get(&guard)
            .ok_or(DeviceError::DeviceDestroyed)?;
        let fence = hal.create_fence().map_err(|_| DeviceError::DeviceLost)?;
        drop(guard);
        Ok(Self {
            device,
            fence,
            last_submission_index: AtomicU64::new(0),
        })
    }

    /// `spec.md` §6 `Queue::submit`. Consumes every finished command
    /// buffer; there is no HAL "execute" call to forward to (no GPU
    /// timeline is modeled), so this only validates ownership and assigns
    /// the buffers a submission index other callers can wait on.
    pub fn submit(&self, command_buffers: Vec<CommandBuffer>) -> Result<u64, QueueSubmitError> {
        profiling::scope!("submit", "Queue");
        if !self.device.is_valid() {
            log::warn!("submit on destroyed device");
            return Err(QueueSubmitError::DeviceDestroyed);
        }
        for cb in &command_buffers {
            if !Arc::ptr_eq(&cb.device, &self.device) {
                log::warn!("submit rejected a command buffer belonging to another device");
                return Err(QueueSubmitError::ForeignCommandBuffer);
            }
        }
        let index = self.device.next_submission_index();
        self.last_submission_index.store(index, Ordering::Release);
        log::debug!("Queue submission {index} recorded");
        drop(command_buffers);
        Ok(index)
    }

    /// `spec.md` §6 `write_buffer`: validates the write stays in bounds and
    /// marks the written range initialized. There is no HAL upload call in
    /// the consumed capability set (`spec.md` §6), so this only updates the
    /// core's own bookkeeping.
    pub fn write_buffer(
        &self,
        buffer: &Buffer,
        offset: u64,
        data_len: u64,
    ) -> Result<(), BufferWriteOutOfBounds> {
        profiling::scope!("write_buffer", "Queue");
        let end = offset.checked_add(data_len).unwrap_or(u64::MAX);
        if end > buffer.size() {
            log::warn!(
                "write_buffer validation error: {data_len} bytes at offset {offset} overflows buffer of size {}",
                buffer.size()
            );
            return Err(BufferWriteOutOfBounds {
                offset,
                len: data_len,
                size: buffer.size(),
            });
        }
        buffer.init_tracker.lock().mark_initialized(offset, data_len);
        Ok(())
    }

    /// `spec.md` §6 `write_texture`: validated the same way `write_buffer`
    /// is, but texture contents are not tracked at the byte level by this
    /// core (no format/subresource table is modeled — `spec.md` §1
    /// Non-goals), so this is a pass-through id/device validity check.
    pub fn write_texture(&self) -> Result<(), DeviceError> {
        if !self.device.is_valid() {
            return Err(DeviceError::DeviceDestroyed);
        }
        Ok(())
    }

    /// `spec.md` §6 `on_submitted_work_done`. Fires once the submission
    /// index outstanding at call time has retired (SPEC_FULL §C.5).
    pub fn on_submitted_work_done(&self, callback: impl FnOnce() + Send + 'static) {
        let index = self.last_submission_index.load(Ordering::Acquire);
        self.device.register_submission_callback(index, callback);
    }

    /// Poll this queue's fence and fire any retired `on_submitted_work_done`
    /// callbacks (SPEC_FULL §F).
    pub fn maintain(&self) {
        self.device.maintain(self.fence.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::MockDevice;
    use crate::id::Id;
    use crate::resource::{BufferUsages, Features, Limits};
    use std::sync::atomic::AtomicBool;

    fn test_device() -> Arc<Device> {
        Arc::new(Device::new(
            Id::zip(1, 1),
            Id::zip(1, 1),
            Box::new(MockDevice::new()),
            None,
            Features::empty(),
            Limits::default(),
        ))
    }

    #[test]
    fn submit_rejects_command_buffers_from_another_device() {
        let device = test_device();
        let other = test_device();
        let queue = Queue::new(Arc::clone(&device)).unwrap();
        let encoder = Arc::new(other.create_command_encoder(None).unwrap());
        let cb = encoder.finish().unwrap();
        let err = queue.submit(vec![cb]).unwrap_err();
        assert_eq!(err, QueueSubmitError::ForeignCommandBuffer);
    }

    #[test]
    fn submit_returns_increasing_indices() {
        let device = test_device();
        let queue = Queue::new(Arc::clone(&device)).unwrap();
        let i1 = queue.submit(vec![]).unwrap();
        let i2 = queue.submit(vec![]).unwrap();
        assert!(i2 > i1);
    }

    #[test]
    fn write_buffer_rejects_out_of_bounds() {
        let device = test_device();
        let queue = Queue::new(Arc::clone(&device)).unwrap();
        let buffer = device
            .create_buffer(None, 16, BufferUsages::COPY_DST, false)
            .unwrap();
        let err = queue.write_buffer(&buffer, 8, 16).unwrap_err();
        assert_eq!(err.size, 16);
    }

    #[test]
    fn write_buffer_marks_range_initialized() {
        let device = test_device();
        let queue = Queue::new(Arc::clone(&device)).unwrap();
        let buffer = device
            .create_buffer(None, 16, BufferUsages::COPY_DST, false)
            .unwrap();
        assert!(!buffer.is_fully_initialized());
        queue.write_buffer(&buffer, 0, 16).unwrap();
        assert!(buffer.is_fully_initialized());
    }

    #[test]
    fn on_submitted_work_done_fires_after_maintain() {
        let device = test_device();
        let queue = Queue::new(Arc::clone(&device)).unwrap();
        queue.submit(vec![]).unwrap();

        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);
        queue.on_submitted_work_done(move || fired_clone.store(true, Ordering::SeqCst));
        assert!(!fired.load(Ordering::SeqCst));

        queue.maintain();
        assert!(fired.load(Ordering::SeqCst));
    }
}
