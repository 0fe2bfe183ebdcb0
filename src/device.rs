//! `Device`: the hub of ownership for everything created against one open
//! HAL device (`spec.md` §3, §4.3, §4.4, §4.7).

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::error::{DeviceError, GpuError};
use crate::error_scope::{ErrorFilter, ErrorScopeManager};
use crate::hal::HalDevice;
use crate::id::{AdapterId, QueueId};
use crate::resource::{Buffer, BufferUsages, Features, Limits};
use crate::snatch::{SnatchLock, Snatchable};
use crate::{Label, LabelHelpers};

/// Dense per-resource index allocator backing the (external) resource-state
/// tracker (`spec.md` GLOSSARY, "Tracker index"). This core only hands out
/// the indices; the tracker that consumes them is out of scope.
#[derive(Default)]
pub struct TrackerIndexAllocators {
    next: AtomicU32,
}

impl TrackerIndexAllocators {
    pub fn next_index(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// A logical GPU with a default command queue (`spec.md` GLOSSARY).
pub struct Device {
    pub adapter: AdapterId,
    pub queue: QueueId,
    pub(crate) hal_device: Snatchable<Arc<dyn HalDevice>>,
    pub(crate) snatch_lock: SnatchLock,
    pub label: String,
    pub features: Features,
    pub limits: Limits,
    pub tracker_indices: TrackerIndexAllocators,
    valid: AtomicBool,
    error_scopes: OnceCell<ErrorScopeManager>,
    active_submission_index: AtomicU64,
    pending_callbacks: Mutex<Vec<(u64, Box<dyn FnOnce() + Send>)>>,
}

impl Device {
    pub fn new(
        adapter: AdapterId,
        queue: QueueId,
        hal_device: Box<dyn HalDevice>,
        label: Label<'_>,
        features: Features,
        limits: Limits,
    ) -> Self {
        Self {
            adapter,
            queue,
            hal_device: Snatchable::new(Arc::from(hal_device)),
            snatch_lock: SnatchLock::new(),
            label: label.borrow_or_default().to_string(),
            features,
            limits,
            tracker_indices: TrackerIndexAllocators::default(),
            valid: AtomicBool::new(true),
            error_scopes: OnceCell::new(),
            active_submission_index: AtomicU64::new(0),
            pending_callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn check_valid(&self) -> Result<(), DeviceError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(DeviceError::DeviceDestroyed)
        }
    }

    /// `spec.md` §4.4 buffer creation. Validates, then acquires a read
    /// guard and calls through to the HAL.
    pub fn create_buffer(
        self: &Arc<Self>,
        label: Label<'_>,
        size: u64,
        usage: BufferUsages,
        mapped_at_creation: bool,
    ) -> Result<Buffer, crate::error::CreateBufferError> {
        use crate::error::{CreateBufferError, CreateBufferErrorKind};

        let label_str = label.borrow_or_default().to_string();
        if self.check_valid().is_err() {
            log::warn!("create_buffer on destroyed device {:?}", self.adapter);
            return Err(CreateBufferError::new(CreateBufferErrorKind::Hal, label_str));
        }

        let aligned_size =
            crate::resource::validate_buffer_descriptor(&label_str, size, usage, &self.limits)?;

        let guard = self.snatch_lock.read();
        let hal = self.hal_device.get(&guard).ok_or_else(|| {
            log::warn!("create_buffer '{label_str}': HAL device already snatched");
            CreateBufferError::new(CreateBufferErrorKind::Hal, label_str.clone())
        })?;
        let hal_desc = crate::hal::BufferDescriptor {
            label: label.clone(),
            size: aligned_size,
            usage,
            mapped_at_creation,
        };
        let raw = hal.create_buffer(&hal_desc).map_err(|e| {
            log::error!("create_buffer '{label_str}' failed in the HAL: {e}");
            CreateBufferError::new(CreateBufferErrorKind::Hal, label_str.clone()).with_inner(e)
        })?;
        drop(guard);

        let mut buffer = Buffer::new(raw, Arc::clone(self), usage, size, label_str);
        if mapped_at_creation {
            *buffer.map_state.get_mut() = crate::resource::MapState::Mapped;
            buffer.init_tracker.get_mut().mark_initialized(0, size);
        }
        log::trace!("Created buffer {:?} for device", buffer.tracking_key);
        Ok(buffer)
    }

    /// `spec.md` §4.6 encoder creation.
    pub fn create_command_encoder(
        self: &Arc<Self>,
        label: Label<'_>,
    ) -> Result<crate::command::CommandEncoder, crate::error::CreateCommandEncoderError> {
        use crate::error::{CreateCommandEncoderError, CreateCommandEncoderErrorKind};

        let label_str = label.borrow_or_default().to_string();
        if self.check_valid().is_err() {
            log::warn!("create_command_encoder on destroyed device {:?}", self.adapter);
            return Err(CreateCommandEncoderError {
                kind: CreateCommandEncoderErrorKind::Hal,
                label: label_str,
                inner: Box::new(DeviceError::DeviceDestroyed),
            });
        }

        let guard = self.snatch_lock.read();
        let hal = self.hal_device.get(&guard).ok_or_else(|| CreateCommandEncoderError {
            kind: CreateCommandEncoderErrorKind::Hal,
            label: label_str.clone(),
            inner: Box::new(DeviceError::DeviceDestroyed),
        })?;
        let mut hal_encoder = hal.create_command_encoder(label.clone()).map_err(|e| {
            log::error!("create_command_encoder '{label_str}' failed in the HAL: {e}");
            CreateCommandEncoderError {
                kind: CreateCommandEncoderErrorKind::Hal,
                label: label_str.clone(),
                inner: Box::new(e),
            }
        })?;
        hal_encoder.begin_encoding(label.clone()).map_err(|e| {
            log::error!("begin_encoding '{label_str}' failed in the HAL: {e}");
            CreateCommandEncoderError {
                kind: CreateCommandEncoderErrorKind::Hal,
                label: label_str.clone(),
                inner: Box::new(e),
            }
        })?;
        drop(guard);

        log::trace!("Created command encoder '{label_str}'");
        Ok(crate::command::CommandEncoder::new(
            Arc::clone(self),
            hal_encoder,
            label_str,
        ))
    }

    /// `spec.md` §4.3. Atomically invalidates the device, then snatches and
    /// destroys the HAL device. Idempotent.
    pub fn destroy(&self) {
        log::debug!("Device {:?} is going to be destroyed", self.adapter);
        self.valid.store(false, Ordering::Release);
        let guard = self.snatch_lock.write();
        if let Some(hal) = self.hal_device.snatch(&guard) {
            hal.destroy();
        }
    }

    pub fn push_error_scope(&self, filter: ErrorFilter) {
        self.error_scopes.get_or_init(ErrorScopeManager::new).push(filter);
    }

    /// `spec.md` §7: popping an empty stack at this level is a programmer
    /// error and panics; `ErrorScopeManager::pop` itself merely returns
    /// `None` for "no scope".
    pub fn pop_error_scope(&self) -> Option<GpuError> {
        let scopes = self.error_scopes.get_or_init(ErrorScopeManager::new);
        match scopes.pop() {
            Some(captured) => captured,
            None => panic!("pop_error_scope called with no open error scope"),
        }
    }

    /// Routes an error to the innermost matching open scope, or returns
    /// `false` if it should be treated as uncaptured.
    pub fn report_error(&self, filter: ErrorFilter, message: impl Into<String>) -> bool {
        match self.error_scopes.get() {
            Some(scopes) => scopes.report(GpuError {
                filter,
                message: message.into(),
            }),
            None => false,
        }
    }

    pub fn error_scope_depth(&self) -> usize {
        self.error_scopes.get().map(|s| s.depth()).unwrap_or(0)
    }

    /// Allocate the next submission index and register a completion
    /// callback for it (`spec.md` §6 `on_submitted_work_done`, SPEC_FULL
    /// §F).
    pub fn next_submission_index(&self) -> u64 {
        self.active_submission_index.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn register_submission_callback(
        &self,
        submission_index: u64,
        callback: impl FnOnce() + Send + 'static,
    ) {
        self.pending_callbacks
            .lock()
            .push((submission_index, Box::new(callback)));
    }

    /// `spec.md` §F: poll the HAL fence and fire every callback whose
    /// submission has retired.
    pub fn maintain(&self, fence: &dyn crate::hal::HalHandle) {
        let guard = self.snatch_lock.read();
        let Some(hal) = self.hal_device.get(&guard) else {
            return;
        };
        let retired = hal.get_fence_status(fence);
        drop(guard);

        let mut callbacks = self.pending_callbacks.lock();
        let mut done: SmallVec<[(u64, Box<dyn FnOnce() + Send>); 4]> = SmallVec::new();
        let mut pending = Vec::new();
        for entry in std::mem::take(&mut *callbacks) {
            if entry.0 <= retired {
                done.push(entry);
            } else {
                pending.push(entry);
            }
        }
        *callbacks = pending;
        drop(callbacks);

        log::trace!("maintain() retiring {} submitted-work callback(s)", done.len());
        for (_, cb) in done {
            cb();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::MockDevice;
    use crate::id::Id;

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
    fn create_buffer_reports_requested_size_not_aligned() {
        let device = test_device();
        let buffer = device
            .create_buffer(None, 13, BufferUsages::VERTEX, false)
            .unwrap();
        assert_eq!(buffer.size(), 13);
    }

    #[test]
    fn destroyed_device_refuses_new_buffers() {
        let device = test_device();
        device.destroy();
        let err = device
            .create_buffer(None, 16, BufferUsages::VERTEX, false)
            .unwrap_err();
        assert_eq!(err.kind, crate::error::CreateBufferErrorKind::Hal);
    }

    #[test]
    fn destroy_is_idempotent() {
        let device = test_device();
        device.destroy();
        device.destroy();
        assert!(!device.is_valid());
    }

    #[test]
    fn pop_error_scope_on_empty_stack_panics() {
        let device = test_device();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            device.pop_error_scope()
        }));
        assert!(result.is_err());
    }

    #[test]
    fn error_scope_round_trip() {
        let device = test_device();
        device.push_error_scope(ErrorFilter::Validation);
        assert!(device.report_error(ErrorFilter::Validation, "bad call"));
        let captured = device.pop_error_scope();
        assert_eq!(captured.unwrap().message, "bad call");
    }
}
