//! Resource objects (`spec.md` §3–4.4): each wraps a [`crate::snatch::Snatchable`]
//! HAL handle plus metadata, and owns a back-reference to its [`crate::device::Device`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bitflags::bitflags;

use crate::backend::Backend;
use crate::device::Device;
use crate::error::{CreateBufferError, CreateBufferErrorKind};
use crate::hal::{HalAdapter, HalHandle};
use crate::init_tracker::InitTracker;
use crate::snatch::Snatchable;
use crate::{round_up, Label};

bitflags! {
    /// Mirrors `wgpu-types`' `BufferUsages` bitset (`spec.md` §4.4 step 5).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct BufferUsages: u32 {
        const MAP_READ = 1 << 0;
        const MAP_WRITE = 1 << 1;
        const COPY_SRC = 1 << 2;
        const COPY_DST = 1 << 3;
        const INDEX = 1 << 4;
        const VERTEX = 1 << 5;
        const UNIFORM = 1 << 6;
        const STORAGE = 1 << 7;
        const INDIRECT = 1 << 8;
        const QUERY_RESOLVE = 1 << 9;
    }
}

bitflags! {
    /// A small slice of adapter-reported features; enough to drive
    /// `FeatureError` checks without modeling the real WebGPU feature table.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Features: u64 {
        const TIMESTAMP_QUERY = 1 << 0;
        const DEPTH_CLIP_CONTROL = 1 << 1;
        const INDIRECT_FIRST_INSTANCE = 1 << 2;
    }
}

bitflags! {
    /// Downlevel capability flags, reported alongside [`Limits`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct DownlevelFlags: u32 {
        const COMPUTE_SHADERS = 1 << 0;
        const FRAGMENT_WRITABLE_STORAGE = 1 << 1;
    }
}

/// Adapter/device resource limits. Only the fields this core's validation
/// paths actually consult are modeled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Limits {
    pub max_buffer_size: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_buffer_size: 256 << 20,
        }
    }
}

/// Adapter capability report beyond the base WebGPU limits/features.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Capabilities {
    pub downlevel: DownlevelFlags,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            downlevel: DownlevelFlags::COMPUTE_SHADERS | DownlevelFlags::FRAGMENT_WRITABLE_STORAGE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceType {
    Other,
    IntegratedGpu,
    DiscreteGpu,
    Cpu,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: DeviceType,
    pub backend: Backend,
}

/// A physical GPU handle plus its feature/limit report (`spec.md` §3).
/// Owned by the Hub; the `Instance` that enumerated it destroys its HAL
/// counterpart.
pub struct Adapter {
    pub info: AdapterInfo,
    pub features: Features,
    pub limits: Limits,
    pub capabilities: Capabilities,
    hal_adapter: parking_lot::Mutex<Option<Box<dyn HalAdapter>>>,
}

impl Adapter {
    pub fn new(
        info: AdapterInfo,
        features: Features,
        limits: Limits,
        hal_adapter: Option<Box<dyn HalAdapter>>,
    ) -> Self {
        Self {
            info,
            features,
            limits,
            capabilities: Capabilities::default(),
            hal_adapter: parking_lot::Mutex::new(hal_adapter),
        }
    }

    pub fn has_hal(&self) -> bool {
        self.hal_adapter.lock().is_some()
    }

    pub fn open_hal_device(
        &self,
    ) -> Result<Box<dyn crate::hal::HalDevice>, crate::hal::HalError> {
        let guard = self.hal_adapter.lock();
        match guard.as_deref() {
            Some(hal) => hal.open_device(),
            None => Err(crate::hal::HalError::Validation(
                "adapter has no HAL backing".to_string(),
            )),
        }
    }

    /// Called by `Instance::destroy` (`spec.md` §4.9). Idempotent: a second
    /// call observes an already-empty slot.
    pub fn destroy_hal(&self) {
        let taken = self.hal_adapter.lock().take();
        drop(taken);
    }
}

/// Monotonically increasing, process-local key used by the leak tracker
/// (`spec.md` §4.5) and by `tracking_data`'s dense index.
pub(crate) fn next_tracking_key() -> u64 {
    static NEXT: AtomicU32 = AtomicU32::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed) as u64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapState {
    Unmapped,
    Mapped,
    Pending,
}

/// Validate a buffer descriptor against `limits`, in the exact order
/// `spec.md` §4.4 specifies ("first failing check wins").
pub fn validate_buffer_descriptor(
    label: &str,
    size: u64,
    usage: BufferUsages,
    limits: &Limits,
) -> Result<u64, CreateBufferError> {
    if size == 0 {
        log::warn!("create_buffer '{label}' validation error: size is zero");
        return Err(CreateBufferError::new(CreateBufferErrorKind::ZeroSize, label));
    }
    if size > limits.max_buffer_size {
        log::warn!(
            "create_buffer '{label}' validation error: size {size} exceeds the limit of {}",
            limits.max_buffer_size
        );
        return Err(
            CreateBufferError::new(CreateBufferErrorKind::MaxBufferSize, label)
                .with_size(size, limits.max_buffer_size),
        );
    }
    if usage.is_empty() {
        log::warn!("create_buffer '{label}' validation error: usage is empty");
        return Err(CreateBufferError::new(CreateBufferErrorKind::EmptyUsage, label));
    }
    if usage.bits() & !BufferUsages::all().bits() != 0 {
        log::warn!("create_buffer '{label}' validation error: usage {usage:?} has unknown bits set");
        return Err(CreateBufferError::new(CreateBufferErrorKind::InvalidUsage, label));
    }
    if usage.contains(BufferUsages::MAP_READ) && usage.contains(BufferUsages::MAP_WRITE) {
        log::warn!("create_buffer '{label}' validation error: MAP_READ and MAP_WRITE are mutually exclusive");
        return Err(CreateBufferError::new(
            CreateBufferErrorKind::MapReadWriteExclusive,
            label,
        ));
    }
    Ok(round_up(size, 4))
}

/// `spec.md` §3 "Buffer". The reported [`Buffer::size`] is always the
/// original requested size, never the HAL-aligned size (§4.4 "Observable
/// side effects").
pub struct Buffer {
    pub(crate) raw: Snatchable<Box<dyn HalHandle>>,
    pub device: Arc<Device>,
    pub usage: BufferUsages,
    size: u64,
    pub label: String,
    pub(crate) init_tracker: parking_lot::Mutex<InitTracker>,
    pub(crate) map_state: parking_lot::Mutex<MapState>,
    pub tracking_key: u64,
    /// Dense index handed out by the owning device's tracker-index
    /// allocator; consumed by the (external) resource-state tracker.
    pub tracker_index: u32,
}

impl Buffer {
    pub(crate) fn new(
        raw: Box<dyn HalHandle>,
        device: Arc<Device>,
        usage: BufferUsages,
        size: u64,
        label: String,
    ) -> Self {
        let tracker_index = device.tracker_indices.next_index();
        let tracking_key = next_tracking_key();
        crate::leak::track_resource(tracking_key, "Buffer");
        Self {
            raw: Snatchable::new(raw),
            device,
            usage,
            size,
            label,
            init_tracker: parking_lot::Mutex::new(InitTracker::new(size)),
            map_state: parking_lot::Mutex::new(MapState::Unmapped),
            tracking_key,
            tracker_index,
        }
    }

    /// The size requested at creation, never the HAL-aligned size.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn map_state(&self) -> MapState {
        *self.map_state.lock()
    }

    pub fn is_fully_initialized(&self) -> bool {
        self.init_tracker.lock().is_fully_initialized()
    }

    /// Release the HAL buffer through the owning device's snatch lock,
    /// following the protocol in `spec.md` §4.3: read the device's HAL
    /// handle under a read guard and release it, *then* take the write
    /// guard to snatch this resource's own handle, so the HAL destroy call
    /// itself never runs while the write guard is held. Idempotent.
    pub fn destroy(&self) {
        crate::leak::untrack_resource(self.tracking_key);
        let hal_device = {
            let guard = self.device.snatch_lock.read();
            self.device.hal_device.get(&guard).cloned()
        };
        let Some(hal_device) = hal_device else {
            return;
        };
        let write_guard = self.device.snatch_lock.write();
        if let Some(raw) = self.raw.snatch(&write_guard) {
            drop(write_guard);
            hal_device.destroy_buffer(raw);
        }
    }
}

macro_rules! hal_backed_resource {
    ($name:ident, $destroy_method:ident, $doc:expr) => {
        #[doc = $doc]
        pub struct $name {
            pub(crate) raw: Snatchable<Box<dyn HalHandle>>,
            pub device: Arc<Device>,
            pub label: String,
            pub tracking_key: u64,
        }

        impl $name {
            pub(crate) fn new(raw: Box<dyn HalHandle>, device: Arc<Device>, label: String) -> Self {
                let tracking_key = next_tracking_key();
                crate::leak::track_resource(tracking_key, stringify!($name));
                Self {
                    raw: Snatchable::new(raw),
                    device,
                    label,
                    tracking_key,
                }
            }

            /// See [`Buffer::destroy`] for the protocol this follows.
            pub fn destroy(&self) {
                crate::leak::untrack_resource(self.tracking_key);
                let hal_device = {
                    let guard = self.device.snatch_lock.read();
                    self.device.hal_device.get(&guard).cloned()
                };
                let Some(hal_device) = hal_device else {
                    return;
                };
                let write_guard = self.device.snatch_lock.write();
                if let Some(raw) = self.raw.snatch(&write_guard) {
                    drop(write_guard);
                    hal_device.$destroy_method(raw);
                }
            }
        }
    };
}

hal_backed_resource!(Texture, destroy_texture, "`spec.md` §4.4 resource object.");
hal_backed_resource!(TextureView, destroy_texture_view, "`spec.md` §4.4 resource object.");
hal_backed_resource!(Sampler, destroy_sampler, "`spec.md` §4.4 resource object.");
hal_backed_resource!(
    BindGroupLayout,
    destroy_bind_group_layout,
    "`spec.md` §4.4 resource object."
);
hal_backed_resource!(BindGroup, destroy_bind_group, "`spec.md` §4.4 resource object.");
hal_backed_resource!(
    PipelineLayout,
    destroy_pipeline_layout,
    "`spec.md` §4.4 resource object."
);
hal_backed_resource!(
    ShaderModule,
    destroy_shader_module,
    "`spec.md` §4.4 resource object."
);
hal_backed_resource!(
    RenderPipeline,
    destroy_render_pipeline,
    "`spec.md` §4.4 resource object."
);
hal_backed_resource!(
    ComputePipeline,
    destroy_compute_pipeline,
    "`spec.md` §4.4 resource object."
);
/// `spec.md` §4.4 resource object. The consumed HAL capability set (§6)
/// does not name a dedicated query-set destructor, so this resource's raw
/// handle is simply dropped on destroy rather than routed through a HAL
/// call.
pub struct QuerySet {
    pub(crate) raw: Snatchable<Box<dyn HalHandle>>,
    pub device: Arc<Device>,
    pub label: String,
    pub tracking_key: u64,
}

impl QuerySet {
    pub(crate) fn new(raw: Box<dyn HalHandle>, device: Arc<Device>, label: String) -> Self {
        Self {
            raw: Snatchable::new(raw),
            device,
            label,
            tracking_key: next_tracking_key(),
        }
    }

    pub fn destroy(&self) {
        let write_guard = self.device.snatch_lock.write();
        self.raw.snatch(&write_guard);
    }
}

/// The finished product of `CommandEncoder::finish` (`spec.md` §4.6). Its
/// HAL handle is consumed whole by `Queue::submit`, not snatched
/// incrementally, since a command buffer is either submitted or discarded
/// as a unit.
pub struct CommandBuffer {
    pub(crate) raw: Box<dyn HalHandle>,
    pub device: Arc<Device>,
    pub label: String,
}

/// An opaque platform windowing artifact (`spec.md` GLOSSARY, "Surface").
/// Its lifecycle is orthogonal to any Device, so it lives in
/// [`crate::global::Global`] rather than a per-device `Hub`.
pub struct Surface {
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_validation_rejects_zero_size() {
        let err = validate_buffer_descriptor("b", 0, BufferUsages::VERTEX, &Limits::default())
            .unwrap_err();
        assert_eq!(err.kind, CreateBufferErrorKind::ZeroSize);
    }

    #[test]
    fn buffer_validation_order_checks_size_before_usage() {
        let limits = Limits { max_buffer_size: 1024 };
        let err = validate_buffer_descriptor("b", 2048, BufferUsages::empty(), &limits)
            .unwrap_err();
        assert_eq!(err.kind, CreateBufferErrorKind::MaxBufferSize);
        assert_eq!(err.requested_size, Some(2048));
        assert_eq!(err.max_size, Some(1024));
    }

    #[test]
    fn buffer_validation_rejects_empty_usage() {
        let err =
            validate_buffer_descriptor("b", 16, BufferUsages::empty(), &Limits::default())
                .unwrap_err();
        assert_eq!(err.kind, CreateBufferErrorKind::EmptyUsage);
    }

    #[test]
    fn buffer_validation_rejects_conflicting_map_usage() {
        let err = validate_buffer_descriptor(
            "b",
            1024,
            BufferUsages::MAP_READ | BufferUsages::MAP_WRITE,
            &Limits::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind, CreateBufferErrorKind::MapReadWriteExclusive);
    }

    #[test]
    fn buffer_validation_succeeds_and_aligns_to_four() {
        let aligned =
            validate_buffer_descriptor("b", 13, BufferUsages::VERTEX, &Limits::default())
                .unwrap();
        assert_eq!(aligned, 16);
    }
}
