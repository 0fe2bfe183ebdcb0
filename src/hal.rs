//! The HAL capability set this core consumes (`spec.md` §6). Every
//! operation here is a black-box call into a hardware abstraction layer
//! this crate does not implement; the only concrete implementation in this
//! tree is the [`mock`] backend used for tests and the no-hardware
//! fallback path (`spec.md` §4.9).
//!
//! Handles crossing the boundary are opaque: the core never interprets
//! their contents, only stores and later hands them back to the same HAL
//! instance that produced them (`spec.md` §9, "dynamic polymorphism").

pub mod mock;

use arrayvec::ArrayVec;
use thiserror::Error;

use crate::resource::{AdapterInfo, BufferUsages, DeviceType, Features, Limits};
use crate::Label;

/// Any opaque HAL-owned handle. The core treats these as inert; it only
/// ever calls back into the HAL that produced one. `as_any` exists purely
/// so a HAL implementation can downcast its own handles back to its own
/// concrete type; the core itself never calls it.
pub trait HalHandle: std::fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn std::any::Any;
}

impl<T: std::fmt::Debug + Send + Sync + 'static> HalHandle for T {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// An error surfaced by a HAL call. Carried verbatim into this core's own
/// error types (`spec.md` §7, "HAL errors are wrapped, never swallowed").
#[derive(Debug, Error)]
pub enum HalError {
    #[error("HAL device is out of memory")]
    OutOfMemory,
    #[error("HAL validation failed: {0}")]
    Validation(String),
    #[error("HAL device is lost")]
    DeviceLost,
    #[error("HAL operation timed out")]
    Timeout,
}

#[derive(Clone, Debug)]
pub struct BufferDescriptor<'a> {
    pub label: Label<'a>,
    pub size: u64,
    pub usage: BufferUsages,
    pub mapped_at_creation: bool,
}

/// One adapter exposed by a [`HalInstance`], paired with its capability
/// report (`spec.md` §4.9 step 2).
pub struct ExposedAdapter {
    pub adapter: Box<dyn HalAdapter>,
    pub info: AdapterInfo,
    pub features: Features,
    pub limits: Limits,
}

/// A HAL backend instance, as created by a [`crate::backend::BackendProvider`].
pub trait HalInstance: Send + Sync {
    fn enumerate_adapters(&self) -> Vec<ExposedAdapter>;
    fn destroy(self: Box<Self>);
}

/// A HAL adapter: a physical device, not yet opened.
pub trait HalAdapter: Send + Sync {
    fn open_device(&self) -> Result<Box<dyn HalDevice>, HalError>;
}

/// An open HAL device. All handle creation goes through here; destruction
/// methods consume the handle the matching `create_*` call produced.
pub trait HalDevice: Send + Sync {
    fn create_buffer(&self, desc: &BufferDescriptor<'_>) -> Result<Box<dyn HalHandle>, HalError>;
    fn destroy_buffer(&self, buffer: Box<dyn HalHandle>);

    fn create_texture(&self, label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError>;
    fn destroy_texture(&self, texture: Box<dyn HalHandle>);

    fn create_texture_view(&self, label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError>;
    fn destroy_texture_view(&self, view: Box<dyn HalHandle>);

    fn create_sampler(&self, label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError>;
    fn destroy_sampler(&self, sampler: Box<dyn HalHandle>);

    fn create_bind_group_layout(&self, label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError>;
    fn destroy_bind_group_layout(&self, layout: Box<dyn HalHandle>);

    fn create_bind_group(&self, label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError>;
    fn destroy_bind_group(&self, group: Box<dyn HalHandle>);

    fn create_pipeline_layout(&self, label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError>;
    fn destroy_pipeline_layout(&self, layout: Box<dyn HalHandle>);

    fn create_shader_module(&self, label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError>;
    fn destroy_shader_module(&self, module: Box<dyn HalHandle>);

    fn create_render_pipeline(&self, label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError>;
    fn destroy_render_pipeline(&self, pipeline: Box<dyn HalHandle>);

    fn create_compute_pipeline(&self, label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError>;
    fn destroy_compute_pipeline(&self, pipeline: Box<dyn HalHandle>);

    fn create_command_encoder(
        &self,
        label: Label<'_>,
    ) -> Result<Box<dyn HalCommandEncoder>, HalError>;

    fn create_fence(&self) -> Result<Box<dyn HalHandle>, HalError>;
    fn destroy_fence(&self, fence: Box<dyn HalHandle>);
    fn get_fence_status(&self, fence: &dyn HalHandle) -> u64;
    fn wait(&self, fence: &dyn HalHandle, value: u64, timeout_ms: u32) -> Result<bool, HalError>;
    fn reset_fence(&self, fence: &dyn HalHandle);

    fn wait_idle(&self) -> Result<(), HalError>;
    fn destroy(&self);
}

/// Matches the WebGPU default `maxColorAttachments` limit; the inline
/// capacity for render pass color attachment arrays.
pub const MAX_COLOR_ATTACHMENTS: usize = 8;

/// Color attachment as passed to `begin_render_pass` (`spec.md` §4.6).
pub struct ColorAttachment<'a> {
    pub view: &'a dyn HalHandle,
    pub resolve_target: Option<&'a dyn HalHandle>,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_value: [f64; 4],
}

pub struct DepthStencilAttachment<'a> {
    pub view: &'a dyn HalHandle,
    pub depth_read_only: bool,
    pub stencil_read_only: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOp {
    Load,
    Clear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    Discard,
}

#[derive(Default)]
pub struct RenderPassDescriptor<'a> {
    pub label: Label<'a>,
    pub color_attachments: ArrayVec<ColorAttachment<'a>, MAX_COLOR_ATTACHMENTS>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment<'a>>,
}

#[derive(Default)]
pub struct ComputePassDescriptor<'a> {
    pub label: Label<'a>,
}

/// A HAL command encoder (`spec.md` §6, "HAL command encoder").
pub trait HalCommandEncoder: Send + Sync {
    fn begin_encoding(&mut self, label: Label<'_>) -> Result<(), HalError>;
    fn end_encoding(&mut self) -> Result<Box<dyn HalHandle>, HalError>;
    fn discard_encoding(&mut self);

    fn begin_render_pass(
        &mut self,
        desc: &RenderPassDescriptor<'_>,
    ) -> Result<Box<dyn HalRenderPassEncoder>, HalError>;

    fn begin_compute_pass(
        &mut self,
        desc: &ComputePassDescriptor<'_>,
    ) -> Result<Box<dyn HalComputePassEncoder>, HalError>;
}

/// A HAL render-pass encoder (`spec.md` §6).
pub trait HalRenderPassEncoder: Send + Sync {
    fn set_pipeline(&mut self, pipeline: &dyn HalHandle);
    fn set_bind_group(&mut self, index: u32, group: &dyn HalHandle);
    fn set_vertex_buffer(&mut self, slot: u32, buffer: &dyn HalHandle, offset: u64);
    fn set_index_buffer(&mut self, buffer: &dyn HalHandle, offset: u64);
    fn set_viewport(&mut self, x: f32, y: f32, w: f32, h: f32, min_depth: f32, max_depth: f32);
    fn set_scissor_rect(&mut self, x: u32, y: u32, w: u32, h: u32);
    fn set_blend_constant(&mut self, color: [f64; 4]);
    fn set_stencil_reference(&mut self, reference: u32);
    fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>);
    fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        base_vertex: i32,
        instances: std::ops::Range<u32>,
    );
    fn draw_indirect(&mut self, buffer: &dyn HalHandle, offset: u64);
    fn draw_indexed_indirect(&mut self, buffer: &dyn HalHandle, offset: u64);
    fn push_debug_group(&mut self, label: &str);
    fn pop_debug_group(&mut self);
    fn insert_debug_marker(&mut self, label: &str);
    fn end(&mut self);
}

/// A HAL compute-pass encoder (`spec.md` §6).
pub trait HalComputePassEncoder: Send + Sync {
    fn set_pipeline(&mut self, pipeline: &dyn HalHandle);
    fn set_bind_group(&mut self, index: u32, group: &dyn HalHandle);
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
    fn dispatch_indirect(&mut self, buffer: &dyn HalHandle, offset: u64);
    fn push_debug_group(&mut self, label: &str);
    fn pop_debug_group(&mut self);
    fn insert_debug_marker(&mut self, label: &str);
    fn end(&mut self);
}
