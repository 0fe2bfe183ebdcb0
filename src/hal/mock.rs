//! A deterministic, in-process HAL backend. Backs `Instance::new_mock` and
//! the no-hardware fallback described in `spec.md` §4.9, and is the only
//! backend the integration tests can drive without a real GPU.
//!
//! Every fence "completes" the instant it is created: there is no GPU
//! timeline to simulate (`spec.md` §1 Non-goals), so `wait`/`get_fence_status`
//! report work as already retired.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::hal::{
    BufferDescriptor, ComputePassDescriptor, ExposedAdapter, HalAdapter, HalCommandEncoder,
    HalComputePassEncoder, HalDevice, HalError, HalHandle, HalInstance, HalRenderPassEncoder,
    RenderPassDescriptor,
};
use crate::resource::{AdapterInfo, DeviceType, Features, Limits};
use crate::Label;

#[derive(Debug)]
struct MockHandle(u64);

fn next_handle() -> Box<dyn HalHandle> {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    Box::new(MockHandle(COUNTER.fetch_add(1, Ordering::Relaxed)))
}

/// A `HalInstance` exposing exactly one adapter, named and shaped per
/// `spec.md` §4.9 step 3 ("Mock Adapter", `DiscreteGPU`, `Vulkan` backend).
pub struct MockHalInstance;

impl MockHalInstance {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockHalInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl HalInstance for MockHalInstance {
    fn enumerate_adapters(&self) -> Vec<ExposedAdapter> {
        vec![ExposedAdapter {
            adapter: Box::new(MockAdapter),
            info: AdapterInfo {
                name: "Mock Adapter".to_string(),
                device_type: DeviceType::DiscreteGpu,
                backend: crate::backend::Backend::Vulkan,
            },
            features: Features::empty(),
            limits: Limits::default(),
        }]
    }

    fn destroy(self: Box<Self>) {}
}

pub struct MockAdapter;

impl HalAdapter for MockAdapter {
    fn open_device(&self) -> Result<Box<dyn HalDevice>, HalError> {
        Ok(Box::new(MockDevice::new()))
    }
}

pub struct MockDevice {
    fences: Arc<AtomicU64>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            fences: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HalDevice for MockDevice {
    fn create_buffer(&self, _desc: &BufferDescriptor<'_>) -> Result<Box<dyn HalHandle>, HalError> {
        Ok(next_handle())
    }
    fn destroy_buffer(&self, _buffer: Box<dyn HalHandle>) {}

    fn create_texture(&self, _label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError> {
        Ok(next_handle())
    }
    fn destroy_texture(&self, _texture: Box<dyn HalHandle>) {}

    fn create_texture_view(&self, _label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError> {
        Ok(next_handle())
    }
    fn destroy_texture_view(&self, _view: Box<dyn HalHandle>) {}

    fn create_sampler(&self, _label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError> {
        Ok(next_handle())
    }
    fn destroy_sampler(&self, _sampler: Box<dyn HalHandle>) {}

    fn create_bind_group_layout(&self, _label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError> {
        Ok(next_handle())
    }
    fn destroy_bind_group_layout(&self, _layout: Box<dyn HalHandle>) {}

    fn create_bind_group(&self, _label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError> {
        Ok(next_handle())
    }
    fn destroy_bind_group(&self, _group: Box<dyn HalHandle>) {}

    fn create_pipeline_layout(&self, _label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError> {
        Ok(next_handle())
    }
    fn destroy_pipeline_layout(&self, _layout: Box<dyn HalHandle>) {}

    fn create_shader_module(&self, _label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError> {
        Ok(next_handle())
    }
    fn destroy_shader_module(&self, _module: Box<dyn HalHandle>) {}

    fn create_render_pipeline(&self, _label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError> {
        Ok(next_handle())
    }
    fn destroy_render_pipeline(&self, _pipeline: Box<dyn HalHandle>) {}

    fn create_compute_pipeline(&self, _label: Label<'_>) -> Result<Box<dyn HalHandle>, HalError> {
        Ok(next_handle())
    }
    fn destroy_compute_pipeline(&self, _pipeline: Box<dyn HalHandle>) {}

    fn create_command_encoder(
        &self,
        _label: Label<'_>,
    ) -> Result<Box<dyn HalCommandEncoder>, HalError> {
        Ok(Box::new(MockCommandEncoder::default()))
    }

    fn create_fence(&self) -> Result<Box<dyn HalHandle>, HalError> {
        Ok(Box::new(Arc::clone(&self.fences)))
    }
    fn destroy_fence(&self, _fence: Box<dyn HalHandle>) {}

    /// Every submission is already retired: there is no GPU timeline to
    /// simulate, so any fence this device produced reports the maximum
    /// value rather than tracking individual submission indices.
    fn get_fence_status(&self, fence: &dyn HalHandle) -> u64 {
        fence
            .as_any()
            .downcast_ref::<Arc<AtomicU64>>()
            .map(|_| u64::MAX)
            .unwrap_or(0)
    }

    fn wait(&self, _fence: &dyn HalHandle, _value: u64, _timeout_ms: u32) -> Result<bool, HalError> {
        Ok(true)
    }

    fn reset_fence(&self, fence: &dyn HalHandle) {
        if let Some(f) = fence.as_any().downcast_ref::<Arc<AtomicU64>>() {
            f.store(0, Ordering::Release);
        }
    }

    fn wait_idle(&self) -> Result<(), HalError> {
        Ok(())
    }

    fn destroy(&self) {}
}

#[derive(Default)]
pub struct MockCommandEncoder;

impl HalCommandEncoder for MockCommandEncoder {
    fn begin_encoding(&mut self, _label: Label<'_>) -> Result<(), HalError> {
        Ok(())
    }
    fn end_encoding(&mut self) -> Result<Box<dyn HalHandle>, HalError> {
        Ok(next_handle())
    }
    fn discard_encoding(&mut self) {}

    fn begin_render_pass(
        &mut self,
        _desc: &RenderPassDescriptor<'_>,
    ) -> Result<Box<dyn HalRenderPassEncoder>, HalError> {
        Ok(Box::new(MockRenderPassEncoder))
    }

    fn begin_compute_pass(
        &mut self,
        _desc: &ComputePassDescriptor<'_>,
    ) -> Result<Box<dyn HalComputePassEncoder>, HalError> {
        Ok(Box::new(MockComputePassEncoder))
    }
}

pub struct MockRenderPassEncoder;

impl HalRenderPassEncoder for MockRenderPassEncoder {
    fn set_pipeline(&mut self, _pipeline: &dyn HalHandle) {}
    fn set_bind_group(&mut self, _index: u32, _group: &dyn HalHandle) {}
    fn set_vertex_buffer(&mut self, _slot: u32, _buffer: &dyn HalHandle, _offset: u64) {}
    fn set_index_buffer(&mut self, _buffer: &dyn HalHandle, _offset: u64) {}
    fn set_viewport(&mut self, _x: f32, _y: f32, _w: f32, _h: f32, _min_depth: f32, _max_depth: f32) {}
    fn set_scissor_rect(&mut self, _x: u32, _y: u32, _w: u32, _h: u32) {}
    fn set_blend_constant(&mut self, _color: [f64; 4]) {}
    fn set_stencil_reference(&mut self, _reference: u32) {}
    fn draw(&mut self, _vertices: std::ops::Range<u32>, _instances: std::ops::Range<u32>) {}
    fn draw_indexed(
        &mut self,
        _indices: std::ops::Range<u32>,
        _base_vertex: i32,
        _instances: std::ops::Range<u32>,
    ) {
    }
    fn draw_indirect(&mut self, _buffer: &dyn HalHandle, _offset: u64) {}
    fn draw_indexed_indirect(&mut self, _buffer: &dyn HalHandle, _offset: u64) {}
    fn push_debug_group(&mut self, _label: &str) {}
    fn pop_debug_group(&mut self) {}
    fn insert_debug_marker(&mut self, _label: &str) {}
    fn end(&mut self) {}
}

pub struct MockComputePassEncoder;

impl HalComputePassEncoder for MockComputePassEncoder {
    fn set_pipeline(&mut self, _pipeline: &dyn HalHandle) {}
    fn set_bind_group(&mut self, _index: u32, _group: &dyn HalHandle) {}
    fn dispatch(&mut self, _x: u32, _y: u32, _z: u32) {}
    fn dispatch_indirect(&mut self, _buffer: &dyn HalHandle, _offset: u64) {}
    fn push_debug_group(&mut self, _label: &str) {}
    fn pop_debug_group(&mut self) {}
    fn insert_debug_marker(&mut self, _label: &str) {}
    fn end(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_device_round_trips_a_fence() {
        let device = MockDevice::new();
        let fence = device.create_fence().unwrap();
        assert_eq!(device.get_fence_status(&*fence), u64::MAX);
        assert!(device.wait(&*fence, 0, 0).unwrap());
        device.reset_fence(&*fence);
    }

    #[test]
    fn mock_encoder_drives_a_render_pass() {
        let device = MockDevice::new();
        let mut encoder = device.create_command_encoder(None).unwrap();
        encoder.begin_encoding(None).unwrap();
        let mut pass = encoder
            .begin_render_pass(&RenderPassDescriptor::default())
            .unwrap();
        pass.end();
        encoder.end_encoding().unwrap();
    }
}
