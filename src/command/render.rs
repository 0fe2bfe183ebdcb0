//! `RenderPassEncoder` (`spec.md` §4.6, §6).

use std::sync::Arc;

use arrayvec::ArrayVec;

use crate::error::{BindGroupIndexOutOfRange, UnalignedIndirectOffset};
use crate::hal::{self, MAX_COLOR_ATTACHMENTS};
use crate::resource::{Buffer, RenderPipeline, TextureView};
use crate::snatch::SnatchGuard;
use crate::Label;

use super::CommandEncoder;

const MAX_BIND_GROUP_INDEX: u32 = 3;

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

pub struct ColorAttachment<'a> {
    pub view: &'a Arc<TextureView>,
    pub resolve_target: Option<&'a Arc<TextureView>>,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_value: [f64; 4],
}

pub struct DepthStencilAttachment<'a> {
    pub view: &'a Arc<TextureView>,
    pub depth_read_only: bool,
    pub stencil_read_only: bool,
}

/// `spec.md` §4.6 `BeginRenderPass` descriptor; distinct from
/// [`crate::hal::RenderPassDescriptor`], which this is translated into
/// once every referenced view's HAL handle has been resolved.
#[derive(Default)]
pub struct RenderPassDescriptor<'a> {
    pub label: Label<'a>,
    pub color_attachments: ArrayVec<ColorAttachment<'a>, MAX_COLOR_ATTACHMENTS>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment<'a>>,
}

fn load_store(load: LoadOp, store: StoreOp) -> (hal::LoadOp, hal::StoreOp) {
    (
        match load {
            LoadOp::Load => hal::LoadOp::Load,
            LoadOp::Clear => hal::LoadOp::Clear,
        },
        match store {
            StoreOp::Store => hal::StoreOp::Store,
            StoreOp::Discard => hal::StoreOp::Discard,
        },
    )
}

/// Resolves every attachment's HAL handle under `guard`. Returns an error
/// message (not a full `CoreError`, since the caller folds this into the
/// encoder's own `Error` transition) if any referenced view has already
/// been destroyed.
pub(super) fn translate_render_pass_descriptor<'a>(
    desc: &'a RenderPassDescriptor<'a>,
    guard: &SnatchGuard<'_>,
) -> Result<hal::RenderPassDescriptor<'a>, String> {
    let mut color_attachments = ArrayVec::<_, MAX_COLOR_ATTACHMENTS>::new();
    for attachment in &desc.color_attachments {
        let view = attachment
            .view
            .raw
            .get(guard)
            .ok_or_else(|| "color attachment view is destroyed".to_string())?;
        let resolve_target = match attachment.resolve_target {
            Some(target) => Some(
                target
                    .raw
                    .get(guard)
                    .ok_or_else(|| "resolve target view is destroyed".to_string())?
                    .as_ref(),
            ),
            None => None,
        };
        let (load_op, store_op) = load_store(attachment.load_op, attachment.store_op);
        color_attachments.push(hal::ColorAttachment {
            view: view.as_ref(),
            resolve_target,
            load_op,
            store_op,
            clear_value: attachment.clear_value,
        });
    }

    let depth_stencil_attachment = match &desc.depth_stencil_attachment {
        Some(ds) => {
            let view = ds
                .view
                .raw
                .get(guard)
                .ok_or_else(|| "depth/stencil view is destroyed".to_string())?;
            Some(hal::DepthStencilAttachment {
                view: view.as_ref(),
                depth_read_only: ds.depth_read_only,
                stencil_read_only: ds.stencil_read_only,
            })
        }
        None => None,
    };

    Ok(hal::RenderPassDescriptor {
        label: desc.label.clone(),
        color_attachments,
        depth_stencil_attachment,
    })
}

/// A borrowed recording session for one render pass (`spec.md` §3
/// "RenderPassEncoder"). Every mutator silently no-ops once `end()` has run.
pub struct RenderPassEncoder {
    encoder: Arc<CommandEncoder>,
    token: u64,
    hal: Box<dyn hal::HalRenderPassEncoder>,
    ended: bool,
}

impl RenderPassEncoder {
    pub(super) fn new(
        encoder: Arc<CommandEncoder>,
        token: u64,
        hal: Box<dyn hal::HalRenderPassEncoder>,
    ) -> Self {
        Self {
            encoder,
            token,
            hal,
            ended: false,
        }
    }

    pub fn set_pipeline(&mut self, pipeline: &Arc<RenderPipeline>) {
        if self.ended {
            return;
        }
        let guard = self.encoder.device.snatch_lock.read();
        if let Some(raw) = pipeline.raw.get(&guard) {
            self.hal.set_pipeline(raw.as_ref());
        }
    }

    pub fn set_bind_group(
        &mut self,
        index: u32,
        group: &Arc<crate::resource::BindGroup>,
    ) -> Result<(), BindGroupIndexOutOfRange> {
        if self.ended {
            return Ok(());
        }
        if index > MAX_BIND_GROUP_INDEX {
            return Err(BindGroupIndexOutOfRange {
                index,
                max: MAX_BIND_GROUP_INDEX,
            });
        }
        let guard = self.encoder.device.snatch_lock.read();
        if let Some(raw) = group.raw.get(&guard) {
            self.hal.set_bind_group(index, raw.as_ref());
        }
        Ok(())
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: &Arc<Buffer>, offset: u64) {
        if self.ended {
            return;
        }
        let guard = self.encoder.device.snatch_lock.read();
        if let Some(raw) = buffer.raw.get(&guard) {
            self.hal.set_vertex_buffer(slot, raw.as_ref(), offset);
        }
    }

    pub fn set_index_buffer(&mut self, buffer: &Arc<Buffer>, offset: u64) {
        if self.ended {
            return;
        }
        let guard = self.encoder.device.snatch_lock.read();
        if let Some(raw) = buffer.raw.get(&guard) {
            self.hal.set_index_buffer(raw.as_ref(), offset);
        }
    }

    pub fn set_viewport(&mut self, x: f32, y: f32, w: f32, h: f32, min_depth: f32, max_depth: f32) {
        if self.ended {
            return;
        }
        self.hal.set_viewport(x, y, w, h, min_depth, max_depth);
    }

    pub fn set_scissor_rect(&mut self, x: u32, y: u32, w: u32, h: u32) {
        if self.ended {
            return;
        }
        self.hal.set_scissor_rect(x, y, w, h);
    }

    pub fn set_blend_constant(&mut self, color: [f64; 4]) {
        if self.ended {
            return;
        }
        self.hal.set_blend_constant(color);
    }

    pub fn set_stencil_reference(&mut self, reference: u32) {
        if self.ended {
            return;
        }
        self.hal.set_stencil_reference(reference);
    }

    pub fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>) {
        if self.ended {
            return;
        }
        self.hal.draw(vertices, instances);
    }

    pub fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        base_vertex: i32,
        instances: std::ops::Range<u32>,
    ) {
        if self.ended {
            return;
        }
        self.hal.draw_indexed(indices, base_vertex, instances);
    }

    pub fn draw_indirect(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: u64,
    ) -> Result<(), UnalignedIndirectOffset> {
        if self.ended {
            return Ok(());
        }
        if offset % 4 != 0 {
            return Err(UnalignedIndirectOffset { offset });
        }
        let guard = self.encoder.device.snatch_lock.read();
        if let Some(raw) = buffer.raw.get(&guard) {
            self.hal.draw_indirect(raw.as_ref(), offset);
        }
        Ok(())
    }

    pub fn draw_indexed_indirect(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: u64,
    ) -> Result<(), UnalignedIndirectOffset> {
        if self.ended {
            return Ok(());
        }
        if offset % 4 != 0 {
            return Err(UnalignedIndirectOffset { offset });
        }
        let guard = self.encoder.device.snatch_lock.read();
        if let Some(raw) = buffer.raw.get(&guard) {
            self.hal.draw_indexed_indirect(raw.as_ref(), offset);
        }
        Ok(())
    }

    pub fn push_debug_group(&mut self, label: &str) {
        if self.ended {
            return;
        }
        self.hal.push_debug_group(label);
    }

    pub fn pop_debug_group(&mut self) {
        if self.ended {
            return;
        }
        self.hal.pop_debug_group();
    }

    pub fn insert_debug_marker(&mut self, label: &str) {
        if self.ended {
            return;
        }
        self.hal.insert_debug_marker(label);
    }

    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.hal.end();
        let _ = self.encoder.end_pass(self.token);
    }
}

impl Drop for RenderPassEncoder {
    fn drop(&mut self) {
        self.end();
    }
}
