//! `ComputePassEncoder` (`spec.md` §4.6, §6).

use std::sync::Arc;

use crate::error::{BindGroupIndexOutOfRange, UnalignedIndirectOffset};
use crate::hal;
use crate::resource::{BindGroup, Buffer, ComputePipeline};
use crate::Label;

use super::CommandEncoder;

const MAX_BIND_GROUP_INDEX: u32 = 3;

/// `spec.md` §4.6 `BeginComputePass` descriptor; a `None` label becomes an
/// empty HAL descriptor.
#[derive(Default)]
pub struct ComputePassDescriptor<'a> {
    pub label: Label<'a>,
}

/// A borrowed recording session for one compute pass. Every mutator
/// silently no-ops once `end()` has run.
pub struct ComputePassEncoder {
    encoder: Arc<CommandEncoder>,
    token: u64,
    hal: Box<dyn hal::HalComputePassEncoder>,
    ended: bool,
}

impl ComputePassEncoder {
    pub(super) fn new(
        encoder: Arc<CommandEncoder>,
        token: u64,
        hal: Box<dyn hal::HalComputePassEncoder>,
    ) -> Self {
        Self {
            encoder,
            token,
            hal,
            ended: false,
        }
    }

    pub fn set_pipeline(&mut self, pipeline: &Arc<ComputePipeline>) {
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
        group: &Arc<BindGroup>,
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

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        if self.ended {
            return;
        }
        self.hal.dispatch(x, y, z);
    }

    pub fn dispatch_indirect(
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
            self.hal.dispatch_indirect(raw.as_ref(), offset);
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

impl Drop for ComputePassEncoder {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::hal::mock::MockDevice;
    use crate::hal::HalDevice;
    use crate::id::Id;
    use crate::resource::{Features, Limits};

    fn test_encoder() -> Arc<CommandEncoder> {
        let device = Arc::new(Device::new(
            Id::zip(1, 1),
            Id::zip(1, 1),
            Box::new(MockDevice::new()),
            None,
            Features::empty(),
            Limits::default(),
        ));
        Arc::new(device.create_command_encoder(None).unwrap())
    }

    #[test]
    fn dispatch_indirect_rejects_unaligned_offset() {
        let enc = test_encoder();
        let buffer = Arc::new(
            enc.device
                .create_buffer(None, 64, crate::resource::BufferUsages::INDIRECT, false)
                .unwrap(),
        );
        let mut pass = enc.begin_compute_pass(&ComputePassDescriptor::default()).unwrap();
        let err = pass.dispatch_indirect(&buffer, 3).unwrap_err();
        assert_eq!(err.offset, 3);
    }

    #[test]
    fn set_bind_group_rejects_out_of_range_index() {
        let enc = test_encoder();
        let device = Arc::clone(&enc.device);
        let group = Arc::new(crate::resource::BindGroup::new(
            crate::hal::mock::MockDevice::new().create_bind_group(None).unwrap(),
            device,
            "bg".to_string(),
        ));
        let mut pass = enc.begin_compute_pass(&ComputePassDescriptor::default()).unwrap();
        let err = pass.set_bind_group(4, &group).unwrap_err();
        assert_eq!(err.index, 4);
        assert_eq!(err.max, MAX_BIND_GROUP_INDEX);
    }

    #[test]
    fn mutators_no_op_after_end() {
        let enc = test_encoder();
        let mut pass = enc.begin_compute_pass(&ComputePassDescriptor::default()).unwrap();
        pass.end();
        pass.dispatch(1, 1, 1);
        assert_eq!(enc.status(), crate::error::EncoderStatus::Recording);
    }
}
