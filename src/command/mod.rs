//! `CommandEncoder`: the per-encoder finite automaton and its pass
//! encoders (`spec.md` §4.6). States are `Recording`, `Locked`, `Finished`,
//! `Error`, `Consumed`; every transition is serialized by the encoder's own
//! mutex.

mod compute;
mod render;

pub use compute::{ComputePassDescriptor, ComputePassEncoder};
pub use render::{ColorAttachment, DepthStencilAttachment, RenderPassDescriptor, RenderPassEncoder};

use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::Device;
use crate::error::{EncoderStateError, EncoderStatus};
use crate::hal::HalCommandEncoder;
use crate::resource::CommandBuffer;

fn state_error(operation: &'static str, status: EncoderStatus) -> EncoderStateError {
    EncoderStateError {
        operation: operation.into(),
        status,
    }
}

struct Inner {
    status: EncoderStatus,
    /// Taken on `finish()`/fatal error; `None` once consumed by either.
    hal: Option<Box<dyn HalCommandEncoder>>,
    active_pass_token: Option<u64>,
    next_pass_token: u64,
    last_error: Option<String>,
}

/// A per-device recording session (`spec.md` §3 "CommandEncoder status").
pub struct CommandEncoder {
    pub device: Arc<Device>,
    pub label: String,
    pub(crate) tracking_key: u64,
    inner: Mutex<Inner>,
}

impl CommandEncoder {
    pub(crate) fn new(device: Arc<Device>, hal: Box<dyn HalCommandEncoder>, label: String) -> Self {
        let tracking_key = crate::resource::next_tracking_key();
        crate::leak::track_resource(tracking_key, "CommandEncoder");
        Self {
            device,
            label,
            tracking_key,
            inner: Mutex::new(Inner {
                status: EncoderStatus::Recording,
                hal: Some(hal),
                active_pass_token: None,
                next_pass_token: 1,
                last_error: None,
            }),
        }
    }

    pub fn status(&self) -> EncoderStatus {
        self.inner.lock().status
    }

    /// The error recorded the first time this encoder transitioned into
    /// `Error`, if any (`spec.md` §6 `CommandEncoder::error`).
    pub fn error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    fn fail(&self, inner: &mut Inner, message: impl Into<String>) {
        inner.status = EncoderStatus::Error;
        inner.last_error = Some(message.into());
        inner.hal = None;
    }

    /// `spec.md` §4.6 `BeginRenderPass`.
    pub fn begin_render_pass(
        self: &Arc<Self>,
        desc: &RenderPassDescriptor<'_>,
    ) -> Result<RenderPassEncoder, EncoderStateError> {
        let mut inner = self.inner.lock();
        if inner.status != EncoderStatus::Recording {
            return Err(state_error("begin_render_pass", inner.status));
        }

        let guard = self.device.snatch_lock.read();
        let hal_desc_result = render::translate_render_pass_descriptor(desc, &guard);
        let hal_desc = match hal_desc_result {
            Ok(d) => d,
            Err(message) => {
                self.fail(&mut inner, message.clone());
                return Err(state_error("begin_render_pass", EncoderStatus::Error));
            }
        };

        let hal_encoder = inner.hal.as_mut().expect("Recording encoder always has a HAL handle");
        let hal_pass = match hal_encoder.begin_render_pass(&hal_desc) {
            Ok(pass) => pass,
            Err(e) => {
                let message = e.to_string();
                log::error!("begin_render_pass on '{}' failed in the HAL: {message}", self.label);
                self.fail(&mut inner, message.clone());
                return Err(state_error("begin_render_pass", EncoderStatus::Error));
            }
        };
        drop(guard);

        let token = inner.next_pass_token;
        inner.next_pass_token += 1;
        inner.active_pass_token = Some(token);
        inner.status = EncoderStatus::Locked;
        drop(inner);

        Ok(RenderPassEncoder::new(Arc::clone(self), token, hal_pass))
    }

    /// `spec.md` §4.6 `BeginComputePass`; a `None` descriptor becomes an
    /// empty HAL descriptor.
    pub fn begin_compute_pass(
        self: &Arc<Self>,
        desc: &ComputePassDescriptor<'_>,
    ) -> Result<ComputePassEncoder, EncoderStateError> {
        let mut inner = self.inner.lock();
        if inner.status != EncoderStatus::Recording {
            return Err(state_error("begin_compute_pass", inner.status));
        }

        let hal_desc = crate::hal::ComputePassDescriptor {
            label: desc.label.clone(),
        };
        let hal_encoder = inner.hal.as_mut().expect("Recording encoder always has a HAL handle");
        let hal_pass = match hal_encoder.begin_compute_pass(&hal_desc) {
            Ok(pass) => pass,
            Err(e) => {
                let message = e.to_string();
                log::error!("begin_compute_pass on '{}' failed in the HAL: {message}", self.label);
                self.fail(&mut inner, message.clone());
                return Err(state_error("begin_compute_pass", EncoderStatus::Error));
            }
        };

        let token = inner.next_pass_token;
        inner.next_pass_token += 1;
        inner.active_pass_token = Some(token);
        inner.status = EncoderStatus::Locked;
        drop(inner);

        Ok(ComputePassEncoder::new(Arc::clone(self), token, hal_pass))
    }

    /// Called by a pass encoder's `end()`. Internal invariant: `token` must
    /// match the currently active pass, since only one pass can be open at
    /// a time and its encoder is the only thing that can call this.
    pub(crate) fn end_pass(&self, token: u64) -> Result<(), EncoderStateError> {
        let mut inner = self.inner.lock();
        if inner.status != EncoderStatus::Locked {
            return Err(state_error("end_pass", inner.status));
        }
        debug_assert_eq!(
            inner.active_pass_token,
            Some(token),
            "pass ended does not match the encoder's active pass"
        );
        inner.active_pass_token = None;
        inner.status = EncoderStatus::Recording;
        Ok(())
    }

    /// `spec.md` §4.6 `Finish`.
    pub fn finish(self: &Arc<Self>) -> Result<CommandBuffer, EncoderStateError> {
        let mut inner = self.inner.lock();
        if inner.status != EncoderStatus::Recording {
            return Err(state_error("finish", inner.status));
        }

        let guard = self.device.snatch_lock.read();
        let mut hal = inner.hal.take().expect("Recording encoder always has a HAL handle");
        let raw = match hal.end_encoding() {
            Ok(raw) => raw,
            Err(e) => {
                let message = e.to_string();
                log::error!("finish on '{}' failed in the HAL: {message}", self.label);
                drop(guard);
                self.fail(&mut inner, message);
                return Err(state_error("finish", EncoderStatus::Error));
            }
        };
        drop(guard);

        inner.status = EncoderStatus::Finished;
        drop(inner);

        log::debug!("Command encoder '{}' finished", self.label);
        crate::leak::untrack_resource(self.tracking_key);
        Ok(CommandBuffer {
            raw,
            device: Arc::clone(&self.device),
            label: self.label.clone(),
        })
    }

    /// Invoked by the queue once this command buffer has been submitted
    /// (`spec.md` §4.6 `MarkConsumed`).
    pub fn mark_consumed(&self) {
        self.inner.lock().status = EncoderStatus::Consumed;
    }

    /// Debug marker passthrough on the encoder itself, outside any pass
    /// (SPEC_FULL §C.4). `spec.md` §6's HAL command encoder has no
    /// debug-marker methods of its own (only its pass encoders do), so
    /// these are pure bookkeeping: valid only while `Recording`, otherwise
    /// ignored like any other encoder call made out of state.
    pub fn push_debug_group(&self, _label: &str) {
        debug_assert_eq!(self.status(), EncoderStatus::Recording);
    }

    pub fn pop_debug_group(&self) {
        debug_assert_eq!(self.status(), EncoderStatus::Recording);
    }

    pub fn insert_debug_marker(&self, _label: &str) {
        debug_assert_eq!(self.status(), EncoderStatus::Recording);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::hal::mock::MockDevice;
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
    fn encoder_starts_recording() {
        let enc = test_encoder();
        assert_eq!(enc.status(), EncoderStatus::Recording);
    }

    #[test]
    fn full_lifecycle_matches_state_machine() {
        let enc = test_encoder();
        let pass = enc
            .begin_render_pass(&RenderPassDescriptor::default())
            .unwrap();
        assert_eq!(enc.status(), EncoderStatus::Locked);

        let err = enc.finish().unwrap_err();
        assert_eq!(err.status, EncoderStatus::Locked);

        let mut pass = pass;
        pass.end();
        assert_eq!(enc.status(), EncoderStatus::Recording);

        enc.finish().unwrap();
        assert_eq!(enc.status(), EncoderStatus::Finished);

        let err = enc.finish().unwrap_err();
        assert_eq!(err.status, EncoderStatus::Finished);
    }

    #[test]
    fn ending_a_pass_twice_is_idempotent() {
        let enc = test_encoder();
        let mut pass = enc
            .begin_render_pass(&RenderPassDescriptor::default())
            .unwrap();
        pass.end();
        pass.end();
        assert_eq!(enc.status(), EncoderStatus::Recording);
    }

    #[test]
    fn mark_consumed_after_finish() {
        let enc = test_encoder();
        enc.finish().unwrap();
        enc.mark_consumed();
        assert_eq!(enc.status(), EncoderStatus::Consumed);
    }
}
