//! End-to-end exercise of the public API against the mock HAL backend:
//! instance → adapter → device → buffer/encoder → queue submission →
//! destruction, driven the way a real host would drive it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gpu_core::command::ComputePassDescriptor;
use gpu_core::device::Device;
use gpu_core::error::EncoderStatus;
use gpu_core::hub::Hub;
use gpu_core::id::Id;
use gpu_core::instance::{Instance, InstanceDescriptor, PowerPreference, RequestAdapterOptions};
use gpu_core::queue::Queue;
use gpu_core::resource::{BufferUsages, Features, Limits};

fn open_test_device(hub: &Arc<Hub>, instance: &Instance) -> Arc<Device> {
    let adapter_id = instance
        .request_adapter(&RequestAdapterOptions::default())
        .expect("the mock fallback adapter always matches the default request");

    let hal_device = hub
        .adapters
        .get(adapter_id, |adapter| adapter.open_hal_device())
        .expect("adapter id is valid")
        .expect("mock adapter always opens");

    let queue_id = Id::zip(1, 1);
    Arc::new(Device::new(
        adapter_id,
        queue_id,
        hal_device,
        Some("test device".into()),
        Features::empty(),
        Limits::default(),
    ))
}

#[test]
fn falls_back_to_a_mock_adapter_with_no_backends_registered() {
    let hub = Arc::new(Hub::new());
    let instance = Instance::new(Arc::clone(&hub), InstanceDescriptor::default());
    assert!(instance.use_mock());
    assert_eq!(hub.adapters.count(), 1);

    let err = instance
        .request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::LowPower,
            force_fallback_adapter: false,
        })
        .unwrap_err();
    assert_eq!(err.to_string(), "no adapter matched the requested options");
}

#[test]
fn full_lifecycle_buffer_compute_pass_and_submission() {
    let hub = Arc::new(Hub::new());
    let instance = Instance::new(Arc::clone(&hub), InstanceDescriptor::default());
    let device = open_test_device(&hub, &instance);

    let buffer = device
        .create_buffer(Some("vertices".into()), 256, BufferUsages::STORAGE, false)
        .expect("valid descriptor against the mock HAL always succeeds");
    assert_eq!(buffer.size(), 256);
    assert!(!buffer.is_fully_initialized());

    let queue = Queue::new(Arc::clone(&device)).expect("device is valid");
    queue
        .write_buffer(&buffer, 0, 256)
        .expect("write fits exactly within the buffer");
    assert!(buffer.is_fully_initialized());

    let encoder = Arc::new(
        device
            .create_command_encoder(Some("main encoder".into()))
            .expect("device is valid"),
    );
    assert_eq!(encoder.status(), EncoderStatus::Recording);

    {
        let mut pass = encoder
            .begin_compute_pass(&ComputePassDescriptor::default())
            .expect("encoder is recording");
        assert_eq!(encoder.status(), EncoderStatus::Locked);
        pass.dispatch(8, 1, 1);
        pass.end();
    }
    assert_eq!(encoder.status(), EncoderStatus::Recording);

    let command_buffer = encoder.finish().expect("encoder is recording");
    assert_eq!(encoder.status(), EncoderStatus::Finished);

    let submission = queue
        .submit(vec![command_buffer])
        .expect("command buffer belongs to this device");
    assert_eq!(submission, 1);

    let done = Arc::new(AtomicBool::new(false));
    let done_clone = Arc::clone(&done);
    queue.on_submitted_work_done(move || done_clone.store(true, Ordering::SeqCst));
    assert!(!done.load(Ordering::SeqCst));
    queue.maintain();
    assert!(done.load(Ordering::SeqCst));

    device.destroy();
    let err = device
        .create_buffer(None, 16, BufferUsages::VERTEX, false)
        .unwrap_err();
    assert_eq!(err.kind, gpu_core::error::CreateBufferErrorKind::Hal);

    instance.destroy();
    assert_eq!(hub.adapters.count(), 0);
}

#[test]
fn submitting_a_foreign_command_buffer_is_rejected() {
    let hub = Arc::new(Hub::new());
    let instance = Instance::new(Arc::clone(&hub), InstanceDescriptor::default());
    let device_a = open_test_device(&hub, &instance);
    let device_b = open_test_device(&hub, &instance);

    let encoder = Arc::new(device_b.create_command_encoder(None).unwrap());
    let command_buffer = encoder.finish().unwrap();

    let queue_a = Queue::new(Arc::clone(&device_a)).unwrap();
    let err = queue_a.submit(vec![command_buffer]).unwrap_err();
    assert_eq!(err, gpu_core::queue::QueueSubmitError::ForeignCommandBuffer);
}

#[test]
fn error_scope_captures_a_reported_validation_error() {
    let hub = Arc::new(Hub::new());
    let instance = Instance::new(Arc::clone(&hub), InstanceDescriptor::default());
    let device = open_test_device(&hub, &instance);

    device.push_error_scope(gpu_core::error_scope::ErrorFilter::Validation);
    let matched = device.report_error(gpu_core::error_scope::ErrorFilter::Validation, "bad buffer size");
    assert!(matched);

    let captured = device.pop_error_scope().expect("one scope was pushed");
    assert_eq!(captured.message, "bad buffer size");
}

#[test]
fn finishing_an_already_finished_encoder_is_a_state_error() {
    let hub = Arc::new(Hub::new());
    let instance = Instance::new(Arc::clone(&hub), InstanceDescriptor::default());
    let device = open_test_device(&hub, &instance);

    let encoder = Arc::new(device.create_command_encoder(None).unwrap());
    encoder.finish().unwrap();

    let err = encoder.finish().unwrap_err();
    assert_eq!(err.status, EncoderStatus::Finished);
}
