//! `Instance`: registers HAL backend providers, enumerates their adapters
//! into a [`Hub`], and falls back to a mock adapter when no real backend
//! registered one (`spec.md` §4.9).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::backend::{Backend, BackendMask, BackendRegistry, MockBackendProvider};
use crate::hal::mock::MockHalInstance;
use crate::hal::HalInstance;
use crate::hub::Hub;
use crate::id::AdapterId;
use crate::resource::{Adapter, DeviceType};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PowerPreference {
    #[default]
    None,
    LowPower,
    HighPerformance,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RequestAdapterOptions {
    pub power_preference: PowerPreference,
    pub force_fallback_adapter: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct InstanceDescriptor {
    pub backends: BackendMask,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("no adapter matched the requested options")]
pub struct NoMatchingAdapter;

/// One instance of the graphics stack's entry point (`spec.md` GLOSSARY,
/// "Instance"). Owns every HAL backend instance it created and the
/// adapters it enumerated from them, in registration order.
pub struct Instance {
    hub: Arc<Hub>,
    registry: BackendRegistry,
    adapters: Mutex<Vec<AdapterId>>,
    hal_instances: Mutex<Vec<Box<dyn HalInstance>>>,
    use_mock: AtomicBool,
}

impl Instance {
    /// `spec.md` §4.9 `new_instance(desc)`.
    pub fn new(hub: Arc<Hub>, desc: InstanceDescriptor) -> Self {
        let registry = BackendRegistry::new();
        registry.register(Box::new(MockBackendProvider));

        let instance = Self {
            hub,
            registry,
            adapters: Mutex::new(Vec::new()),
            hal_instances: Mutex::new(Vec::new()),
            use_mock: AtomicBool::new(false),
        };
        instance.populate(desc);
        instance
    }

    fn register_exposed_adapters(&self, hal_instance: &dyn HalInstance) -> usize {
        let mut registered = 0;
        for exposed in hal_instance.enumerate_adapters() {
            let adapter = Adapter::new(exposed.info, exposed.features, exposed.limits, Some(exposed.adapter));
            let id = self.hub.adapters.register(adapter);
            self.adapters.lock().push(id);
            registered += 1;
        }
        registered
    }

    fn populate(&self, desc: InstanceDescriptor) {
        let mut any_registered = false;
        for backend in self.registry.filter_by_mask(desc.backends) {
            if backend == Backend::Empty {
                continue;
            }
            if let Some(hal_instance) = self.registry.create_instance(backend) {
                if self.register_exposed_adapters(hal_instance.as_ref()) > 0 {
                    any_registered = true;
                }
                self.hal_instances.lock().push(hal_instance);
            }
        }

        if !any_registered {
            self.use_mock.store(true, Ordering::Release);
            let mock_instance = MockHalInstance::new();
            self.register_exposed_adapters(&mock_instance);
            self.hal_instances.lock().push(Box::new(mock_instance));
        }
    }

    pub fn use_mock(&self) -> bool {
        self.use_mock.load(Ordering::Acquire)
    }

    /// `spec.md` §4.9 `request_adapter(options)`: scans in registration
    /// order, returning the first adapter matching `options`.
    pub fn request_adapter(&self, options: &RequestAdapterOptions) -> Result<AdapterId, NoMatchingAdapter> {
        let adapters = self.adapters.lock();
        for &id in adapters.iter() {
            let matches = self
                .hub
                .adapters
                .get(id, |adapter| adapter_matches(adapter, options))
                .unwrap_or(false);
            if matches {
                return Ok(id);
            }
        }
        Err(NoMatchingAdapter)
    }

    /// `spec.md` §4.9 `destroy()`: unregisters every adapter (destroying
    /// its HAL counterpart), destroys every HAL instance, empties both
    /// lists.
    pub fn destroy(&self) {
        for id in self.adapters.lock().drain(..) {
            if let Ok(adapter) = self.hub.adapters.unregister(id) {
                adapter.destroy_hal();
            }
        }
        for hal_instance in self.hal_instances.lock().drain(..) {
            hal_instance.destroy();
        }
        self.use_mock.store(false, Ordering::Release);
    }
}

fn adapter_matches(adapter: &Adapter, options: &RequestAdapterOptions) -> bool {
    if options.force_fallback_adapter {
        return adapter.info.device_type == DeviceType::Cpu;
    }
    match options.power_preference {
        PowerPreference::None => true,
        PowerPreference::LowPower => adapter.info.device_type == DeviceType::IntegratedGpu,
        PowerPreference::HighPerformance => adapter.info.device_type == DeviceType::DiscreteGpu,
    }
}
