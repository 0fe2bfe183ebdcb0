//! The `BackendProvider` registry (`spec.md` §4.8): a process-wide,
//! RW-guarded map from [`Backend`] to the factory that knows how to stand
//! up a [`crate::hal::HalInstance`] for it. Registration is rare;
//! enumeration (on every `Instance::new`) is common.

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::hal::HalInstance;

/// A HAL backend kind. Unknown/future variants are permitted — they sort
/// after the fixed priority list, in registration order (`spec.md` §4.8,
/// §9 "unknown variants are permitted and sort last").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Backend {
    Vulkan,
    Metal,
    Dx12,
    Gl,
    Empty,
    Other(u32),
}

/// Enumeration priority; anything not in this list (i.e. `Backend::Other`)
/// sorts after it, in registration order.
const PRIORITY: &[Backend] = &[Backend::Vulkan, Backend::Metal, Backend::Dx12, Backend::Gl, Backend::Empty];

fn priority_rank(backend: Backend) -> usize {
    PRIORITY.iter().position(|b| *b == backend).unwrap_or(PRIORITY.len())
}

/// A bitmask selecting a subset of [`Backend`] variants, one bit per
/// position in [`PRIORITY`] plus a catch-all bit for `Other`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendMask(u32);

impl BackendMask {
    pub const ALL: BackendMask = BackendMask(u32::MAX);

    pub fn single(backend: Backend) -> Self {
        Self(1 << priority_rank(backend).min(31))
    }

    pub fn contains(&self, backend: Backend) -> bool {
        self.0 & (1 << priority_rank(backend).min(31)) != 0
    }
}

impl std::ops::BitOr for BackendMask {
    type Output = BackendMask;
    fn bitor(self, rhs: Self) -> Self {
        BackendMask(self.0 | rhs.0)
    }
}

impl Default for BackendMask {
    fn default() -> Self {
        BackendMask::ALL
    }
}

/// A factory for one backend's [`HalInstance`] (`spec.md` §4.8).
pub trait BackendProvider: Send + Sync {
    fn variant(&self) -> Backend;
    fn create_instance(&self) -> Box<dyn HalInstance>;
    fn is_available(&self) -> bool;
}

/// The process-wide registry. `spec.md` §9: "writes (registration) are
/// rare, reads (enumeration) are common" — an `RwLock` favors readers.
pub struct BackendRegistry {
    providers: RwLock<IndexMap<Backend, Box<dyn BackendProvider>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(IndexMap::new()),
        }
    }

    pub fn register(&self, provider: Box<dyn BackendProvider>) {
        self.providers.write().insert(provider.variant(), provider);
    }

    /// All registered providers, ordered per the fixed priority list, with
    /// unregistered-priority/unknown variants falling back to registration
    /// order (`IndexMap` preserves insertion order, so a stable sort over
    /// the already-ordered entries gets us this for free).
    pub fn enumerate(&self) -> Vec<Backend> {
        let guard = self.providers.read();
        let mut backends: Vec<Backend> = guard.keys().copied().collect();
        backends.sort_by_key(|b| priority_rank(*b));
        backends
    }

    /// Providers whose variant is selected by `mask`; the `Empty` provider,
    /// if registered, is always included as a fallback (`spec.md` §4.8).
    pub fn filter_by_mask(&self, mask: BackendMask) -> Vec<Backend> {
        self.enumerate()
            .into_iter()
            .filter(|b| mask.contains(*b) || *b == Backend::Empty)
            .collect()
    }

    pub fn create_instance(&self, backend: Backend) -> Option<Box<dyn HalInstance>> {
        self.providers.read().get(&backend).map(|p| p.create_instance())
    }

    pub fn is_available(&self, backend: Backend) -> bool {
        self.providers.read().get(&backend).map(|p| p.is_available()).unwrap_or(false)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A provider that always reports available and hands back a fresh mock
/// instance; the no-hardware fallback used whenever nothing else is
/// registered (`spec.md` §4.9 step 3).
pub struct MockBackendProvider;

impl BackendProvider for MockBackendProvider {
    fn variant(&self) -> Backend {
        Backend::Empty
    }

    fn create_instance(&self) -> Box<dyn HalInstance> {
        Box::new(crate::hal::mock::MockHalInstance::new())
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumeration_follows_fixed_priority() {
        let registry = BackendRegistry::new();
        registry.register(Box::new(TestProvider(Backend::Gl)));
        registry.register(Box::new(TestProvider(Backend::Vulkan)));
        registry.register(Box::new(TestProvider(Backend::Metal)));
        assert_eq!(
            registry.enumerate(),
            vec![Backend::Vulkan, Backend::Metal, Backend::Gl]
        );
    }

    #[test]
    fn unknown_variants_sort_after_the_priority_list_in_registration_order() {
        let registry = BackendRegistry::new();
        registry.register(Box::new(TestProvider(Backend::Other(2))));
        registry.register(Box::new(TestProvider(Backend::Vulkan)));
        registry.register(Box::new(TestProvider(Backend::Other(1))));
        assert_eq!(
            registry.enumerate(),
            vec![Backend::Vulkan, Backend::Other(2), Backend::Other(1)]
        );
    }

    #[test]
    fn empty_provider_always_survives_mask_filtering() {
        let registry = BackendRegistry::new();
        registry.register(Box::new(TestProvider(Backend::Vulkan)));
        registry.register(Box::new(MockBackendProvider));
        let filtered = registry.filter_by_mask(BackendMask::single(Backend::Metal));
        assert!(filtered.contains(&Backend::Empty));
        assert!(!filtered.contains(&Backend::Vulkan));
    }

    struct TestProvider(Backend);

    impl BackendProvider for TestProvider {
        fn variant(&self) -> Backend {
            self.0
        }
        fn create_instance(&self) -> Box<dyn HalInstance> {
            Box::new(crate::hal::mock::MockHalInstance::new())
        }
        fn is_available(&self) -> bool {
            true
        }
    }
}
