//! [`Global`]: the process-wide singleton wrapping the [`Hub`] and the
//! surface registry (`spec.md` §4.2). Constructed lazily on first access
//! and never torn down during the process lifetime, except by the
//! test-only [`reset`].

use once_cell::sync::OnceCell;

use crate::hub::{Hub, HubReport};
use crate::id::SurfaceId;
use crate::registry::{InvalidId, Registry};
use crate::resource::Surface;
use crate::Label;

static GLOBAL: OnceCell<Global> = OnceCell::new();

/// Snapshot of every live-resource count, including surfaces, which live
/// outside the Hub proper (`spec.md` §4.2 `Global::stats()`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlobalReport {
    pub hub: HubReport,
    pub surfaces: u64,
}

pub struct Global {
    pub hub: Hub,
    pub surfaces: Registry<Surface, crate::id::Surface>,
}

impl Global {
    fn new() -> Self {
        Self {
            hub: Hub::new(),
            surfaces: Registry::new(),
        }
    }

    /// The process-wide instance, constructed on first access.
    pub fn get() -> &'static Global {
        GLOBAL.get_or_init(Global::new)
    }

    pub fn create_surface(&self, label: Label<'_>) -> SurfaceId {
        self.surfaces.register(Surface {
            label: label.map(|cow| cow.into_owned()).unwrap_or_default(),
        })
    }

    pub fn destroy_surface(&self, id: SurfaceId) -> Result<(), InvalidId> {
        self.surfaces.unregister(id)?;
        Ok(())
    }

    pub fn stats(&self) -> GlobalReport {
        GlobalReport {
            hub: self.hub.report(),
            surfaces: self.surfaces.count(),
        }
    }
}

/// Test-only: a fresh `Global` independent of the process-wide singleton.
/// `spec.md` §9 calls for a test-only `reset()` that replaces the
/// singleton instance; since [`OnceCell`] cannot be safely re-initialized
/// once set, tests get the same isolation by building their own scratch
/// instance here rather than mutating [`GLOBAL`] in place.
#[cfg(test)]
pub(crate) fn new_scratch_global() -> Global {
    Global::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_reports_surfaces_separately_from_hub() {
        let global = new_scratch_global();
        global.create_surface(None);
        global.create_surface(None);
        let report = global.stats();
        assert_eq!(report.surfaces, 2);
        assert_eq!(report.hub.buffers, 0);
    }

    #[test]
    fn destroy_surface_removes_it() {
        let global = new_scratch_global();
        let id = global.create_surface(None);
        global.destroy_surface(id).unwrap();
        assert_eq!(global.stats().surfaces, 0);
    }

    #[test]
    fn get_returns_the_same_instance_every_call() {
        let a = Global::get() as *const Global;
        let b = Global::get() as *const Global;
        assert_eq!(a, b);
    }
}
