//! Optional handle-to-typename leak tracker, gated by a global debug flag
//! (`spec.md` §4.5). Disabled by default cost: a single atomic load per
//! call. With the `counters` feature off, the counting infrastructure is
//! compiled out entirely and `report_leaks` always returns `None`, mirroring
//! the teacher's own `counters` feature (`wgpu-core/Cargo.toml`).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "counters")]
use once_cell::sync::Lazy;
#[cfg(feature = "counters")]
use parking_lot::Mutex;

#[cfg(feature = "counters")]
use crate::FastHashMap;

static DEBUG_MODE: AtomicBool = AtomicBool::new(false);

#[cfg(feature = "counters")]
static LEAKS: Lazy<Mutex<FastHashMap<u64, &'static str>>> =
    Lazy::new(|| Mutex::new(FastHashMap::default()));

/// Enable or disable leak tracking process-wide.
pub fn set_debug_mode(enabled: bool) {
    DEBUG_MODE.store(enabled, Ordering::Release);
}

pub fn debug_mode() -> bool {
    DEBUG_MODE.load(Ordering::Acquire)
}

/// Record that a resource was created. A no-op unless `debug_mode` is set;
/// `key == 0` is always ignored (no resource uses the null key).
pub fn track_resource(key: u64, typename: &'static str) {
    if key == 0 || !debug_mode() {
        return;
    }
    #[cfg(feature = "counters")]
    {
        LEAKS.lock().insert(key, typename);
    }
    #[cfg(not(feature = "counters"))]
    {
        let _ = typename;
    }
}

/// Record that a previously tracked resource was destroyed.
pub fn untrack_resource(key: u64) {
    if key == 0 || !debug_mode() {
        return;
    }
    #[cfg(feature = "counters")]
    {
        LEAKS.lock().remove(&key);
    }
}

/// A snapshot of still-tracked resources at the time `report_leaks` was
/// called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakReport {
    pub count: usize,
    pub types: BTreeMap<String, usize>,
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} leaked resource(s): ", self.count)?;
        for (i, (name, count)) in self.types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {count}")?;
        }
        Ok(())
    }
}

/// `None` if nothing is currently tracked (or the `counters` feature is
/// disabled); otherwise a count per type name, enumerated in lexicographic
/// order.
pub fn report_leaks() -> Option<LeakReport> {
    #[cfg(feature = "counters")]
    {
        let map = LEAKS.lock();
        if map.is_empty() {
            return None;
        }
        let mut types = BTreeMap::new();
        for name in map.values() {
            *types.entry((*name).to_string()).or_insert(0) += 1;
        }
        Some(LeakReport {
            count: map.len(),
            types,
        })
    }
    #[cfg(not(feature = "counters"))]
    {
        None
    }
}

/// Test hook: forget everything currently tracked.
pub fn reset_leak_tracker() {
    #[cfg(feature = "counters")]
    {
        LEAKS.lock().clear();
    }
}

#[cfg(all(test, feature = "counters"))]
mod tests {
    use super::*;

    // `DEBUG_MODE`/`LEAKS` are process-global, so every case that needs a
    // clean slate lives in one test function rather than risking
    // interference from `cargo test`'s default thread-per-test execution.
    #[test]
    fn leak_tracker_lifecycle() {
        set_debug_mode(false);
        reset_leak_tracker();
        track_resource(0xabc, "Buffer");
        assert!(report_leaks().is_none(), "debug_mode off must be a no-op");

        set_debug_mode(true);
        reset_leak_tracker();
        track_resource(0, "Buffer");
        assert!(report_leaks().is_none(), "key 0 must be ignored");

        track_resource(0x1000, "Buffer");
        track_resource(0x2000, "Texture");
        untrack_resource(0x1000);

        let report = report_leaks().expect("expected a leak report");
        assert_eq!(report.count, 1);
        assert_eq!(report.types.get("Texture"), Some(&1));
        assert_eq!(report.types.get("Buffer"), None);

        untrack_resource(0x2000);
        assert!(report_leaks().is_none());

        set_debug_mode(false);
    }
}
