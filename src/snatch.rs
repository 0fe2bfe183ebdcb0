//! Snatch discipline: a per-device reader/writer barrier ([`SnatchLock`])
//! plus the one-shot move-out cell ([`Snatchable`]) that HAL handles live
//! behind (`spec.md` §4.3).
//!
//! All HAL access from this core goes through `Snatchable::get` under a
//! [`SnatchGuard`]; all HAL destruction goes through `Snatchable::snatch`
//! under an [`ExclusiveSnatchGuard`], which hands the value back exactly
//! once.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Per-device RW barrier. Any number of [`SnatchGuard`]s may coexist; an
/// [`ExclusiveSnatchGuard`] excludes all of them.
pub struct SnatchLock {
    lock: RwLock<()>,
}

impl SnatchLock {
    pub fn new() -> Self {
        Self { lock: RwLock::new(()) }
    }

    /// Acquire a shared read guard. Readers of any resource belonging to
    /// this device should hold one for the duration of their HAL access.
    pub fn read(&self) -> SnatchGuard<'_> {
        SnatchGuard {
            _guard: self.lock.read(),
        }
    }

    /// Acquire the exclusive write guard used to snatch HAL handles for
    /// destruction. Blocks until every outstanding read guard is released.
    pub fn write(&self) -> ExclusiveSnatchGuard<'_> {
        ExclusiveSnatchGuard {
            _guard: self.lock.write(),
        }
    }
}

impl Default for SnatchLock {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII read guard of a [`SnatchLock`].
pub struct SnatchGuard<'a> {
    _guard: RwLockReadGuard<'a, ()>,
}

/// RAII exclusive guard of a [`SnatchLock`], required to call
/// [`Snatchable::snatch`].
pub struct ExclusiveSnatchGuard<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
}

/// A HAL handle that can be read many times but moved out exactly once.
pub struct Snatchable<T> {
    value: UnsafeCell<Option<T>>,
    snatched: AtomicBool,
}

// SAFETY: access to `value` is only ever performed while holding a
// `SnatchGuard`/`ExclusiveSnatchGuard`, and the two are mutually exclusive
// via the backing `RwLock`, so `Snatchable<T>` is as thread-safe as `T`
// itself.
unsafe impl<T: Send> Send for Snatchable<T> {}
unsafe impl<T: Send + Sync> Sync for Snatchable<T> {}

impl<T> Snatchable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(Some(value)),
            snatched: AtomicBool::new(false),
        }
    }

    /// An already-snatched cell, for resources that never held a live HAL
    /// handle in the first place.
    pub fn empty() -> Self {
        Self {
            value: UnsafeCell::new(None),
            snatched: AtomicBool::new(true),
        }
    }

    /// Borrow the value, or `None` if it has already been snatched.
    ///
    /// The caller must hold a guard belonging to the owning device's
    /// `SnatchLock`; since `snatch` can only run under the exclusive guard,
    /// holding any guard at all rules out a concurrent snatch for the
    /// lifetime of the borrow.
    pub fn get(&self, _guard: &SnatchGuard<'_>) -> Option<&T> {
        if self.snatched.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: no `snatch` call can be in flight while any `SnatchGuard`
        // is held, because `snatch` requires the mutually-exclusive write
        // guard of the same lock.
        unsafe { &*self.value.get() }.as_ref()
    }

    pub fn is_snatched(&self) -> bool {
        self.snatched.load(Ordering::Acquire)
    }

    /// Move the value out. Returns `Some` exactly once across any schedule
    /// of concurrent callers; every other call (before or after) sees
    /// `None`.
    pub fn snatch(&self, _guard: &ExclusiveSnatchGuard<'_>) -> Option<T> {
        if self.snatched.swap(true, Ordering::AcqRel) {
            return None;
        }
        // SAFETY: we just won the race to flip `snatched`, and the
        // exclusive guard rules out any concurrent reader.
        unsafe { (*self.value.get()).take() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn snatch_once_under_contention() {
        let lock = Arc::new(SnatchLock::new());
        let cell = Arc::new(Snatchable::new(123u32));
        let successes = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let cell = Arc::clone(&cell);
                let successes = Arc::clone(&successes);
                std::thread::spawn(move || {
                    let guard = lock.write();
                    if cell.snatch(&guard).is_some() {
                        successes.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert!(cell.is_snatched());
        assert!(cell.get(&lock.read()).is_none());
    }

    #[test]
    fn get_succeeds_until_snatched() {
        let lock = SnatchLock::new();
        let cell = Snatchable::new(String::from("hal-handle"));
        assert_eq!(cell.get(&lock.read()), Some(&String::from("hal-handle")));
        assert_eq!(cell.snatch(&lock.write()), Some(String::from("hal-handle")));
        assert_eq!(cell.snatch(&lock.write()), None);
        assert_eq!(cell.get(&lock.read()), None);
    }

    #[test]
    fn readers_do_not_block_each_other() {
        let lock = SnatchLock::new();
        let _g1 = lock.read();
        let _g2 = lock.read();
    }
}
