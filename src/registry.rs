//! `IdentityAllocator` (index recycling) and `Storage` (epoch-validated
//! slots) combine into [`Registry`], the typed lifecycle API for one
//! resource kind (`spec.md` §4.1).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::id::{Id, Marker};
use crate::Epoch;

/// Registry-level errors (`spec.md` §7, "Registry errors").
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum InvalidId {
    #[error("id is the reserved zero id")]
    InvalidId,
    #[error("no resource was ever allocated at index {index}")]
    NotFound { index: u32 },
    #[error("index {index} holds epoch {stored}, but id carries epoch {requested}")]
    EpochMismatch {
        index: u32,
        stored: Epoch,
        requested: Epoch,
    },
}

/// The minimum capacity a freshly created [`Storage`] grows to.
const MIN_CAPACITY: usize = 64;

#[derive(Debug)]
enum SlotStatus<T> {
    /// Never allocated.
    Vacant,
    /// Live, with the epoch it was allocated at.
    Occupied(Epoch, T),
    /// Previously allocated and since removed. The epoch is retained so a
    /// later `register` at this index knows which epoch to allocate next,
    /// and so that *any* `get` against an id carrying this index reports
    /// `EpochMismatch` rather than `NotFound` — even if the id's epoch
    /// happens to equal the one last stored here (P3: a freed slot never
    /// again compares equal for `get`/`contains`).
    Freed(Epoch),
}

struct Storage<T> {
    slots: Vec<Mutex<SlotStatus<T>>>,
}

impl<T> Storage<T> {
    fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Mutex::new(SlotStatus::Vacant));
        Self { slots }
    }

    fn grow_to(&mut self, at_least: usize) {
        if at_least <= self.slots.len() {
            return;
        }
        let new_len = at_least.max(self.slots.len() * 2).max(MIN_CAPACITY);
        self.slots
            .resize_with(new_len, || Mutex::new(SlotStatus::Vacant));
    }
}

/// Free-list index allocator: hands out indices, recycling released ones
/// with an incremented epoch (`spec.md` §4.1 "Allocation policy").
struct IdentityAllocator {
    free_list: Mutex<Vec<u32>>,
    next_index: AtomicU32,
}

impl IdentityAllocator {
    fn new() -> Self {
        Self {
            free_list: Mutex::new(Vec::new()),
            next_index: AtomicU32::new(0),
        }
    }

    fn allocate(&self) -> u32 {
        if let Some(index) = self.free_list.lock().pop() {
            return index;
        }
        self.next_index.fetch_add(1, Ordering::AcqRel)
    }

    fn release(&self, index: u32) {
        self.free_list.lock().push(index);
    }
}

/// Typed lifecycle for one resource kind: allocates [`Id<T>`]s and stores
/// the associated values, with epoch-based use-after-free rejection.
pub struct Registry<T, M: Marker> {
    storage: RwLock<Storage<T>>,
    identity: IdentityAllocator,
    live_count: AtomicU64,
    _marker: std::marker::PhantomData<M>,
}

impl<T, M: Marker> Registry<T, M> {
    pub fn new() -> Self {
        Self {
            storage: RwLock::new(Storage::with_capacity(MIN_CAPACITY)),
            identity: IdentityAllocator::new(),
            live_count: AtomicU64::new(0),
            _marker: std::marker::PhantomData,
        }
    }

    /// Insert `item`, returning its freshly allocated, nonzero id.
    pub fn register(&self, item: T) -> Id<M> {
        let index = self.identity.allocate();
        {
            let storage = self.storage.read();
            if (index as usize) < storage.slots.len() {
                let mut slot = storage.slots[index as usize].lock();
                let epoch = match &*slot {
                    SlotStatus::Vacant => 1,
                    SlotStatus::Freed(e) => e + 1,
                    SlotStatus::Occupied(..) => {
                        unreachable!("identity allocator handed out a live index")
                    }
                };
                *slot = SlotStatus::Occupied(epoch, item);
                self.live_count.fetch_add(1, Ordering::AcqRel);
                log::trace!("Registered {} id {}", M::TYPE, index);
                return Id::zip(index, epoch);
            }
        }
        // Slow path: need to grow storage first.
        let epoch = {
            let mut storage = self.storage.write();
            storage.grow_to(index as usize + 1);
            let mut slot = storage.slots[index as usize].lock();
            let epoch = match &*slot {
                SlotStatus::Vacant => 1,
                SlotStatus::Freed(e) => e + 1,
                SlotStatus::Occupied(..) => unreachable!(),
            };
            *slot = SlotStatus::Occupied(epoch, item);
            epoch
        };
        self.live_count.fetch_add(1, Ordering::AcqRel);
        log::trace!("Registered {} id {}", M::TYPE, index);
        Id::zip(index, epoch)
    }

    fn with_slot<R>(
        &self,
        id: Id<M>,
        f: impl FnOnce(&SlotStatus<T>, u32, Epoch) -> Result<R, InvalidId>,
    ) -> Result<R, InvalidId> {
        if id.is_zero() {
            return Err(InvalidId::InvalidId);
        }
        let (index, epoch) = id.unzip();
        let storage = self.storage.read();
        let slot = storage
            .slots
            .get(index as usize)
            .ok_or(InvalidId::NotFound { index })?;
        let slot = slot.lock();
        f(&slot, index, epoch)
    }

    /// Look up `id`, calling `f` with the stored value if it is live.
    pub fn get<R>(&self, id: Id<M>, f: impl FnOnce(&T) -> R) -> Result<R, InvalidId> {
        self.with_slot(id, |slot, index, epoch| match slot {
            SlotStatus::Vacant => Err(InvalidId::NotFound { index }),
            SlotStatus::Occupied(stored, item) if *stored == epoch => Ok(f(item)),
            SlotStatus::Occupied(stored, _) => Err(InvalidId::EpochMismatch {
                index,
                stored: *stored,
                requested: epoch,
            }),
            SlotStatus::Freed(stored) => Err(InvalidId::EpochMismatch {
                index,
                stored: *stored,
                requested: epoch,
            }),
        })
    }

    /// Look up `id` mutably, calling `f` with the stored value if it is live.
    pub fn get_mut<R>(&self, id: Id<M>, f: impl FnOnce(&mut T) -> R) -> Result<R, InvalidId> {
        if id.is_zero() {
            return Err(InvalidId::InvalidId);
        }
        let (index, epoch) = id.unzip();
        let storage = self.storage.read();
        let slot = storage
            .slots
            .get(index as usize)
            .ok_or(InvalidId::NotFound { index })?;
        let mut slot = slot.lock();
        match &mut *slot {
            SlotStatus::Vacant => Err(InvalidId::NotFound { index }),
            SlotStatus::Occupied(stored, item) if *stored == epoch => Ok(f(item)),
            SlotStatus::Occupied(stored, _) => Err(InvalidId::EpochMismatch {
                index,
                stored: *stored,
                requested: epoch,
            }),
            SlotStatus::Freed(stored) => Err(InvalidId::EpochMismatch {
                index,
                stored: *stored,
                requested: epoch,
            }),
        }
    }

    /// Remove and return the value stored at `id`.
    pub fn unregister(&self, id: Id<M>) -> Result<T, InvalidId> {
        if id.is_zero() {
            log::warn!("Tried to drop invalid {} id: zero id", M::TYPE);
            return Err(InvalidId::InvalidId);
        }
        let (index, epoch) = id.unzip();
        let storage = self.storage.read();
        let slot = match storage.slots.get(index as usize) {
            Some(slot) => slot,
            None => {
                log::warn!("Tried to drop invalid {} id: {:?}", M::TYPE, id);
                return Err(InvalidId::NotFound { index });
            }
        };
        let mut slot = slot.lock();
        let item = match &*slot {
            SlotStatus::Vacant => {
                log::warn!("Tried to drop invalid {} id: {:?}", M::TYPE, id);
                return Err(InvalidId::NotFound { index });
            }
            SlotStatus::Occupied(stored, _) if *stored != epoch => {
                log::warn!("Tried to drop invalid {} id: {:?}", M::TYPE, id);
                return Err(InvalidId::EpochMismatch {
                    index,
                    stored: *stored,
                    requested: epoch,
                });
            }
            SlotStatus::Freed(stored) => {
                log::warn!("Tried to drop invalid {} id: {:?}", M::TYPE, id);
                return Err(InvalidId::EpochMismatch {
                    index,
                    stored: *stored,
                    requested: epoch,
                });
            }
            SlotStatus::Occupied(..) => {
                let SlotStatus::Occupied(stored, item) =
                    std::mem::replace(&mut *slot, SlotStatus::Freed(epoch))
                else {
                    unreachable!()
                };
                let _ = stored;
                item
            }
        };
        drop(slot);
        drop(storage);
        self.identity.release(index);
        self.live_count.fetch_sub(1, Ordering::AcqRel);
        log::trace!("Unregistered {} id {}", M::TYPE, index);
        Ok(item)
    }

    pub fn contains(&self, id: Id<M>) -> bool {
        self.get(id, |_| ()).is_ok()
    }

    /// Number of currently live (registered, not yet unregistered) entries.
    pub fn count(&self) -> u64 {
        self.live_count.load(Ordering::Acquire)
    }

    /// Visit every live entry in index order. Stops early if `f` returns
    /// `false`.
    pub fn for_each(&self, mut f: impl FnMut(Id<M>, &T) -> bool) {
        let storage = self.storage.read();
        for (index, slot) in storage.slots.iter().enumerate() {
            let slot = slot.lock();
            if let SlotStatus::Occupied(epoch, item) = &*slot {
                if !f(Id::zip(index as u32, *epoch), item) {
                    break;
                }
            }
        }
    }

    /// Test hook: empty the storage. Does **not** recycle indices or reset
    /// the epoch sequence (`spec.md` §9 open question) — the next
    /// `register()` still continues from wherever the allocator was. Every
    /// slot is forced back to `Vacant`, so any id issued before the call,
    /// live or already freed, resolves to `NotFound` afterward rather than
    /// `EpochMismatch`. This is a test-only operation; production code
    /// should not rely on it.
    pub fn clear(&self) {
        let storage = self.storage.read();
        for slot in &storage.slots {
            let mut slot = slot.lock();
            *slot = SlotStatus::Vacant;
        }
        self.live_count.store(0, Ordering::Release);
    }
}

impl<T, M: Marker> Default for Registry<T, M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Buffer as BufferMarker;

    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    struct R {
        a: u32,
    }

    #[test]
    fn id_reuse_roundtrip() {
        let reg: Registry<R, BufferMarker> = Registry::new();
        let id1 = reg.register(R { a: 1 });
        assert_eq!(id1.unzip(), (0, 1));

        reg.unregister(id1).unwrap();

        let id2 = reg.register(R { a: 2 });
        assert_eq!(id2.unzip(), (0, 2));

        assert_eq!(
            reg.get(id1, |_| ()).unwrap_err(),
            InvalidId::EpochMismatch {
                index: 0,
                stored: 2,
                requested: 1
            }
        );
        assert_eq!(reg.get(id2, |r| r.a).unwrap(), 2);
    }

    #[test]
    fn use_after_free_is_epoch_mismatch_not_notfound() {
        let reg: Registry<R, BufferMarker> = Registry::new();
        let id = reg.register(R { a: 7 });
        reg.unregister(id).unwrap();
        // Same epoch as when freed: still must be EpochMismatch, never
        // NotFound, never success.
        let err = reg.get(id, |_| ()).unwrap_err();
        assert!(matches!(err, InvalidId::EpochMismatch { .. }));
    }

    #[test]
    fn epoch_monotonicity_across_many_cycles() {
        let reg: Registry<R, BufferMarker> = Registry::new();
        let mut last_epoch = 0;
        for i in 0..50 {
            let id = reg.register(R { a: i });
            let (index, epoch) = id.unzip();
            assert_eq!(index, 0);
            assert!(epoch > last_epoch);
            last_epoch = epoch;
            reg.unregister(id).unwrap();
        }
    }

    #[test]
    fn invalid_id_is_zero() {
        let reg: Registry<R, BufferMarker> = Registry::new();
        assert_eq!(reg.get(Id::zip(0, 0), |_| ()).unwrap_err(), InvalidId::InvalidId);
    }

    #[test]
    fn not_found_out_of_range() {
        let reg: Registry<R, BufferMarker> = Registry::new();
        assert_eq!(
            reg.get(Id::zip(999, 1), |_| ()).unwrap_err(),
            InvalidId::NotFound { index: 999 }
        );
    }

    #[test]
    fn count_and_for_each() {
        let reg: Registry<R, BufferMarker> = Registry::new();
        let ids: Vec<_> = (0..5).map(|i| reg.register(R { a: i })).collect();
        assert_eq!(reg.count(), 5);
        reg.unregister(ids[2]).unwrap();
        assert_eq!(reg.count(), 4);

        let mut seen = Vec::new();
        reg.for_each(|id, item| {
            seen.push((id, item.a));
            true
        });
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn clear_empties_without_recycling() {
        let reg: Registry<R, BufferMarker> = Registry::new();
        let id1 = reg.register(R { a: 1 });
        reg.clear();
        assert_eq!(reg.count(), 0);
        assert!(reg.get(id1, |_| ()).is_err());
        // Allocator state was not reset: the next index keeps climbing
        // rather than restarting from 0.
        let id2 = reg.register(R { a: 2 });
        assert_ne!(id2.unzip().0, 0);
    }

    #[test]
    fn storage_never_shrinks_and_grows_past_min() {
        let reg: Registry<R, BufferMarker> = Registry::new();
        for i in 0..200 {
            reg.register(R { a: i });
        }
        assert_eq!(reg.count(), 200);
    }
}
