/*! Resource-and-command core for a WebGPU-style graphics stack.
 *
 *  This crate sits between a public graphics API and a hardware abstraction
 *  layer (HAL): it turns user requests ("create buffer", "begin render
 *  pass", "submit commands") into validated, lifetime-safe operations
 *  against a HAL whose handles are opaque and must be destroyed in a
 *  specific order.
 *
 *  The HAL itself, windowing, shader compilation and pipeline-layout
 *  inference are external collaborators: this crate only calls into them
 *  through the capability traits in [`hal`].
 */

#![allow(
    // Explicit lifetimes are often easier to reason about.
    clippy::needless_lifetimes,
    // No need for defaults in the internal types.
    clippy::new_without_default,
    clippy::too_many_arguments,
)]
#![warn(trivial_casts, trivial_numeric_casts, unused_extern_crates)]

pub mod backend;
pub mod command;
pub mod device;
pub mod error;
pub mod error_scope;
pub mod global;
pub mod hal;
pub mod hub;
pub mod id;
mod init_tracker;
pub mod instance;
pub mod leak;
pub mod queue;
pub mod registry;
pub mod resource;
pub mod snatch;

pub use init_tracker::InitTracker;

use std::borrow::Cow;

/// A generation counter for an index; invalidates stale ids.
pub(crate) type Epoch = u32;
/// The dense-array index half of an [`id::RawId`].
pub(crate) type Index = u32;

/// An optional, possibly-borrowed label attached to a descriptor.
///
/// Mirrors the teacher crate's `Label<'a>` alias: almost every creation
/// descriptor in this core carries one of these, and it is cloned into the
/// resulting resource object for use in diagnostics.
pub type Label<'a> = Option<Cow<'a, str>>;

pub(crate) trait LabelHelpers<'a> {
    fn borrow_option(&'a self) -> Option<&'a str>;
    fn borrow_or_default(&'a self) -> &'a str;
}

impl<'a> LabelHelpers<'a> for Label<'a> {
    fn borrow_option(&'a self) -> Option<&'a str> {
        self.as_ref().map(|cow| cow.as_ref())
    }

    fn borrow_or_default(&'a self) -> &'a str {
        self.borrow_option().unwrap_or_default()
    }
}

/// Fast hash map used internally for identity/leak bookkeeping.
pub(crate) type FastHashMap<K, V> =
    std::collections::HashMap<K, V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

/// Round `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two; this is only ever used internally
/// with the small fixed alignments named in `spec.md` (buffer size to 4,
/// init-tracker chunks to [`init_tracker::CHUNK_SIZE`]).
pub(crate) fn round_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

#[test]
fn test_round_up() {
    assert_eq!(round_up(0, 4), 0);
    assert_eq!(round_up(1, 4), 4);
    assert_eq!(round_up(4, 4), 4);
    assert_eq!(round_up(5, 4), 8);
}
