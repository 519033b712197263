#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// A key-value map with unique keys.
///
/// This module provides a `HashMap` that wraps the `SlotTable` with a
/// replace-on-collision insert policy and a standard entry API.
pub mod hash_map;

/// A key-value map allowing repeated keys.
///
/// This module provides a `HashMultiMap` that wraps the `SlotTable` with
/// an append-on-collision insert policy: all values for a key chain off
/// one slot and come back in insertion order.
pub mod multi_map;

/// A set allowing repeated values.
///
/// This module provides a `HashMultiSet` that wraps the `SlotTable` and
/// counts duplicate copies of a value instead of rejecting them.
pub mod multi_set;

/// A set with unique values.
///
/// This module provides a `HashSet` that wraps the `SlotTable` with a
/// reject-on-collision insert policy.
pub mod hash_set;

pub mod slot_table;

/// Default hasher builder for the container types, backed by foldhash.
#[cfg(feature = "foldhash")]
pub type DefaultHashBuilder = foldhash::fast::RandomState;

/// Placeholder for the default hasher builder.
///
/// The `foldhash` feature is disabled, so this type is uninhabited and
/// the containers must be constructed with an explicit [`BuildHasher`]
/// via their `with_hasher` constructors.
///
/// [`BuildHasher`]: core::hash::BuildHasher
#[cfg(not(feature = "foldhash"))]
#[derive(Clone, Copy, Debug)]
pub enum DefaultHashBuilder {}

pub use hash_map::Entry;
pub use hash_map::HashMap;
pub use hash_set::HashSet;
pub use multi_map::HashMultiMap;
pub use multi_set::HashMultiSet;
pub use slot_table::SlotTable;
