//! A hash multiset, backed by [`SlotTable`].
//!
//! Duplicate values are welcome: each distinct value owns one table slot,
//! and further copies chain off that slot. Equal values therefore always
//! sit together, both in storage and during iteration.

use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::DefaultHashBuilder;
use crate::slot_table;
use crate::slot_table::Entry as TableEntry;
use crate::slot_table::SlotTable;

/// A hash set storing each value any number of times.
///
/// The multiset shares its probing machinery with [`HashSet`]
/// (crate::HashSet); only the insert policy differs. A duplicate insert
/// appends to the existing value's chain instead of being rejected, so
/// the number of occupied slots tracks distinct values while
/// [`len`](HashMultiSet::len) tracks total copies.
///
/// # Examples
///
/// ```rust
/// # #[cfg(feature = "foldhash")]
/// # {
/// use chain_hash::HashMultiSet;
///
/// let mut bag = HashMultiSet::new();
/// bag.insert("a");
/// bag.insert("b");
/// bag.insert("a");
///
/// assert_eq!(bag.len(), 3);
/// assert_eq!(bag.count(&"a"), 2);
/// assert_eq!(bag.count(&"c"), 0);
/// # }
/// ```
pub struct HashMultiSet<T, S = DefaultHashBuilder> {
    table: SlotTable<T>,
    hash_builder: S,
}

#[cfg(feature = "foldhash")]
impl<T> HashMultiSet<T, DefaultHashBuilder> {
    /// Creates an empty multiset with the default hasher.
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    /// Creates an empty multiset with space for at least `capacity` slots
    /// and the default hasher.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<T, S> HashMultiSet<T, S> {
    /// Creates an empty multiset that hashes with `hash_builder`.
    pub fn with_hasher(hash_builder: S) -> Self {
        HashMultiSet {
            table: SlotTable::new(),
            hash_builder,
        }
    }

    /// Creates an empty multiset with space for at least `capacity`
    /// slots, hashing with `hash_builder`.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        HashMultiSet {
            table: SlotTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Returns a reference to the multiset's hasher.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the total number of stored values, duplicates included.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the multiset contains no values.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the slot count of the backing table. The multiset
    /// rehashes once its length (duplicates included) reaches 3/4 of
    /// this.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes every value and resets the backing table to its minimum
    /// capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Returns an iterator over every stored value, duplicates included.
    /// Copies of the same value are always yielded consecutively, in
    /// insertion order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Removes and yields every value, resetting the backing table to
    /// its minimum capacity.
    pub fn drain(&mut self) -> Drain<T> {
        Drain {
            inner: self.table.drain(),
        }
    }
}

impl<T, S> HashMultiSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Rehashes up front so that `additional` more values fit without
    /// another rehash.
    pub fn reserve(&mut self, additional: usize) {
        self.table.reserve(additional);
    }

    /// Adds a value to the multiset.
    ///
    /// A first copy claims a slot; further copies append to that slot's
    /// chain. Either way the insert counts against the load factor.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(feature = "foldhash")]
    /// # {
    /// use chain_hash::HashMultiSet;
    ///
    /// let mut bag = HashMultiSet::new();
    /// for value in [5, 21, 5, 37] {
    ///     bag.insert(value);
    /// }
    /// assert_eq!(bag.len(), 4);
    /// assert_eq!(bag.count(&5), 2);
    /// # }
    /// ```
    pub fn insert(&mut self, value: T) {
        let hash = self.hash_builder.hash_one(&value);
        match self.table.entry(hash, |v| v == &value) {
            TableEntry::Occupied(entry) => {
                entry.append(value);
            }
            TableEntry::Vacant(entry) => {
                entry.insert(value);
            }
        }
    }

    /// Returns `true` if at least one copy of `value` is stored.
    pub fn contains(&self, value: &T) -> bool {
        let hash = self.hash_builder.hash_one(value);
        self.table.find(hash, |v| v == value).is_some()
    }

    /// Returns the number of stored copies of `value`.
    pub fn count(&self, value: &T) -> usize {
        self.get_all(value).count()
    }

    /// Returns an iterator over every stored copy of `value`, in
    /// insertion order. Empty if the value is absent.
    pub fn get_all(&self, value: &T) -> ValueChain<'_, T> {
        let hash = self.hash_builder.hash_one(value);
        ValueChain {
            inner: self.table.find_all(hash, |v| v == value),
        }
    }

    /// Removes one copy of `value`, returning it if any was stored.
    /// Remaining copies stay in place.
    pub fn remove_one(&mut self, value: &T) -> Option<T> {
        let hash = self.hash_builder.hash_one(value);
        self.table.remove(hash, |v| v == value)
    }

    /// Removes every copy of `value`, returning how many were stored.
    /// The vacated slot becomes a tombstone; the table never shrinks.
    pub fn remove_all(&mut self, value: &T) -> usize {
        let hash = self.hash_builder.hash_one(value);
        self.table.remove_all(hash, |v| v == value)
    }
}

impl<T, S> Default for HashMultiSet<T, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<T, S> Clone for HashMultiSet<T, S>
where
    T: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        HashMultiSet {
            table: self.table.clone(),
            hash_builder: self.hash_builder.clone(),
        }
    }
}

impl<T, S> Debug for HashMultiSet<T, S>
where
    T: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T, S> PartialEq for HashMultiSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|v| self.count(v) == other.count(v))
    }
}

impl<T, S> Eq for HashMultiSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
}

impl<T, S> Extend<T> for HashMultiSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl<T, S> FromIterator<T> for HashMultiSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::with_hasher(S::default());
        set.extend(iter);
        set
    }
}

/// An iterator over the stored copies of one value.
///
/// Created by [`HashMultiSet::get_all`].
pub struct ValueChain<'a, T> {
    inner: slot_table::ChainIter<'a, T>,
}

impl<'a, T> Iterator for ValueChain<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// An iterator over a multiset's values, duplicates included.
///
/// Created by [`HashMultiSet::iter`].
pub struct Iter<'a, T> {
    inner: slot_table::Iter<'a, T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// A draining iterator over a multiset's values.
///
/// Created by [`HashMultiSet::drain`]. The multiset is already empty;
/// dropping the iterator discards any values not yet yielded.
pub struct Drain<T> {
    inner: slot_table::Drain<T>,
}

impl<T> Iterator for Drain<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// An owning iterator over a multiset's values.
///
/// Created by [`HashMultiSet::into_iter`].
pub struct IntoIter<T> {
    inner: slot_table::Drain<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl<T, S> IntoIterator for HashMultiSet<T, S> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(mut self) -> IntoIter<T> {
        IntoIter {
            inner: self.table.drain(),
        }
    }
}

impl<'a, T, S> IntoIterator for &'a HashMultiSet<T, S> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}
