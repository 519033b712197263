//! A hash set with unique values, backed by [`SlotTable`].
//!
//! Inserting a value that is already present is a no-op; every chain in
//! the underlying table has length one.

use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::DefaultHashBuilder;
use crate::slot_table;
use crate::slot_table::Entry as TableEntry;
use crate::slot_table::SlotTable;

/// A hash set storing each value at most once.
///
/// Like [`HashMap`](crate::HashMap), this is a policy layer over
/// [`SlotTable`]: the set hashes values itself and hands the table an
/// equality closure. Duplicate inserts are rejected rather than chained.
///
/// # Examples
///
/// ```rust
/// # #[cfg(feature = "foldhash")]
/// # {
/// use chain_hash::HashSet;
///
/// let mut set = HashSet::new();
/// assert!(set.insert("a"));
/// assert!(!set.insert("a"));
///
/// assert!(set.contains(&"a"));
/// assert_eq!(set.len(), 1);
/// # }
/// ```
pub struct HashSet<T, S = DefaultHashBuilder> {
    table: SlotTable<T>,
    hash_builder: S,
}

#[cfg(feature = "foldhash")]
impl<T> HashSet<T, DefaultHashBuilder> {
    /// Creates an empty set with the default hasher.
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    /// Creates an empty set with space for at least `capacity` slots and
    /// the default hasher.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<T, S> HashSet<T, S> {
    /// Creates an empty set that hashes with `hash_builder`.
    pub fn with_hasher(hash_builder: S) -> Self {
        HashSet {
            table: SlotTable::new(),
            hash_builder,
        }
    }

    /// Creates an empty set with space for at least `capacity` slots,
    /// hashing with `hash_builder`.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        HashSet {
            table: SlotTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Returns a reference to the set's hasher.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the number of values in the set.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set contains no values.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the slot count of the backing table. The set rehashes once
    /// its length reaches 3/4 of this.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes every value and resets the backing table to its minimum
    /// capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Returns an iterator over the set's values in arbitrary order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Removes and yields every value, resetting the backing table to its
    /// minimum capacity.
    pub fn drain(&mut self) -> Drain<T> {
        Drain {
            inner: self.table.drain(),
        }
    }
}

impl<T, S> HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Rehashes up front so that `additional` more values fit without
    /// another rehash.
    pub fn reserve(&mut self, additional: usize) {
        self.table.reserve(additional);
    }

    /// Adds a value to the set.
    ///
    /// Returns `true` if the value was not already present. A duplicate
    /// insert leaves the stored value untouched.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(feature = "foldhash")]
    /// # {
    /// use chain_hash::HashSet;
    ///
    /// let mut set = HashSet::new();
    /// assert!(set.insert(3));
    /// assert!(!set.insert(3));
    /// assert_eq!(set.len(), 1);
    /// # }
    /// ```
    pub fn insert(&mut self, value: T) -> bool {
        let hash = self.hash_builder.hash_one(&value);
        match self.table.entry(hash, |v| v == &value) {
            TableEntry::Occupied(_) => false,
            TableEntry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        }
    }

    /// Returns `true` if the set contains `value`.
    pub fn contains(&self, value: &T) -> bool {
        self.get(value).is_some()
    }

    /// Returns a reference to the stored value equal to `value`, if any.
    pub fn get(&self, value: &T) -> Option<&T> {
        let hash = self.hash_builder.hash_one(value);
        self.table.find(hash, |v| v == value)
    }

    /// Removes `value` from the set. Returns `true` if it was present.
    /// The vacated slot becomes a tombstone; the table never shrinks.
    pub fn remove(&mut self, value: &T) -> bool {
        self.take(value).is_some()
    }

    /// Removes and returns the stored value equal to `value`, if any.
    pub fn take(&mut self, value: &T) -> Option<T> {
        let hash = self.hash_builder.hash_one(value);
        self.table.remove(hash, |v| v == value)
    }
}

impl<T, S> Default for HashSet<T, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<T, S> Clone for HashSet<T, S>
where
    T: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        HashSet {
            table: self.table.clone(),
            hash_builder: self.hash_builder.clone(),
        }
    }
}

impl<T, S> Debug for HashSet<T, S>
where
    T: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T, S> PartialEq for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|v| other.contains(v))
    }
}

impl<T, S> Eq for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
}

impl<T, S> Extend<T> for HashSet<T, S>
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

impl<T, S> FromIterator<T> for HashSet<T, S>
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

/// An iterator over a set's values.
///
/// Created by [`HashSet::iter`].
pub struct Iter<'a, T> {
    inner: slot_table::Iter<'a, T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// A draining iterator over a set's values.
///
/// Created by [`HashSet::drain`]. The set is already empty; dropping the
/// iterator discards any values not yet yielded.
pub struct Drain<T> {
    inner: slot_table::Drain<T>,
}

impl<T> Iterator for Drain<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// An owning iterator over a set's values.
///
/// Created by [`HashSet::into_iter`].
pub struct IntoIter<T> {
    inner: slot_table::Drain<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl<T, S> IntoIterator for HashSet<T, S> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(mut self) -> IntoIter<T> {
        IntoIter {
            inner: self.table.drain(),
        }
    }
}

impl<'a, T, S> IntoIterator for &'a HashSet<T, S> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}
