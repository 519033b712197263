//! A hash multimap, backed by [`SlotTable`].
//!
//! One key may map to several values. All pairs sharing a key hang off a
//! single table slot, so looking up a key finds every value for it with
//! one probe, and iteration yields a key's values back to back.

use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::DefaultHashBuilder;
use crate::slot_table;
use crate::slot_table::Entry as TableEntry;
use crate::slot_table::SlotTable;

/// A hash map storing any number of values per key.
///
/// Each stored pair keeps its own copy of the key; pairs with equal keys
/// chain off one slot in insertion order. [`get`](HashMultiMap::get)
/// returns the first value inserted for a key,
/// [`get_all`](HashMultiMap::get_all) returns them all.
///
/// # Examples
///
/// ```rust
/// # #[cfg(feature = "foldhash")]
/// # {
/// use chain_hash::HashMultiMap;
///
/// let mut index = HashMultiMap::new();
/// index.insert("fruit", "apple");
/// index.insert("fruit", "pear");
/// index.insert("root", "beet");
///
/// assert_eq!(index.len(), 3);
/// assert_eq!(index.get(&"fruit"), Some(&"apple"));
///
/// let fruit: Vec<&&str> = index.get_all(&"fruit").collect();
/// assert_eq!(fruit, vec![&"apple", &"pear"]);
/// # }
/// ```
pub struct HashMultiMap<K, V, S = DefaultHashBuilder> {
    table: SlotTable<(K, V)>,
    hash_builder: S,
}

#[cfg(feature = "foldhash")]
impl<K, V> HashMultiMap<K, V, DefaultHashBuilder> {
    /// Creates an empty multimap with the default hasher.
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    /// Creates an empty multimap with space for at least `capacity`
    /// slots and the default hasher.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S> HashMultiMap<K, V, S> {
    /// Creates an empty multimap that hashes with `hash_builder`.
    pub fn with_hasher(hash_builder: S) -> Self {
        HashMultiMap {
            table: SlotTable::new(),
            hash_builder,
        }
    }

    /// Creates an empty multimap with space for at least `capacity`
    /// slots, hashing with `hash_builder`.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        HashMultiMap {
            table: SlotTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Returns a reference to the multimap's hasher.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the total number of stored pairs, counting every value of
    /// a repeated key.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the multimap contains no pairs.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the slot count of the backing table. The multimap
    /// rehashes once its length (all pairs counted) reaches 3/4 of this.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes every pair and resets the backing table to its minimum
    /// capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Returns an iterator over every stored pair. Pairs sharing a key
    /// are always yielded consecutively, in insertion order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the multimap's keys, one per stored
    /// pair. A key with three values appears three times.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the multimap's values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Removes and yields every pair, resetting the backing table to its
    /// minimum capacity.
    pub fn drain(&mut self) -> Drain<K, V> {
        Drain {
            inner: self.table.drain(),
        }
    }
}

impl<K, V, S> HashMultiMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Rehashes up front so that `additional` more pairs fit without
    /// another rehash.
    pub fn reserve(&mut self, additional: usize) {
        self.table.reserve(additional);
    }

    /// Inserts a key-value pair.
    ///
    /// Nothing is replaced: a repeated key appends the new value after
    /// the existing ones. Either way the insert counts against the load
    /// factor.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(feature = "foldhash")]
    /// # {
    /// use chain_hash::HashMultiMap;
    ///
    /// let mut map = HashMultiMap::new();
    /// map.insert(1, "a");
    /// map.insert(1, "b");
    /// assert_eq!(map.count_key(&1), 2);
    /// # }
    /// ```
    pub fn insert(&mut self, key: K, value: V) {
        let hash = self.hash_builder.hash_one(&key);
        match self.table.entry(hash, |(k, _)| k == &key) {
            TableEntry::Occupied(entry) => {
                entry.append((key, value));
            }
            TableEntry::Vacant(entry) => {
                entry.insert((key, value));
            }
        }
    }

    /// Returns a reference to the first value inserted for `key`, if any.
    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = self.hash_builder.hash_one(key);
        self.table.find(hash, |(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns a mutable reference to the first value inserted for
    /// `key`, if any.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let hash = self.hash_builder.hash_one(key);
        self.table.find_mut(hash, |(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns an iterator over every value stored for `key`, in
    /// insertion order. Empty if the key is absent.
    pub fn get_all(&self, key: &K) -> ValuesForKey<'_, K, V> {
        let hash = self.hash_builder.hash_one(key);
        ValuesForKey {
            inner: self.table.find_all(hash, |(k, _)| k == key),
        }
    }

    /// Returns the number of values stored for `key`.
    pub fn count_key(&self, key: &K) -> usize {
        self.get_all(key).count()
    }

    /// Returns `true` if at least one value is stored for `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Removes the first value inserted for `key`, returning it if any
    /// was stored. Remaining values stay in place and keep their order.
    pub fn remove_one(&mut self, key: &K) -> Option<V> {
        let hash = self.hash_builder.hash_one(key);
        self.table.remove(hash, |(k, _)| k == key).map(|(_, v)| v)
    }

    /// Removes every value stored for `key`, returning how many were
    /// removed. The vacated slot becomes a tombstone; the table never
    /// shrinks.
    pub fn remove_all(&mut self, key: &K) -> usize {
        let hash = self.hash_builder.hash_one(key);
        self.table.remove_all(hash, |(k, _)| k == key)
    }
}

impl<K, V, S> Default for HashMultiMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> Clone for HashMultiMap<K, V, S>
where
    K: Clone,
    V: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        HashMultiMap {
            table: self.table.clone(),
            hash_builder: self.hash_builder.clone(),
        }
    }
}

impl<K, V, S> Debug for HashMultiMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> Extend<(K, V)> for HashMultiMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for HashMultiMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::with_hasher(S::default());
        map.extend(iter);
        map
    }
}

/// An iterator over the values stored for one key.
///
/// Created by [`HashMultiMap::get_all`].
pub struct ValuesForKey<'a, K, V> {
    inner: slot_table::ChainIter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for ValuesForKey<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}

/// An iterator over a multimap's key-value pairs.
///
/// Created by [`HashMultiMap::iter`].
pub struct Iter<'a, K, V> {
    inner: slot_table::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k, v))
    }
}

/// An iterator over a multimap's keys, one per stored pair.
///
/// Created by [`HashMultiMap::keys`].
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }
}

/// An iterator over a multimap's values.
///
/// Created by [`HashMultiMap::values`].
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}

/// A draining iterator over a multimap's pairs.
///
/// Created by [`HashMultiMap::drain`]. The multimap is already empty;
/// dropping the iterator discards any pairs not yet yielded.
pub struct Drain<K, V> {
    inner: slot_table::Drain<(K, V)>,
}

impl<K, V> Iterator for Drain<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// An owning iterator over a multimap's pairs.
///
/// Created by [`HashMultiMap::into_iter`].
pub struct IntoIter<K, V> {
    inner: slot_table::Drain<(K, V)>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl<K, V, S> IntoIterator for HashMultiMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(mut self) -> IntoIter<K, V> {
        IntoIter {
            inner: self.table.drain(),
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a HashMultiMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use core::hash::BuildHasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;

    struct SipHashBuilder {
        k1: u64,
        k2: u64,
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k1: rng.try_next_u64().unwrap_or(0xDEAD),
                k2: rng.try_next_u64().unwrap_or(0xBEEF),
            }
        }
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k1, self.k2)
        }
    }

    type TestMultiMap<K, V> = HashMultiMap<K, V, SipHashBuilder>;

    #[test]
    fn repeated_keys_keep_every_value() {
        let mut map: TestMultiMap<u64, &str> = HashMultiMap::with_hasher(SipHashBuilder::default());

        map.insert(1, "a");
        map.insert(2, "b");
        map.insert(1, "c");

        assert_eq!(map.len(), 3);
        assert_eq!(map.count_key(&1), 2);
        assert_eq!(map.count_key(&2), 1);
        assert_eq!(map.count_key(&3), 0);
    }

    #[test]
    fn get_returns_the_first_inserted_value() {
        let mut map: TestMultiMap<u64, u32> = HashMultiMap::with_hasher(SipHashBuilder::default());

        map.insert(5, 100);
        map.insert(5, 200);
        map.insert(5, 300);

        assert_eq!(map.get(&5), Some(&100));

        let values: Vec<u32> = map.get_all(&5).copied().collect();
        assert_eq!(values, vec![100, 200, 300]);
    }

    #[test]
    fn get_mut_touches_the_first_value() {
        let mut map: TestMultiMap<u64, u32> = HashMultiMap::with_hasher(SipHashBuilder::default());
        map.insert(5, 1);
        map.insert(5, 2);

        if let Some(value) = map.get_mut(&5) {
            *value += 10;
        }

        let values: Vec<u32> = map.get_all(&5).copied().collect();
        assert_eq!(values, vec![11, 2]);
    }

    #[test]
    fn remove_one_preserves_order_of_the_rest() {
        let mut map: TestMultiMap<u64, u32> = HashMultiMap::with_hasher(SipHashBuilder::default());
        for value in [10, 20, 30] {
            map.insert(1, value);
        }

        assert_eq!(map.remove_one(&1), Some(10));
        let values: Vec<u32> = map.get_all(&1).copied().collect();
        assert_eq!(values, vec![20, 30]);

        assert_eq!(map.remove_one(&1), Some(20));
        assert_eq!(map.remove_one(&1), Some(30));
        assert_eq!(map.remove_one(&1), None);
        assert!(map.is_empty());
    }

    #[test]
    fn remove_all_reports_the_count() {
        let mut map: TestMultiMap<u64, u32> = HashMultiMap::with_hasher(SipHashBuilder::default());
        for value in 0..4 {
            map.insert(9, value);
        }
        map.insert(10, 0);

        assert_eq!(map.remove_all(&9), 4);
        assert_eq!(map.len(), 1);
        assert_eq!(map.remove_all(&9), 0);
        assert!(map.contains_key(&10));
    }

    #[test]
    fn pairs_sharing_a_key_iterate_together() {
        let mut map: TestMultiMap<u64, u32> = HashMultiMap::with_hasher(SipHashBuilder::default());
        for key in 0..20 {
            map.insert(key, 0);
        }
        for stamp in 1..4 {
            map.insert(7, stamp);
        }

        let pairs: Vec<(u64, u32)> = map.iter().map(|(&k, &v)| (k, v)).collect();
        let positions: Vec<usize> = pairs
            .iter()
            .enumerate()
            .filter(|(_, &(k, _))| k == 7)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(positions.len(), 4);
        for window in positions.windows(2) {
            assert_eq!(window[1], window[0] + 1);
        }

        let stamps: Vec<u32> = pairs.iter().filter(|&&(k, _)| k == 7).map(|&(_, s)| s).collect();
        assert_eq!(stamps, vec![0, 1, 2, 3]);
    }

    #[test]
    fn keys_and_values_cover_every_pair() {
        let mut map: TestMultiMap<u64, u32> = HashMultiMap::with_hasher(SipHashBuilder::default());
        map.insert(1, 10);
        map.insert(1, 11);
        map.insert(2, 20);

        assert_eq!(map.keys().count(), 3);
        assert_eq!(map.keys().filter(|&&k| k == 1).count(), 2);

        let mut values: Vec<u32> = map.values().copied().collect();
        values.sort_unstable();
        assert_eq!(values, vec![10, 11, 20]);
    }

    #[test]
    fn growth_keeps_chains_intact() {
        let mut map: TestMultiMap<u64, u32> = HashMultiMap::with_hasher(SipHashBuilder::default());
        for stamp in 0..5 {
            map.insert(3, stamp);
        }
        for key in 100..200 {
            map.insert(key, 0);
            let values: Vec<u32> = map.get_all(&3).copied().collect();
            assert_eq!(values, vec![0, 1, 2, 3, 4]);
        }
        assert!(map.capacity() >= 128);
    }

    #[test]
    fn drain_and_clear() {
        let mut map: TestMultiMap<u64, u32> = HashMultiMap::with_hasher(SipHashBuilder::default());
        for key in 0..30 {
            map.insert(key % 6, key as u32);
        }

        let drained: Vec<(u64, u32)> = map.drain().collect();
        assert_eq!(drained.len(), 30);
        assert!(map.is_empty());
        assert_eq!(map.capacity(), 16);

        for key in 0..30 {
            map.insert(key % 6, key as u32);
        }
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.capacity(), 16);
    }

    #[test]
    fn from_iter_keeps_duplicates() {
        let map: TestMultiMap<u64, u32> = [(1, 10), (1, 11), (2, 20)].into_iter().collect();
        assert_eq!(map.len(), 3);
        assert_eq!(map.count_key(&1), 2);
    }
}
