//! Keyed cache of lazily built resources.
//!
//! How an entry is built is left to an [`EntryBuilder`]: either a closure or a
//! dedicated strategy type when building needs its own state.

use std::collections::BTreeMap;

pub trait EntryBuilder<K, V> {
    type Error;

    fn build(&mut self, key: &K) -> Result<V, Self::Error>;
}

impl<K, V, E, F> EntryBuilder<K, V> for F
where
    F: FnMut(&K) -> Result<V, E>,
{
    type Error = E;

    fn build(&mut self, key: &K) -> Result<V, E> {
        self(key)
    }
}

pub struct Cache<K, V, B> {
    entries: BTreeMap<K, V>,
    builder: B,
}

impl<K, V, B> Cache<K, V, B>
where
    K: Ord + Clone,
    V: Clone,
    B: EntryBuilder<K, V>,
{
    pub fn new(builder: B) -> Self {
        Self {
            entries: BTreeMap::new(),
            builder,
        }
    }

    /// Returns the cached entry, building it on first request. A failed build
    /// is not remembered, the next request tries again.
    pub fn get(&mut self, key: &K) -> Result<V, B::Error> {
        if let Some(value) = self.entries.get(key) {
            return Ok(value.clone());
        }
        let value = self.builder.build(key)?;
        self.entries.insert(key.clone(), value.clone());
        Ok(value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
