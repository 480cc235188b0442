//! Size-limited LRU cache (§4.6), grounded on
//! `original_source/cache/sizecache.h`'s `SizeCache<K, V>`: eviction is
//! driven by total stored size rather than entry count, so callers cache
//! variable-sized values (tiles, DEM chunks) behind one `upper_limit`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

/// Values stored in a [`SizeCache`] report their own weight.
pub trait Sized2 {
  fn size(&self) -> usize;
}

/// LRU cache bounded by total `size()` of its values, not entry count.
/// Usage order is a plain `Vec` acting as a most-recently-used-first list,
/// matching the teacher-scale of this crate; a binary heap or intrusive
/// list would pay for itself only at far larger cache populations than
/// this crate's tile/DEM-chunk workloads reach.
#[derive(Debug)]
pub struct SizeCache<K, V> {
  upper_limit: usize,
  current_size: usize,
  storage: HashMap<K, V>,
  /// Most-recently-used first.
  usage: Vec<K>,
}

impl<K: Eq + Hash + Clone, V: Sized2> SizeCache<K, V> {
  #[must_use]
  pub fn new(upper_limit: usize) -> Self {
    Self { upper_limit, current_size: 0, storage: HashMap::new(), usage: Vec::new() }
  }

  #[must_use]
  pub fn count(&self) -> usize {
    self.storage.len()
  }

  #[must_use]
  pub fn size_total(&self) -> usize {
    self.upper_limit
  }

  #[must_use]
  pub fn size_used(&self) -> usize {
    self.current_size
  }

  #[must_use]
  pub fn contains(&self, key: &K) -> bool {
    self.storage.contains_key(key)
  }

  /// Inserts `value`, evicting least-recently-used entries until it fits,
  /// then marks it most-recently-used. Replaces any existing entry for
  /// `key` first.
  pub fn add(&mut self, key: K, value: V) {
    if self.storage.contains_key(&key) {
      self.erase(&key);
    }
    let size = value.size();
    while !self.storage.is_empty() && self.current_size + size > self.upper_limit {
      let Some(lru) = self.usage.pop() else { break };
      if let Some(v) = self.storage.remove(&lru) {
        self.current_size -= v.size();
      }
    }
    self.current_size += size;
    self.storage.insert(key.clone(), value);
    self.touch(&key);
  }

  /// Returns the stored value for `key`, marking it most-recently-used.
  pub fn get(&mut self, key: &K) -> Option<&V> {
    if self.storage.contains_key(key) {
      self.touch(key);
    }
    self.storage.get(key)
  }

  pub fn erase(&mut self, key: &K) {
    if let Some(v) = self.storage.remove(key) {
      self.current_size -= v.size();
      self.usage.retain(|k| k != key);
    }
  }

  pub fn clear(&mut self) {
    self.storage.clear();
    self.usage.clear();
    self.current_size = 0;
  }

  fn touch(&mut self, key: &K) {
    self.usage.retain(|k| k != key);
    self.usage.insert(0, key.clone());
  }
}

/// Mutex-guarded [`SizeCache`] for callers shared across threads (the DEM
/// reader, §5: "intentionally per-instance, not process-global").
#[derive(Debug)]
pub struct SharedSizeCache<K, V> {
  inner: Mutex<SizeCache<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Sized2> SharedSizeCache<K, V> {
  #[must_use]
  pub fn new(upper_limit: usize) -> Self {
    Self { inner: Mutex::new(SizeCache::new(upper_limit)) }
  }

  pub fn lock(&self) -> MutexGuard<'_, SizeCache<K, V>> {
    self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Clone)]
  struct Blob(usize);

  impl Sized2 for Blob {
    fn size(&self) -> usize {
      self.0
    }
  }

  #[test]
  fn add_evicts_least_recently_used_to_fit() {
    let mut cache: SizeCache<&str, Blob> = SizeCache::new(10);
    cache.add("a", Blob(4));
    cache.add("b", Blob(4));
    cache.add("c", Blob(4));
    assert!(!cache.contains(&"a"));
    assert!(cache.contains(&"b"));
    assert!(cache.contains(&"c"));
    assert!(cache.size_used() <= 10);
  }

  #[test]
  fn get_marks_entry_most_recently_used() {
    let mut cache: SizeCache<&str, Blob> = SizeCache::new(10);
    cache.add("a", Blob(4));
    cache.add("b", Blob(4));
    cache.get(&"a");
    cache.add("c", Blob(4));
    assert!(cache.contains(&"a"));
    assert!(!cache.contains(&"b"));
  }

  #[test]
  fn replacing_a_key_updates_its_size() {
    let mut cache: SizeCache<&str, Blob> = SizeCache::new(10);
    cache.add("a", Blob(8));
    cache.add("a", Blob(2));
    assert_eq!(cache.size_used(), 2);
  }

  #[test]
  fn erase_and_clear() {
    let mut cache: SizeCache<&str, Blob> = SizeCache::new(10);
    cache.add("a", Blob(4));
    cache.erase(&"a");
    assert!(!cache.contains(&"a"));
    cache.add("b", Blob(4));
    cache.clear();
    assert_eq!(cache.count(), 0);
    assert_eq!(cache.size_used(), 0);
  }

  #[test]
  fn shared_cache_is_usable_behind_a_mutex() {
    let shared: SharedSizeCache<&str, Blob> = SharedSizeCache::new(10);
    shared.lock().add("a", Blob(4));
    assert!(shared.lock().contains(&"a"));
  }
}
