//! Bounded in-process cache with optional expiry.
//!
//! The store keeps read-through caches in front of the database for device
//! lookups, link lookups and reports. Entries are only ever written after the
//! data behind them has been committed, and a miss is never cached.

use std::{
  borrow::Borrow,
  hash::Hash,
  num::NonZeroUsize,
  sync::{Mutex, MutexGuard, PoisonError},
  time::{Duration, Instant},
};

use lru::LruCache;

struct Entry<V> {
  value:     V,
  stored_at: Instant,
}

/// An LRU cache whose entries optionally expire `ttl` after insertion.
pub struct Cache<K: Hash + Eq, V> {
  entries: Mutex<LruCache<K, Entry<V>>>,
  ttl:     Option<Duration>,
}

impl<K: Hash + Eq, V: Clone> Cache<K, V> {
  /// A capacity of zero is treated as one.
  pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
    let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
    Self { entries: Mutex::new(LruCache::new(capacity)), ttl }
  }

  fn lock(&self) -> MutexGuard<'_, LruCache<K, Entry<V>>> {
    // The cache holds no invariants a panicking holder could break.
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn is_fresh(&self, entry: &Entry<V>) -> bool {
    self.ttl.is_none_or(|ttl| entry.stored_at.elapsed() < ttl)
  }

  pub fn get<Q>(&self, key: &Q) -> Option<V>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let mut entries = self.lock();
    match entries.get(key) {
      Some(entry) if self.is_fresh(entry) => return Some(entry.value.clone()),
      Some(_) => {}
      None => return None,
    }
    entries.pop(key);
    None
  }

  pub fn insert(&self, key: K, value: V) {
    self.lock().put(key, Entry { value, stored_at: Instant::now() });
  }

  pub fn clear(&self) { self.lock().clear(); }

  pub fn len(&self) -> usize { self.lock().len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Return the cached value or run `load`, caching what it finds.
  ///
  /// `Ok(None)` from the loader is passed through without being stored.
  pub fn get_or_try_load<E>(
    &self,
    key: K,
    load: impl FnOnce() -> Result<Option<V>, E>,
  ) -> Result<Option<V>, E> {
    if let Some(hit) = self.get(&key) {
      return Ok(Some(hit));
    }
    let loaded = load()?;
    if let Some(value) = &loaded {
      self.insert(key, value.clone());
    }
    Ok(loaded)
  }
}
