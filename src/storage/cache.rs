//! TTL Cache with Lazy Expiry
//!
//! A small key/value store used by add-ons that want to memoize slow
//! lookups (a REST call, a scraped page).
//!
//! ## Expiry
//!
//! Every `set` records the time of the write. A read compares the entry's
//! age with the configured window and treats an entry whose age is greater
//! than or equal to the window as absent. Nothing runs in the background:
//! stale entries stay in memory until [`TtlCache::refresh`] drops them all.
//!
//! ## Tombstones
//!
//! `retire` does not remove the key. It overwrites the entry with a
//! tombstone (no value, no timestamp), which reads exactly like an expired
//! entry. A later `set` on the same key replaces the tombstone.
//!
//! The cache does no locking of its own. Share it behind a lock.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// The contract an add-on expects from a memoizing cache.
pub trait Cache<K, V> {
    /// Returns the live value for `key`, or `None` if absent, retired or expired.
    fn get(&self, key: &K) -> Option<V>;

    /// Stores `value` under `key`, stamped with the current time.
    fn set(&mut self, key: K, value: V);

    /// Replaces the entry for `key` with a tombstone.
    fn retire(&mut self, key: K);

    /// Drops every entry, tombstones included.
    fn refresh(&mut self);
}

/// A stored value and the time it was written.
///
/// `stored_at == None` marks a tombstone.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: Option<V>,
    stored_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn live(value: V) -> Self {
        Self {
            value: Some(value),
            stored_at: Some(Instant::now()),
        }
    }

    fn tombstone() -> Self {
        Self {
            value: None,
            stored_at: None,
        }
    }

    #[inline]
    fn is_expired(&self, expiry: Duration) -> bool {
        match self.stored_at {
            Some(at) => at.elapsed() >= expiry,
            None => true,
        }
    }
}

/// Key/value store whose entries expire a fixed window after being written.
#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    expiry: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Creates an empty cache with the given expiry window.
    pub fn new(expiry: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            expiry,
        }
    }

    /// The configured expiry window.
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Looks up a live value. Never fails on retired or stale keys.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let entry = self.entries.get(key)?;
        if entry.is_expired(self.expiry) {
            return None;
        }
        entry.value.clone()
    }

    /// Stores a value, overwriting value and timestamp together.
    pub fn set(&mut self, key: K, value: V) {
        self.entries.insert(key, CacheEntry::live(value));
    }

    /// Marks `key` as retired without removing it.
    pub fn retire(&mut self, key: K) {
        self.entries.insert(key, CacheEntry::tombstone());
    }

    /// Clears every entry.
    pub fn refresh(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, counting stale ones and tombstones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Cache<K, V> for TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn get(&self, key: &K) -> Option<V> {
        TtlCache::get(self, key)
    }

    fn set(&mut self, key: K, value: V) {
        TtlCache::set(self, key, value)
    }

    fn retire(&mut self, key: K) {
        TtlCache::retire(self, key)
    }

    fn refresh(&mut self) {
        TtlCache::refresh(self)
    }
}
