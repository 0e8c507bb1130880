//! Thread-Safe Local Tier with Expiry Support
//!
//! This module implements the in-process tier of the cache.
//! It provides a thread-safe, sharded HashMap where every entry carries a TTL.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Instead of one big lock, we use multiple shards to reduce contention.
//! 2. **Lazy Expiry**: Entries are checked for expiry on access (lazy) plus a scheduled sweep.
//! 3. **RwLock**: Allows multiple concurrent readers with exclusive writers.
//! 4. **Native Values**: The local tier keeps the caller's value as-is; only the
//!    remote tier ever encodes it.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       LocalStore                            │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are distributed across shards using a hash function, so operations on
//! keys in different shards never block each other. Every mutation of a key
//! (set, delete, lazy eviction, sweep) takes that shard's write lock.
//!
//! Time is read from [`tokio::time::Instant`], which lets tests drive expiry
//! with a paused clock.

use serde::Serialize;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Number of shards for the local tier.
/// More shards = less lock contention, but more memory overhead.
/// 64 is a good balance for most workloads.
const NUM_SHARDS: usize = 64;

/// Longest TTL we will add to `Instant::now()` without risking overflow.
const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// A stored value together with its lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The actual value stored
    pub value: V,
    /// When this entry was created
    pub created_at: Instant,
    /// When this entry expires
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Creates a new entry that lives for `ttl`.
    pub fn new(value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: now + ttl.min(MAX_TTL),
        }
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Checks if this entry has expired as of `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Returns the time left before this entry expires.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

type ShardMap<V> = HashMap<String, CacheEntry<V>>;

/// A single shard containing a portion of the entries.
#[derive(Debug)]
struct Shard<V> {
    data: RwLock<ShardMap<V>>,
}

impl<V> Shard<V> {
    fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    // A panic while holding a shard lock cannot leave a half-written entry behind
    // (HashMap::insert/remove are the only mutations), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, ShardMap<V>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ShardMap<V>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Point-in-time counters for the local tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalStats {
    /// Entries currently held (may include expired entries not yet swept)
    pub entries: u64,
    /// Successful lookups
    pub hits: u64,
    /// Lookups that found nothing, or found an expired entry
    pub misses: u64,
    /// Entries removed by delete, lazy expiry or a sweep
    pub evictions: u64,
    /// Total set operations
    pub sets: u64,
}

/// The in-process cache tier.
///
/// This struct is designed to be shared across tasks (directly or behind an
/// `Arc`). All operations are thread-safe and never fail.
///
/// # Example
///
/// ```
/// use cacheflow::storage::LocalStore;
/// use std::time::Duration;
///
/// let store = LocalStore::new();
///
/// store.set("name", "Ariz".to_string(), Duration::from_secs(60));
/// assert_eq!(store.get("name"), Some("Ariz".to_string()));
///
/// assert!(store.delete("name"));
/// assert_eq!(store.get("name"), None);
/// ```
pub struct LocalStore<V> {
    /// Sharded storage for reduced lock contention
    shards: Vec<Shard<V>>,

    /// Statistics: lookups that returned a value
    hits: AtomicU64,

    /// Statistics: lookups that returned nothing
    misses: AtomicU64,

    /// Statistics: entries removed by delete, lazy expiry or sweep
    evictions: AtomicU64,

    /// Statistics: total set operations
    sets: AtomicU64,
}

impl<V> std::fmt::Debug for LocalStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("shards", &self.shards.len())
            .field("entries", &self.len())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

impl<V> Default for LocalStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> LocalStore<V> {
    /// Creates an empty local tier.
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::new()).collect();

        Self {
            shards,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    /// Gets the shard for a given key.
    #[inline]
    fn get_shard(&self, key: &str) -> &Shard<V> {
        &self.shards[self.shard_index(key)]
    }

    /// Stores `value` under `key` for `ttl`.
    ///
    /// Any existing entry is replaced outright, including its expiry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        self.sets.fetch_add(1, Ordering::Relaxed);

        trace!(key = %key, ttl_ms = ttl.as_millis() as u64, "Local SET");

        let shard = self.get_shard(&key);
        shard.write().insert(key, CacheEntry::new(value, ttl));
    }

    /// Removes `key`.
    ///
    /// # Returns
    ///
    /// Returns `true` if an entry was removed, `false` if there was none.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.get_shard(key).write().remove(key).is_some();

        if removed {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Local DELETE");
        }

        removed
    }

    /// Removes every expired entry and returns how many were removed.
    ///
    /// Shards are locked one at a time, so a sweep never blocks the whole tier.
    pub fn sweep(&self) -> u64 {
        let mut cleaned = 0u64;
        let now = Instant::now();

        for shard in &self.shards {
            let mut data = shard.write();
            let before = data.len();

            data.retain(|_, entry| !entry.is_expired_at(now));

            cleaned += (before - data.len()) as u64;
        }

        if cleaned > 0 {
            self.evictions.fetch_add(cleaned, Ordering::Relaxed);
            debug!(cleaned, "Local sweep removed expired entries");
        }

        cleaned
    }

    /// Drops every entry. Cleared entries are not counted as evictions.
    ///
    /// # Returns
    ///
    /// The number of entries dropped.
    pub fn clear(&self) -> u64 {
        let mut cleared = 0u64;
        for shard in &self.shards {
            let mut data = shard.write();
            cleared += data.len() as u64;
            data.clear();
        }
        debug!(cleared, "Local tier cleared");
        cleared
    }

    /// Returns the remaining lifetime of `key` without touching any counter.
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        self.get_shard(key)
            .read()
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(CacheEntry::remaining)
    }

    /// Returns the number of entries held, including expired ones not yet swept.
    pub fn len(&self) -> u64 {
        self.shards.iter().map(|s| s.read().len() as u64).sum()
    }

    /// Returns true if the tier holds no entries.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    /// Returns a snapshot of the tier's counters.
    pub fn stats(&self) -> LocalStats {
        LocalStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
        }
    }

    fn record_hit(&self, key: &str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        trace!(key = %key, "Local HIT");
    }

    fn record_miss(&self, key: &str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(key = %key, "Local MISS");
    }
}

impl<V: Clone> LocalStore<V> {
    /// Gets the value for `key`.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    /// This implements "lazy expiry": an expired entry is removed on access and
    /// counted as both a miss and an eviction.
    pub fn get(&self, key: &str) -> Option<V> {
        let shard = self.get_shard(key);

        // First, try a read lock (fast path for live entries and plain misses)
        {
            let data = shard.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => {
                    let value = entry.value.clone();
                    drop(data);
                    self.record_hit(key);
                    return Some(value);
                }
                Some(_) => {}
                None => {
                    drop(data);
                    self.record_miss(key);
                    return None;
                }
            }
        }

        // Entry exists but is expired - need write lock to remove it
        let mut data = shard.write();
        match data.get(key) {
            Some(entry) if entry.is_expired() => {
                data.remove(key);
                drop(data);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Local entry expired");
                None
            }
            // Race: another writer replaced the entry in between
            Some(entry) => {
                let value = entry.value.clone();
                drop(data);
                self.record_hit(key);
                Some(value)
            }
            // Race: a sweep removed it (and counted the eviction)
            None => {
                drop(data);
                self.record_miss(key);
                None
            }
        }
    }
}
