//! Per-run caches
//!
//! Everything cached here lives for one top-level resolution run and is
//! never invalidated mid-run. Keys that are built from several inputs
//! (working directory, command arguments, source URLs) are hashed with
//! SHA256 so they stay short and uniform.

use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::errors::EngineResult;

/// Cache key computed from an ordered list of inputs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The hex-encoded SHA256 hash
    pub hash: String,
}

impl CacheKey {
    /// Compute a key from inputs; each part is NUL-separated so that
    /// `["ab", "c"]` and `["a", "bc"]` hash differently
    pub fn compute<S: AsRef<str>>(parts: &[S]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_ref().as_bytes());
            hasher.update(b"\x00");
        }
        CacheKey {
            hash: hex_encode(&hasher.finalize()),
        }
    }

    /// A short prefix of the hash, for directory names
    pub fn short(&self) -> &str {
        &self.hash[..16]
    }
}

/// Hit/miss counters of a [`RunCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

type Slot<V> = Arc<Mutex<Option<V>>>;

/// Memo table where each key is computed at most once, even when several
/// threads ask for the same key at the same time.
///
/// The map only hands out per-key slots; the slot's mutex is held while
/// the value is computed, so a second caller for the same key blocks until
/// the first one finishes and then reuses its result. Failed computations
/// leave the slot empty.
pub struct RunCache<K, V> {
    slots: DashMap<K, Slot<V>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<K, V> Default for RunCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> RunCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Return the cached value for `key`, computing it with `compute` on
    /// first use
    pub fn get_or_try_insert_with<F>(&self, key: K, compute: F) -> EngineResult<V>
    where
        F: FnOnce() -> EngineResult<V>,
    {
        // Clone the slot out so the map shard is not locked during compute
        let slot = self.slots.entry(key).or_default().value().clone();
        let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(value) = guard.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute()?;
        *guard = Some(value.clone());
        Ok(value)
    }

    /// Look up a finished entry without computing anything
    pub fn get(&self, key: &K) -> Option<V> {
        let slot = self.slots.get(key)?.value().clone();
        let guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
