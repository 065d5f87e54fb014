// Path: crates/gateway/src/nonce.rs
//! Replay protection: a short-TTL set of `(principal, nonce)` pairs.
//!
//! Entries expire after `2 × max_skew`, so any request that passed the
//! timestamp check cannot be replayed after its entry is gone: by then the
//! timestamp itself is stale. Capacity is bounded with LRU eviction; the
//! bound must satisfy `request rate × TTL ≤ capacity` under expected load.
//!
//! Eviction decisions use the monotonic clock; wall-clock time is only
//! ever compared against the Hawk timestamp, one stage earlier.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Outcome of a nonce-cache check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceCheck {
    /// First sighting inside the window; the entry is now recorded.
    Ok,
    /// The pair was already seen inside the window.
    Replay,
}

/// The process-local replay cache. One instance per process; replicas do
/// not share replay state.
pub struct NonceCache {
    entries: Mutex<LruCache<(String, String), Instant>>,
    ttl: Duration,
}

impl NonceCache {
    /// A cache holding at most `capacity` live entries with the given TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1))
            .expect("capacity clamped to at least 1");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Atomically tests and records `(principal, nonce)`.
    ///
    /// The single lock makes the check-and-insert atomic under concurrent
    /// request processing: at most one caller per pair observes `Ok`
    /// within the TTL window, regardless of interleaving.
    pub fn check_and_insert(&self, principal: &str, nonce: &str) -> NonceCheck {
        let key = (principal.to_string(), nonce.to_string());
        let now = Instant::now();
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(inserted_at) = entries.get(&key) {
            if now.duration_since(*inserted_at) < self.ttl {
                return NonceCheck::Replay;
            }
        }
        entries.put(key, now);
        NonceCheck::Ok
    }

    /// Live entry count, for the heartbeat and tests.
    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_insert_ok_then_replay() {
        let cache = NonceCache::new(1024, Duration::from_secs(120));
        assert_eq!(cache.check_and_insert("alice", "n1"), NonceCheck::Ok);
        assert_eq!(cache.check_and_insert("alice", "n1"), NonceCheck::Replay);
        // A different principal may reuse the same nonce value.
        assert_eq!(cache.check_and_insert("bob", "n1"), NonceCheck::Ok);
        // And the same principal may use a fresh nonce.
        assert_eq!(cache.check_and_insert("alice", "n2"), NonceCheck::Ok);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = NonceCache::new(1024, Duration::from_millis(50));
        assert_eq!(cache.check_and_insert("alice", "n1"), NonceCheck::Ok);
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cache.check_and_insert("alice", "n1"), NonceCheck::Ok);
    }

    #[test]
    fn capacity_bound_evicts_lru() {
        let cache = NonceCache::new(2, Duration::from_secs(120));
        assert_eq!(cache.check_and_insert("alice", "n1"), NonceCheck::Ok);
        assert_eq!(cache.check_and_insert("alice", "n2"), NonceCheck::Ok);
        assert_eq!(cache.check_and_insert("alice", "n3"), NonceCheck::Ok);
        assert_eq!(cache.len(), 2);
        // n1 was evicted; its reappearance is no longer a detected replay.
        // The timestamp check is what protects requests this old.
        assert_eq!(cache.check_and_insert("alice", "n1"), NonceCheck::Ok);
        // n3 is still resident.
        assert_eq!(cache.check_and_insert("alice", "n3"), NonceCheck::Replay);
    }

    #[test]
    fn concurrent_submissions_admit_exactly_one() {
        let cache = Arc::new(NonceCache::new(1024, Duration::from_secs(120)));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                cache.check_and_insert("alice", "contested")
            }));
        }
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|outcome| *outcome == NonceCheck::Ok)
            .count();
        assert_eq!(admitted, 1);
    }
}
