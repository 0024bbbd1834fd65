//! Short-lived cache in front of an address lookup
//!
//! Addresses do not move, so serving a result up to the TTL old is fine.
//! A miss or an expired entry always falls through to the inner lookup,
//! and failures are never cached.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::candidate::AddressCandidate;
use crate::lookup::{AddressLookup, LookupError};

struct Entry {
    stored_at: Instant,
    candidates: Vec<AddressCandidate>,
}

pub struct CachedLookup<L> {
    inner: L,
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl<L: AddressLookup> CachedLookup<L> {
    pub fn new(inner: L, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, key: &str) -> Option<Vec<AddressCandidate>> {
        let mut entries = self.entries.lock().ok()?;
        let fresh = entries.get(key)?.stored_at.elapsed() < self.ttl;
        if fresh {
            entries.get(key).map(|e| e.candidates.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    fn put(&self, key: String, candidates: Vec<AddressCandidate>) {
        if let Ok(mut entries) = self.entries.lock() {
            let ttl = self.ttl;
            entries.retain(|_, e| e.stored_at.elapsed() < ttl);
            entries.insert(
                key,
                Entry {
                    stored_at: Instant::now(),
                    candidates,
                },
            );
        }
    }
}

fn cache_key(query: &str) -> String {
    query.trim().to_lowercase()
}

impl<L: AddressLookup> AddressLookup for CachedLookup<L> {
    async fn search(&self, query: &str) -> Result<Vec<AddressCandidate>, LookupError> {
        let key = cache_key(query);
        if let Some(hit) = self.get(&key) {
            debug!(query, "lookup cache hit");
            return Ok(hit);
        }
        let candidates = self.inner.search(query).await?;
        self.put(key, candidates.clone());
        Ok(candidates)
    }

    fn is_rate_limited(&self) -> bool {
        self.inner.is_rate_limited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Counting {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    impl AddressLookup for Counting {
        async fn search(&self, query: &str) -> Result<Vec<AddressCandidate>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LookupError::Status(502));
            }
            Ok(vec![AddressCandidate::new(query, "Austin", "TX", "73301")])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl() {
        let cache = CachedLookup::new(Counting::new(false), Duration::from_secs(300));
        cache.search("1 Main St").await.unwrap();
        let again = cache.search("  1 MAIN st ").await.unwrap();
        assert_eq!(again[0].address, "1 Main St");
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_refetches() {
        let cache = CachedLookup::new(Counting::new(false), Duration::from_secs(300));
        cache.search("1 Main St").await.unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;
        cache.search("1 Main St").await.unwrap();
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_not_cached() {
        let cache = CachedLookup::new(Counting::new(true), Duration::from_secs(300));
        assert!(cache.search("1 Main St").await.is_err());
        assert!(cache.search("1 Main St").await.is_err());
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }
}
