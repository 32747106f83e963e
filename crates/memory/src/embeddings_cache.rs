//! Bounded, process-lifetime cache in front of an [`EmbeddingProvider`].
//!
//! Entries are keyed by a SHA-256 of the source text. The eviction order is
//! pluggable: [`Fifo`] drops the oldest insert regardless of use, [`Lru`]
//! drops the least recently read entry.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use {
    sha2::{Digest, Sha256},
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use recall_metrics::{counter, memory as metric};

use crate::{
    config::CacheEviction,
    embeddings::EmbeddingProvider,
    error::{MemoryError, Result},
};

/// Decides which key leaves the cache when it overflows.
pub trait EvictionPolicy: Send {
    fn on_insert(&mut self, key: &str);
    fn on_hit(&mut self, key: &str);
    /// The next key to drop, removed from the policy's own bookkeeping.
    fn evict(&mut self) -> Option<String>;
}

/// First in, first out.
#[derive(Debug, Default)]
pub struct Fifo {
    order: VecDeque<String>,
}

impl EvictionPolicy for Fifo {
    fn on_insert(&mut self, key: &str) {
        self.order.push_back(key.to_string());
    }

    fn on_hit(&mut self, _key: &str) {}

    fn evict(&mut self) -> Option<String> {
        self.order.pop_front()
    }
}

/// Least recently used.
#[derive(Debug, Default)]
pub struct Lru {
    order: VecDeque<String>,
}

impl EvictionPolicy for Lru {
    fn on_insert(&mut self, key: &str) {
        self.order.push_back(key.to_string());
    }

    fn on_hit(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key)
            && let Some(k) = self.order.remove(pos)
        {
            self.order.push_back(k);
        }
    }

    fn evict(&mut self) -> Option<String> {
        self.order.pop_front()
    }
}

pub fn policy_for(eviction: CacheEviction) -> Box<dyn EvictionPolicy> {
    match eviction {
        CacheEviction::Fifo => Box::<Fifo>::default(),
        CacheEviction::Lru => Box::<Lru>::default(),
    }
}

/// Stable cache key for `text`.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())[..32].to_string()
}

struct CacheState {
    entries: HashMap<String, Arc<Vec<f32>>>,
    policy: Box<dyn EvictionPolicy>,
    hits: u64,
    misses: u64,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct EmbeddingCache {
    state: Mutex<CacheState>,
    capacity: usize,
}

impl EmbeddingCache {
    pub fn new(capacity: usize, policy: Box<dyn EvictionPolicy>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                policy,
                hits: 0,
                misses: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn fifo(capacity: usize) -> Self {
        Self::new(capacity, Box::<Fifo>::default())
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // The state stays consistent across a panic mid-update, so a
        // poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up `key`, counting a hit or a miss.
    pub fn get(&self, key: &str) -> Option<Arc<Vec<f32>>> {
        let mut state = self.lock();
        match state.entries.get(key).cloned() {
            Some(vector) => {
                state.hits += 1;
                state.policy.on_hit(key);
                Some(vector)
            },
            None => {
                state.misses += 1;
                None
            },
        }
    }

    /// Insert `key`, evicting until the cache is back within capacity.
    pub fn insert(&self, key: String, vector: Arc<Vec<f32>>) {
        let mut state = self.lock();
        if state.entries.insert(key.clone(), vector).is_some() {
            // Racing miss for the same text; keep its original position.
            return;
        }
        state.policy.on_insert(&key);
        while state.entries.len() > self.capacity {
            match state.policy.evict() {
                Some(old) => {
                    state.entries.remove(&old);
                    debug!(key = %old, "embedding cache evicted entry");
                },
                None => break,
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            size: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
        }
    }
}

/// An [`EmbeddingProvider`] behind an [`EmbeddingCache`] and a timeout.
pub struct CachedEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
    timeout: Duration,
}

impl CachedEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, cache: EmbeddingCache, timeout: Duration) -> Self {
        Self {
            provider,
            cache,
            timeout,
        }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    /// Embed `text`, reusing a cached vector when one exists.
    pub async fn embed(&self, text: &str) -> Result<Arc<Vec<f32>>> {
        let key = hash_text(text);
        if let Some(vector) = self.cache.get(&key) {
            #[cfg(feature = "metrics")]
            counter!(metric::EMBEDDING_CACHE_HITS_TOTAL).increment(1);
            return Ok(vector);
        }
        #[cfg(feature = "metrics")]
        counter!(metric::EMBEDDING_CACHE_MISSES_TOTAL).increment(1);

        let vector = match tokio::time::timeout(self.timeout, self.provider.embed(text)).await {
            Ok(Ok(vector)) if !vector.is_empty() => Arc::new(vector),
            Ok(Ok(_)) => return Err(self.unavailable("empty embedding".into())),
            Ok(Err(e)) => return Err(self.unavailable(e.to_string())),
            Err(_) => {
                return Err(self.unavailable(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                )));
            },
        };

        self.cache.insert(key, Arc::clone(&vector));
        Ok(vector)
    }

    fn unavailable(&self, reason: String) -> MemoryError {
        #[cfg(feature = "metrics")]
        counter!(metric::EMBEDDING_ERRORS_TOTAL).increment(1);
        warn!(model = self.provider.model_name(), %reason, "embedding unavailable");
        MemoryError::EmbeddingUnavailable(reason)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    fn vector(v: f32) -> Arc<Vec<f32>> {
        Arc::new(vec![v])
    }

    #[test]
    fn fifo_overflow_evicts_first_inserted() {
        let cache = EmbeddingCache::fifo(3);
        for (i, text) in ["a", "b", "c", "d"].iter().enumerate() {
            cache.insert(hash_text(text), vector(i as f32));
        }
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&hash_text("a")));
        assert!(cache.contains(&hash_text("d")));
    }

    #[test]
    fn fifo_ignores_reads_when_evicting() {
        let cache = EmbeddingCache::fifo(2);
        cache.insert(hash_text("a"), vector(0.0));
        cache.insert(hash_text("b"), vector(1.0));
        assert!(cache.get(&hash_text("a")).is_some());
        cache.insert(hash_text("c"), vector(2.0));
        assert!(!cache.contains(&hash_text("a")));
        assert!(cache.contains(&hash_text("b")));
    }

    #[test]
    fn lru_keeps_recently_read() {
        let cache = EmbeddingCache::new(2, policy_for(CacheEviction::Lru));
        cache.insert(hash_text("a"), vector(0.0));
        cache.insert(hash_text("b"), vector(1.0));
        assert!(cache.get(&hash_text("a")).is_some());
        cache.insert(hash_text("c"), vector(2.0));
        assert!(cache.contains(&hash_text("a")));
        assert!(!cache.contains(&hash_text("b")));
    }

    #[test]
    fn counts_hits_and_misses() {
        let cache = EmbeddingCache::fifo(4);
        cache.insert("k".into(), vector(1.0));
        cache.get("k");
        cache.get("missing");
        assert_eq!(cache.stats(), CacheStats {
            size: 1,
            hits: 1,
            misses: 1,
        });
    }

    #[test]
    fn hash_is_stable() {
        assert_eq!(hash_text("hello"), hash_text("hello"));
        assert_ne!(hash_text("hello"), hash_text("Hello"));
        assert_eq!(hash_text("x").len(), 32);
    }

    struct CountingProvider {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(vec![text.len() as f32])
        }

        fn model_name(&self) -> &str {
            "counting"
        }

        fn provider_key(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let embedder = CachedEmbedder::new(
            provider.clone(),
            EmbeddingCache::fifo(10),
            Duration::from_secs(1),
        );
        let first = embedder.embed("query").await.unwrap();
        let second = embedder.embed("query").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(embedder.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(200),
        });
        let embedder =
            CachedEmbedder::new(provider, EmbeddingCache::fifo(10), Duration::from_millis(10));
        let err = embedder.embed("query").await.unwrap_err();
        assert!(matches!(err, MemoryError::EmbeddingUnavailable(_)));
        assert!(embedder.cache().is_empty());
    }
}
