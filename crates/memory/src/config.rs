use std::time::Duration;

use crate::types::Layer;

/// Configuration for the memory subsystem.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Path to the SQLite database file (or `:memory:` for tests).
    pub db_path: String,
    /// Number of recent interactions kept in working memory.
    pub working_memory_size: usize,
    /// Move entries that fall off working memory into short-term memory.
    pub spill_working_to_short_term: bool,
    /// Age after which an un-consolidated short-term record is promoted
    /// regardless of importance, and a consolidated one may be pruned.
    pub short_term_retention: Duration,
    /// Importance at or above which a short-term record is promoted.
    pub promotion_importance: f64,
    /// Access count at or above which a short-term record is promoted.
    pub promotion_access_count: i64,
    /// Confidence given to a freshly created long-term record.
    pub initial_confidence: f64,
    /// Confidence added when a promotion corroborates an existing long-term record.
    pub reinforcement_step: f64,
    /// Maximum number of short-term records examined per consolidation pass.
    pub consolidation_batch: usize,
    /// Period of the background consolidation loop.
    pub consolidation_interval: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: "memory.db".into(),
            working_memory_size: 10,
            spill_working_to_short_term: true,
            short_term_retention: Duration::from_secs(24 * 60 * 60),
            promotion_importance: 0.7,
            promotion_access_count: 3,
            initial_confidence: 0.6,
            reinforcement_step: 0.1,
            consolidation_batch: 50,
            consolidation_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Eviction order for the embedding cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheEviction {
    /// Drop the oldest inserted entry.
    #[default]
    Fifo,
    /// Drop the least recently used entry.
    Lru,
}

/// Configuration for the embedding endpoint and its cache.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    /// Upper bound on a single embedding call before it counts as unavailable.
    pub timeout: Duration,
    pub cache_size: usize,
    pub eviction: CacheEviction,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "nomic-embed-text".into(),
            timeout: Duration::from_secs(5),
            cache_size: 1000,
            eviction: CacheEviction::Fifo,
        }
    }
}

/// Default limits and per-tier acceptance floors for search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Results returned when the caller does not pass a limit.
    pub limit: usize,
    pub stm_limit: usize,
    pub ltm_limit: usize,
    pub episode_limit: usize,
    /// Short-term rows scanned by a time-range search.
    pub range_limit: usize,
    pub working_floor: f64,
    pub short_term_floor: f64,
    pub long_term_floor: f64,
    pub episodic_floor: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: 20,
            stm_limit: 50,
            ltm_limit: 30,
            episode_limit: 20,
            range_limit: 50,
            working_floor: 0.3,
            short_term_floor: 0.2,
            long_term_floor: 0.25,
            episodic_floor: 0.3,
        }
    }
}

impl SearchConfig {
    /// Minimum weighted score a candidate from `layer` must reach.
    pub fn floor(&self, layer: Layer) -> f64 {
        match layer {
            Layer::Working => self.working_floor,
            Layer::ShortTerm => self.short_term_floor,
            Layer::LongTerm => self.long_term_floor,
            Layer::Episodic => self.episodic_floor,
        }
    }
}
