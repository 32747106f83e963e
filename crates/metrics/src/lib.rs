//! Metric names and re-exported recording macros.
//!
//! Crates record through this facade so every metric name lives in one
//! place. Nothing is exported until the host process installs a recorder.

pub use metrics::{counter, gauge, histogram};

/// Memory engine metrics.
pub mod memory {
    /// Cross-tier searches served.
    pub const SEARCHES_TOTAL: &str = "memory_searches_total";
    /// Wall-clock search latency in seconds.
    pub const SEARCH_DURATION_SECONDS: &str = "memory_search_duration_seconds";
    /// Candidates accepted per tier, labelled by `layer`.
    pub const CANDIDATES_TOTAL: &str = "memory_search_candidates_total";
    /// Tier scans that failed and were treated as empty, labelled by `layer`.
    pub const DEGRADED_TIERS_TOTAL: &str = "memory_search_degraded_tiers_total";
    /// Embedding cache hits.
    pub const EMBEDDING_CACHE_HITS_TOTAL: &str = "memory_embedding_cache_hits_total";
    /// Embedding cache misses.
    pub const EMBEDDING_CACHE_MISSES_TOTAL: &str = "memory_embedding_cache_misses_total";
    /// Embedding provider failures and timeouts.
    pub const EMBEDDING_ERRORS_TOTAL: &str = "memory_embedding_errors_total";
    /// Short-term records promoted into a new long-term record.
    pub const CONSOLIDATION_PROMOTED_TOTAL: &str = "memory_consolidation_promoted_total";
    /// Short-term records that reinforced an existing long-term record.
    pub const CONSOLIDATION_REINFORCED_TOTAL: &str = "memory_consolidation_reinforced_total";
    /// Current number of entries in the working-memory ring buffer.
    pub const WORKING_MEMORY_ENTRIES: &str = "memory_working_entries";
}
