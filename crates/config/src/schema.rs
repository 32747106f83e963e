/// Config schema types (memory tiers, embedding endpoint, search limits).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    pub memory: MemorySection,
    pub embeddings: EmbeddingsConfig,
    pub search: SearchSection,
}

/// Tier sizes, promotion thresholds and the consolidation schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// SQLite database path. Defaults to `~/.recall/memory.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    pub working_memory_size: usize,
    pub spill_working_to_short_term: bool,
    pub short_term_retention_hours: u64,
    pub promotion_importance: f64,
    pub promotion_access_count: i64,
    pub initial_confidence: f64,
    pub reinforcement_step: f64,
    pub consolidation_batch: usize,
    pub consolidation_interval_secs: u64,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            db_path: None,
            working_memory_size: 10,
            spill_working_to_short_term: true,
            short_term_retention_hours: 24,
            promotion_importance: 0.7,
            promotion_access_count: 3,
            initial_confidence: 0.6,
            reinforcement_step: 0.1,
            consolidation_batch: 50,
            consolidation_interval_secs: 300,
        }
    }
}

impl MemorySection {
    /// The configured database path, or the default under [`data_dir`](crate::data_dir).
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| crate::loader::data_dir().join("memory.db"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eviction {
    #[default]
    Fifo,
    Lru,
}

/// Embedding endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    /// When false, search scores on text alone and never calls the endpoint.
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    /// Bearer token (optional; `RECALL_EMBEDDINGS_API_KEY` takes precedence if set).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub cache_size: usize,
    pub eviction: Eviction,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:11434".into(),
            model: "nomic-embed-text".into(),
            api_key: None,
            timeout_ms: 5000,
            cache_size: 1000,
            eviction: Eviction::Fifo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub limit: usize,
    pub stm_limit: usize,
    pub ltm_limit: usize,
    pub episode_limit: usize,
    pub range_limit: usize,
    pub floors: FloorsConfig,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            limit: 20,
            stm_limit: 50,
            ltm_limit: 30,
            episode_limit: 20,
            range_limit: 50,
            floors: FloorsConfig::default(),
        }
    }
}

/// Minimum weighted score per tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloorsConfig {
    pub working: f64,
    pub short_term: f64,
    pub long_term: f64,
    pub episodic: f64,
}

impl Default for FloorsConfig {
    fn default() -> Self {
        Self {
            working: 0.3,
            short_term: 0.2,
            long_term: 0.25,
            episodic: 0.3,
        }
    }
}
