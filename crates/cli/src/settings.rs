//! Maps the file schema onto the memory crate's runtime config.

use std::{path::Path, sync::Arc, time::Duration};

use {
    recall_config::{EmbeddingsConfig, Eviction, RecallConfig},
    recall_memory::{
        CacheEviction, EmbeddingConfig, MemoryConfig, SearchConfig,
        embeddings_cache::{CachedEmbedder, EmbeddingCache, policy_for},
        embeddings_ollama::OllamaEmbeddingProvider,
    },
    tracing::debug,
};

/// Takes precedence over `embeddings.api_key` in the config file.
const API_KEY_ENV: &str = "RECALL_EMBEDDINGS_API_KEY";

pub fn memory_config(config: &RecallConfig, db_override: Option<&Path>) -> MemoryConfig {
    let m = &config.memory;
    let db_path = db_override
        .map(Path::to_path_buf)
        .unwrap_or_else(|| m.resolved_db_path());
    MemoryConfig {
        db_path: db_path.to_string_lossy().into_owned(),
        working_memory_size: m.working_memory_size,
        spill_working_to_short_term: m.spill_working_to_short_term,
        short_term_retention: Duration::from_secs(
            m.short_term_retention_hours.saturating_mul(60 * 60),
        ),
        promotion_importance: m.promotion_importance,
        promotion_access_count: m.promotion_access_count,
        initial_confidence: m.initial_confidence,
        reinforcement_step: m.reinforcement_step,
        consolidation_batch: m.consolidation_batch,
        consolidation_interval: Duration::from_secs(m.consolidation_interval_secs),
    }
}

pub fn embedding_config(config: &EmbeddingsConfig) -> EmbeddingConfig {
    EmbeddingConfig {
        base_url: config.base_url.clone(),
        model: config.model.clone(),
        timeout: Duration::from_millis(config.timeout_ms),
        cache_size: config.cache_size,
        eviction: match config.eviction {
            Eviction::Fifo => CacheEviction::Fifo,
            Eviction::Lru => CacheEviction::Lru,
        },
    }
}

pub fn search_config(config: &RecallConfig) -> SearchConfig {
    let s = &config.search;
    SearchConfig {
        limit: s.limit,
        stm_limit: s.stm_limit,
        ltm_limit: s.ltm_limit,
        episode_limit: s.episode_limit,
        range_limit: s.range_limit,
        working_floor: s.floors.working,
        short_term_floor: s.floors.short_term,
        long_term_floor: s.floors.long_term,
        episodic_floor: s.floors.episodic,
    }
}

fn api_key(config: &EmbeddingsConfig) -> Option<String> {
    std::env::var(API_KEY_ENV)
        .ok()
        .filter(|k| !k.is_empty())
        .or_else(|| config.api_key.clone())
}

/// The cached embedder for search, or `None` when embeddings are disabled.
pub fn build_embedder(config: &EmbeddingsConfig) -> anyhow::Result<Option<CachedEmbedder>> {
    if !config.enabled {
        debug!("embeddings disabled");
        return Ok(None);
    }
    let runtime = embedding_config(config);
    let mut provider = OllamaEmbeddingProvider::from_config(&runtime)?;
    if let Some(key) = api_key(config) {
        provider = provider.with_api_key(key);
    }
    debug!(base_url = %runtime.base_url, model = %runtime.model, "embeddings enabled");
    Ok(Some(CachedEmbedder::new(
        Arc::new(provider),
        EmbeddingCache::new(runtime.cache_size, policy_for(runtime.eviction)),
        runtime.timeout,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_runtime_defaults() {
        let file = RecallConfig::default();
        let memory = memory_config(&file, Some(Path::new("/tmp/recall.db")));
        let expected = MemoryConfig::default();
        assert_eq!(memory.db_path, "/tmp/recall.db");
        assert_eq!(memory.short_term_retention, expected.short_term_retention);
        assert_eq!(memory.consolidation_interval, expected.consolidation_interval);
        assert_eq!(memory.working_memory_size, expected.working_memory_size);

        let search = search_config(&file);
        for layer in recall_memory::Layer::ALL {
            assert_eq!(search.floor(layer), SearchConfig::default().floor(layer));
        }

        let embeddings = embedding_config(&file.embeddings);
        assert_eq!(embeddings.timeout, EmbeddingConfig::default().timeout);
        assert_eq!(embeddings.eviction, CacheEviction::Fifo);
    }

    #[test]
    fn huge_retention_saturates() {
        let mut file = RecallConfig::default();
        file.memory.short_term_retention_hours = u64::MAX;
        let memory = memory_config(&file, None);
        assert_eq!(memory.short_term_retention, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn db_defaults_to_data_dir() {
        let memory = memory_config(&RecallConfig::default(), None);
        assert!(memory.db_path.ends_with("memory.db"));
    }

    #[test]
    fn disabled_embeddings_build_nothing() {
        let config = EmbeddingsConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(build_embedder(&config).unwrap().is_none());
    }

    #[test]
    fn lru_eviction_maps_through() {
        let config = EmbeddingsConfig {
            eviction: Eviction::Lru,
            cache_size: 3,
            ..Default::default()
        };
        assert_eq!(embedding_config(&config).eviction, CacheEviction::Lru);
        let embedder = build_embedder(&config).unwrap().unwrap();
        assert!(embedder.cache().is_empty());
        assert_eq!(embedder.provider().model_name(), "nomic-embed-text");
    }
}
