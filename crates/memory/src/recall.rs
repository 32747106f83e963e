//! Cross-tier recall: fan a query out to every tier, merge, rank, truncate.

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use {
    serde::Serialize,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use recall_metrics::{counter, histogram, memory as metric};

use crate::{
    config::SearchConfig,
    embeddings_cache::CachedEmbedder,
    error::{MemoryError, Result},
    manager::MemoryManager,
    search::rank,
    tiers::{SearchQuery, TierAdapter},
    types::{Candidate, Layer},
};

/// Per-call overrides; `None` falls back to [`SearchConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub stm_limit: Option<usize>,
    pub ltm_limit: Option<usize>,
    pub episode_limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RangeOptions {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<Candidate>,
    /// Candidate count before truncation to the limit.
    pub total_results: usize,
    /// Milliseconds from receipt to final ranking.
    pub search_time: f64,
    /// Tiers whose scan failed and contributed nothing.
    pub skipped_tiers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRangeResponse {
    pub query: String,
    pub results: Vec<Candidate>,
    pub total_results: usize,
    pub time_range: TimeRange,
    /// 1 when the short-term scan failed and the results are empty.
    pub skipped_tiers: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub total_searches: u64,
    /// Searches whose query embedding came from the cache.
    pub cache_hits: u64,
    /// Running mean of search latency, in milliseconds.
    pub avg_search_time: f64,
    pub cache_size: usize,
    /// `cache_hits` as a percentage of `total_searches`.
    pub cache_hit_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    total_searches: u64,
    avg_search_time: f64,
}

pub struct SemanticSearch {
    manager: Arc<MemoryManager>,
    embedder: Option<CachedEmbedder>,
    config: SearchConfig,
    working: TierAdapter,
    short_term: TierAdapter,
    long_term: TierAdapter,
    episodic: TierAdapter,
    counters: Mutex<Counters>,
}

impl SemanticSearch {
    pub fn new(manager: Arc<MemoryManager>, config: SearchConfig) -> Self {
        Self {
            working: TierAdapter::new(Layer::Working, config.floor(Layer::Working)),
            short_term: TierAdapter::new(Layer::ShortTerm, config.floor(Layer::ShortTerm)),
            long_term: TierAdapter::new(Layer::LongTerm, config.floor(Layer::LongTerm)),
            episodic: TierAdapter::new(Layer::Episodic, config.floor(Layer::Episodic)),
            manager,
            embedder: None,
            config,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Compute query embeddings through `embedder`. Without one, queries are
    /// scored on text alone.
    pub fn with_embedder(mut self, embedder: CachedEmbedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn manager(&self) -> &Arc<MemoryManager> {
        &self.manager
    }

    pub fn embedder(&self) -> Option<&CachedEmbedder> {
        self.embedder.as_ref()
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchResponse> {
        self.search_with_cancel(query, options, &CancellationToken::new())
            .await
    }

    /// Like [`search`](Self::search), but gives up with
    /// [`MemoryError::Cancelled`] as soon as `cancel` fires. In-flight tier
    /// scans are dropped.
    pub async fn search_with_cancel(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(query, "search cancelled");
                Err(MemoryError::Cancelled)
            },
            response = self.run_search(query, options) => Ok(response),
        }
    }

    async fn run_search(&self, query: &str, options: &SearchOptions) -> SearchResponse {
        let started = Instant::now();
        let limit = options.limit.unwrap_or(self.config.limit);
        debug!(query, limit, "search started");

        let prepared = SearchQuery::new(query);
        let (candidates, skipped_tiers) = if prepared.terms.is_empty() {
            debug!(query, "no usable query terms");
            (Vec::new(), 0)
        } else {
            let prepared = prepared.with_embedding(self.embed_query(query).await);
            self.fan_out(&prepared, options).await
        };

        let total_results = candidates.len();
        let mut results = rank(candidates);
        results.truncate(limit);

        let elapsed = started.elapsed();
        let search_time = elapsed.as_secs_f64() * 1000.0;
        self.record_search(search_time);
        #[cfg(feature = "metrics")]
        {
            counter!(metric::SEARCHES_TOTAL).increment(1);
            histogram!(metric::SEARCH_DURATION_SECONDS).record(elapsed.as_secs_f64());
        }

        info!(
            query,
            total_results,
            returned = results.len(),
            skipped_tiers,
            search_ms = search_time,
            "search complete"
        );
        SearchResponse {
            query: query.to_string(),
            results,
            total_results,
            search_time,
            skipped_tiers,
        }
    }

    /// Scan all four tiers concurrently. A failed tier contributes nothing
    /// and is counted as skipped.
    async fn fan_out(&self, query: &SearchQuery, options: &SearchOptions) -> (Vec<Candidate>, usize) {
        let manager = self.manager.as_ref();
        let (working, short_term, long_term, episodic) = tokio::join!(
            self.working
                .search(manager, query, manager.config().working_memory_size),
            self.short_term.search(
                manager,
                query,
                options.stm_limit.unwrap_or(self.config.stm_limit)
            ),
            self.long_term.search(
                manager,
                query,
                options.ltm_limit.unwrap_or(self.config.ltm_limit)
            ),
            self.episodic.search(
                manager,
                query,
                options.episode_limit.unwrap_or(self.config.episode_limit)
            ),
        );

        let mut candidates = Vec::new();
        let mut skipped = 0;
        for (layer, result) in [
            (Layer::Working, working),
            (Layer::ShortTerm, short_term),
            (Layer::LongTerm, long_term),
            (Layer::Episodic, episodic),
        ] {
            match result {
                Ok(found) => {
                    debug!(%layer, count = found.len(), "tier candidates");
                    #[cfg(feature = "metrics")]
                    counter!(metric::CANDIDATES_TOTAL, "layer" => layer.as_str())
                        .increment(found.len() as u64);
                    candidates.extend(found);
                },
                Err(e) => {
                    warn!(%layer, error = %e, "tier scan failed, skipping");
                    #[cfg(feature = "metrics")]
                    counter!(metric::DEGRADED_TIERS_TOTAL, "layer" => layer.as_str()).increment(1);
                    skipped += 1;
                },
            }
        }
        (candidates, skipped)
    }

    async fn embed_query(&self, query: &str) -> Option<Arc<Vec<f32>>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(query).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                debug!(error = %e, "scoring on text only");
                None
            },
        }
    }

    fn record_search(&self, search_time: f64) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters.total_searches += 1;
        let n = counters.total_searches as f64;
        counters.avg_search_time += (search_time - counters.avg_search_time) / n;
    }

    /// Search short-term memories created inside `[start, end]` (milliseconds
    /// since the Unix epoch).
    pub async fn search_by_time_range(
        &self,
        query: &str,
        start: i64,
        end: i64,
        options: &RangeOptions,
    ) -> Result<TimeRangeResponse> {
        if start > end {
            return Err(MemoryError::InvalidTimeRange { start, end });
        }
        // The limit bounds the scan itself; nothing is truncated afterwards.
        let limit = options.limit.unwrap_or(self.config.range_limit);
        let prepared = SearchQuery::new(query);

        let (candidates, skipped_tiers) = if prepared.terms.is_empty() {
            (Vec::new(), 0)
        } else {
            match self
                .short_term
                .clone()
                .within(start, end)
                .search(&self.manager, &prepared, limit)
                .await
            {
                Ok(found) => (found, 0),
                Err(e) => {
                    warn!(layer = %Layer::ShortTerm, error = %e, "time range scan failed, skipping");
                    #[cfg(feature = "metrics")]
                    counter!(metric::DEGRADED_TIERS_TOTAL, "layer" => Layer::ShortTerm.as_str())
                        .increment(1);
                    (Vec::new(), 1)
                },
            }
        };

        let total_results = candidates.len();
        let results = rank(candidates);
        debug!(query, start, end, total_results, skipped_tiers, "time range search complete");

        Ok(TimeRangeResponse {
            query: query.to_string(),
            results,
            total_results,
            time_range: TimeRange { start, end },
            skipped_tiers,
        })
    }

    pub fn stats(&self) -> SearchStats {
        let (total_searches, avg_search_time) = {
            let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
            (counters.total_searches, counters.avg_search_time)
        };
        let cache = self
            .embedder
            .as_ref()
            .map(|e| e.cache().stats())
            .unwrap_or_default();
        let cache_hit_rate = if total_searches > 0 {
            cache.hits as f64 / total_searches as f64 * 100.0
        } else {
            0.0
        };
        SearchStats {
            total_searches,
            cache_hits: cache.hits,
            avg_search_time,
            cache_size: cache.size,
            cache_hit_rate,
        }
    }
}
