/// Storage abstraction for the persisted tiers: short-term, long-term, episodic.
use {async_trait::async_trait, serde_json::Value};

use crate::{
    error::Result,
    schema::{EpisodeRow, LongTermRow, SessionRow, ShortTermRow, TierCounts},
    types::{Layer, NewEpisode, NewShortTerm},
};

/// Restriction applied to a short-term scan on top of the consolidated filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanFilter {
    /// Closed interval on `created_at`, in milliseconds.
    pub created_between: Option<(i64, i64)>,
}

impl ScanFilter {
    pub fn between(start: i64, end: i64) -> Self {
        Self {
            created_between: Some((start, end)),
        }
    }
}

/// Which short-term rows are due for promotion.
#[derive(Debug, Clone, Copy)]
pub struct PromotionCriteria {
    pub min_importance: f64,
    pub min_access_count: i64,
    /// Rows created before this instant are due regardless of importance.
    pub created_before: i64,
    pub batch: usize,
}

/// Parameters of a single promotion write.
#[derive(Debug, Clone, Copy)]
pub struct Promotion {
    pub initial_confidence: f64,
    pub reinforcement_step: f64,
    pub now: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionOutcome {
    /// A new long-term record was inserted.
    Created(i64),
    /// An existing long-term record with identical content was reinforced.
    Reinforced(i64),
    /// The source had already been consolidated; nothing was written.
    AlreadyConsolidated,
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    // ---- sessions ----
    async fn start_session(&self, id: &str, started_at: i64, context: &Value) -> Result<()>;
    async fn end_session(&self, id: &str, ended_at: i64) -> Result<()>;
    async fn count_interaction(&self, session_id: &str) -> Result<()>;
    async fn get_session(&self, id: &str) -> Result<Option<SessionRow>>;

    // ---- short-term ----
    async fn insert_short_term(
        &self,
        session_id: Option<&str>,
        record: &NewShortTerm,
    ) -> Result<i64>;

    /// Un-consolidated rows, highest importance then newest first.
    async fn scan_short_term(&self, filter: &ScanFilter, limit: usize)
    -> Result<Vec<ShortTermRow>>;

    async fn consolidation_candidates(
        &self,
        criteria: &PromotionCriteria,
    ) -> Result<Vec<ShortTermRow>>;

    /// Write the long-term twin of `source` and flag it consolidated, atomically.
    async fn promote(&self, source: &ShortTermRow, promotion: &Promotion)
    -> Result<PromotionOutcome>;

    /// Delete consolidated rows created before `before`.
    async fn prune_short_term(&self, before: i64) -> Result<u64>;

    // ---- long-term ----
    /// Highest importance then confidence first.
    async fn scan_long_term(&self, limit: usize) -> Result<Vec<LongTermRow>>;

    // ---- episodic ----
    async fn insert_episode(&self, episode: &NewEpisode) -> Result<i64>;

    /// Highest importance then newest first.
    async fn scan_episodes(&self, limit: usize) -> Result<Vec<EpisodeRow>>;

    // ---- bookkeeping ----
    /// Bump the access counter of a short-term or long-term row. Returns
    /// whether a row was touched.
    async fn record_access(&self, layer: Layer, id: i64, at: i64) -> Result<bool>;

    async fn counts(&self) -> Result<TierCounts>;
}
