//! Owns the four tiers: appends, bounded scans, consolidation and pruning.

use std::sync::{
    Arc,
    atomic::{AtomicI64, AtomicU64, Ordering},
};

use {
    serde::Serialize,
    serde_json::json,
    tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use recall_metrics::{counter, gauge, memory as metric};

use crate::{
    config::MemoryConfig,
    error::{MemoryError, Result},
    schema::ShortTermRow,
    store::{MemoryStore, Promotion, PromotionCriteria, PromotionOutcome, ScanFilter},
    store_sqlite::SqliteMemoryStore,
    types::{
        Interaction, Layer, MemoryRecord, NewEpisode, NewRecord, NewShortTerm, RecordRef,
        WorkingEntry, now_ms,
    },
    working::WorkingMemory,
};

/// Outcome of one consolidation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationReport {
    /// Short-term records due for promotion.
    pub examined: usize,
    /// New long-term records created.
    pub promoted: usize,
    /// Existing long-term records reinforced.
    pub reinforced: usize,
    /// Another pass was already running; this one did nothing.
    pub in_flight: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub session_id: String,
    pub total_memories: i64,
    pub working_memory_size: usize,
    pub short_term_memories: i64,
    pub long_term_memories: i64,
    pub episodic_memories: i64,
    pub consolidations: u64,
    pub last_consolidation: Option<i64>,
}

pub struct MemoryManager {
    store: Arc<dyn MemoryStore>,
    working: WorkingMemory,
    config: MemoryConfig,
    session_id: String,
    consolidation_lock: Mutex<()>,
    consolidations: AtomicU64,
    last_consolidation: AtomicI64,
}

impl MemoryManager {
    /// Open the SQLite store at `config.db_path` and start a session.
    pub async fn open(config: MemoryConfig) -> Result<Self> {
        let store = SqliteMemoryStore::open(&config.db_path).await?;
        Self::with_store(Arc::new(store), config).await
    }

    pub async fn with_store(store: Arc<dyn MemoryStore>, config: MemoryConfig) -> Result<Self> {
        let session_id = format!("session-{}", uuid::Uuid::new_v4());
        store
            .start_session(&session_id, now_ms(), &json!({ "version": 1 }))
            .await?;
        info!(session_id, "memory session started");

        Ok(Self {
            working: WorkingMemory::new(config.working_memory_size),
            store,
            config,
            session_id,
            consolidation_lock: Mutex::new(()),
            consolidations: AtomicU64::new(0),
            last_consolidation: AtomicI64::new(0),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// Append a record to the tier its variant names.
    pub async fn append(&self, record: NewRecord) -> Result<RecordRef> {
        match record {
            NewRecord::Working(interaction) => {
                let entry = self.remember(interaction).await;
                Ok(RecordRef {
                    layer: Layer::Working,
                    id: entry.id,
                })
            },
            NewRecord::ShortTerm(record) => Ok(RecordRef {
                layer: Layer::ShortTerm,
                id: self.store_short_term(record).await?.to_string(),
            }),
            NewRecord::Episodic(episode) => Ok(RecordRef {
                layer: Layer::Episodic,
                id: self.store_episode(episode).await?.to_string(),
            }),
        }
    }

    /// Push an interaction into working memory. The entry that falls off the
    /// far end is moved into short-term memory when spilling is enabled.
    pub async fn remember(&self, interaction: Interaction) -> WorkingEntry {
        let entry = WorkingEntry::from_interaction(interaction);
        let evicted = self.working.push(entry.clone()).await;
        debug!(id = %entry.id, kind = %entry.kind, "stored in working memory");

        #[cfg(feature = "metrics")]
        gauge!(metric::WORKING_MEMORY_ENTRIES).set(self.working.len().await as f64);

        if let Err(e) = self.store.count_interaction(&self.session_id).await {
            warn!(error = %e, "failed to count session interaction");
        }

        if let Some(old) = evicted
            && self.config.spill_working_to_short_term
        {
            let old_id = old.id.clone();
            match self
                .store
                .insert_short_term(Some(&self.session_id), &NewShortTerm::from_working(old))
                .await
            {
                Ok(id) => debug!(working_id = %old_id, id, "working memory spilled to short-term"),
                Err(e) => warn!(working_id = %old_id, error = %e, "failed to spill working memory"),
            }
        }
        entry
    }

    pub async fn store_short_term(&self, record: NewShortTerm) -> Result<i64> {
        let id = self
            .store
            .insert_short_term(Some(&self.session_id), &record)
            .await?;
        debug!(id, kind = %record.kind, "stored in short-term memory");
        Ok(id)
    }

    pub async fn store_episode(&self, episode: NewEpisode) -> Result<i64> {
        let id = self.store.insert_episode(&episode).await?;
        debug!(id, title = %episode.title, "stored episode");
        Ok(id)
    }

    /// Bounded read of one tier. Consolidated short-term records never come
    /// back; rows that fail to decode are skipped. The time filter applies to
    /// short-term scans only.
    pub async fn scan(
        &self,
        layer: Layer,
        filter: &ScanFilter,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let records = match layer {
            Layer::Working => self
                .working
                .snapshot()
                .await
                .into_iter()
                .rev()
                .take(limit)
                .map(MemoryRecord::Working)
                .collect(),
            Layer::ShortTerm => decode_rows(
                self.store.scan_short_term(filter, limit).await?,
                MemoryRecord::ShortTerm,
            ),
            Layer::LongTerm => decode_rows(
                self.store.scan_long_term(limit).await?,
                MemoryRecord::LongTerm,
            ),
            Layer::Episodic => decode_rows(
                self.store.scan_episodes(limit).await?,
                MemoryRecord::Episodic,
            ),
        };
        Ok(records)
    }

    /// Promote due short-term records into long-term memory.
    ///
    /// Single-flight: a call made while another pass runs returns at once
    /// with `in_flight` set. A storage error aborts the pass; records already
    /// promoted stay promoted.
    pub async fn consolidate(&self) -> Result<ConsolidationReport> {
        let Ok(_guard) = self.consolidation_lock.try_lock() else {
            debug!("consolidation already running");
            return Ok(ConsolidationReport {
                in_flight: true,
                ..Default::default()
            });
        };

        let now = now_ms();
        let retention = self.retention_ms();
        let criteria = PromotionCriteria {
            min_importance: self.config.promotion_importance,
            min_access_count: self.config.promotion_access_count,
            created_before: now.saturating_sub(retention),
            batch: self.config.consolidation_batch,
        };
        let candidates = self.store.consolidation_candidates(&criteria).await?;

        let mut report = ConsolidationReport {
            examined: candidates.len(),
            ..Default::default()
        };
        if candidates.is_empty() {
            debug!("no short-term memories due for consolidation");
            return Ok(report);
        }
        info!(count = candidates.len(), "consolidating short-term memories");

        let promotion = Promotion {
            initial_confidence: self.config.initial_confidence,
            reinforcement_step: self.config.reinforcement_step,
            now,
        };
        let result = self.promote_all(&candidates, &promotion, &mut report).await;

        let done = (report.promoted + report.reinforced) as u64;
        self.consolidations.fetch_add(done, Ordering::Relaxed);
        self.last_consolidation.store(now, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        {
            counter!(metric::CONSOLIDATION_PROMOTED_TOTAL).increment(report.promoted as u64);
            counter!(metric::CONSOLIDATION_REINFORCED_TOTAL).increment(report.reinforced as u64);
        }

        result?;
        info!(
            promoted = report.promoted,
            reinforced = report.reinforced,
            "consolidation complete"
        );
        Ok(report)
    }

    async fn promote_all(
        &self,
        candidates: &[ShortTermRow],
        promotion: &Promotion,
        report: &mut ConsolidationReport,
    ) -> Result<()> {
        for row in candidates {
            match self.store.promote(row, promotion).await {
                Ok(PromotionOutcome::Created(id)) => {
                    report.promoted += 1;
                    debug!(source = row.id, id, "new long-term memory");
                },
                Ok(PromotionOutcome::Reinforced(id)) => {
                    report.reinforced += 1;
                    debug!(source = row.id, id, "long-term memory reinforced");
                },
                Ok(PromotionOutcome::AlreadyConsolidated) => {},
                Err(e) => {
                    warn!(source = row.id, error = %e, "consolidation aborted");
                    return Err(e);
                },
            }
        }
        Ok(())
    }

    /// Run [`consolidate`](Self::consolidate) every
    /// `consolidation_interval` until `cancel` fires.
    pub fn spawn_consolidation_loop(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = manager
            .config
            .consolidation_interval
            .max(std::time::Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; wait a full period first.
            ticker.tick().await;
            info!(period_secs = period.as_secs_f64(), "consolidation loop started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = manager.consolidate().await {
                            warn!(error = %e, "background consolidation failed");
                        }
                    },
                }
            }
            debug!("consolidation loop stopped");
        })
    }

    /// Count an access to a short-term or long-term record. Returns whether
    /// the record exists and is countable.
    pub async fn record_access(&self, layer: Layer, id: i64) -> Result<bool> {
        self.store.record_access(layer, id, now_ms()).await
    }

    fn retention_ms(&self) -> i64 {
        i64::try_from(self.config.short_term_retention.as_millis()).unwrap_or(i64::MAX)
    }

    /// Delete consolidated short-term records older than the retention window.
    pub async fn prune_short_term(&self) -> Result<u64> {
        let retention = self.retention_ms();
        let pruned = self
            .store
            .prune_short_term(now_ms().saturating_sub(retention))
            .await?;
        if pruned > 0 {
            info!(pruned, "pruned consolidated short-term memories");
        }
        Ok(pruned)
    }

    pub async fn end_session(&self) -> Result<()> {
        self.store.end_session(&self.session_id, now_ms()).await?;
        info!(session_id = %self.session_id, "memory session ended");
        Ok(())
    }

    pub async fn stats(&self) -> Result<MemoryStats> {
        let counts = self.store.counts().await?;
        let last = self.last_consolidation.load(Ordering::Relaxed);
        Ok(MemoryStats {
            session_id: self.session_id.clone(),
            total_memories: counts.short_term + counts.long_term + counts.episodic,
            working_memory_size: self.working.len().await,
            short_term_memories: counts.short_term,
            long_term_memories: counts.long_term,
            episodic_memories: counts.episodic,
            consolidations: self.consolidations.load(Ordering::Relaxed),
            last_consolidation: (last > 0).then_some(last),
        })
    }
}

fn decode_rows<R, T>(rows: Vec<R>, wrap: fn(T) -> MemoryRecord) -> Vec<MemoryRecord>
where
    T: TryFrom<R, Error = MemoryError>,
{
    rows.into_iter()
        .filter_map(|row| match T::try_from(row) {
            Ok(record) => Some(wrap(record)),
            Err(e) => {
                warn!(error = %e, "skipping malformed memory record");
                None
            },
        })
        .collect()
}
