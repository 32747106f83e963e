//! SQLite-backed [`MemoryStore`].

use std::path::Path;

use {
    async_trait::async_trait,
    serde_json::Value,
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    },
    tracing::{debug, info, warn},
};

use crate::{
    error::Result,
    schema::{CREATE_TABLES, EpisodeRow, LongTermRow, SessionRow, ShortTermRow, TierCounts},
    store::{MemoryStore, Promotion, PromotionCriteria, PromotionOutcome, ScanFilter},
    types::{Layer, NewEpisode, NewShortTerm, clamp_unit},
};

pub struct SqliteMemoryStore {
    pool: SqlitePool,
}

impl SqliteMemoryStore {
    /// Open (creating if needed) the database at `db_path` and ensure the
    /// schema exists. `:memory:` gives a private in-memory database.
    pub async fn open(db_path: &str) -> Result<Self> {
        let pool = if db_path == ":memory:" {
            // Every connection to `sqlite::memory:` is its own database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await?
        } else {
            if let Some(parent) = Path::new(db_path).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(sqlx::Error::Io)?;
            }
            let options = SqliteConnectOptions::new()
                .filename(db_path)
                .create_if_missing(true);
            SqlitePoolOptions::new().connect_with(options).await?
        };
        Self::init(&pool).await?;
        info!(db_path, "memory store opened");
        Ok(Self { pool })
    }

    /// Create the tier tables and indexes if they don't exist.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        for statement in CREATE_TABLES {
            sqlx::query(statement).execute(pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn start_session(&self, id: &str, started_at: i64, context: &Value) -> Result<()> {
        sqlx::query("INSERT INTO sessions (id, started_at, context) VALUES (?, ?, ?)")
            .bind(id)
            .bind(started_at)
            .bind(serde_json::to_string(context)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn end_session(&self, id: &str, ended_at: i64) -> Result<()> {
        sqlx::query("UPDATE sessions SET ended_at = ? WHERE id = ?")
            .bind(ended_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_interaction(&self, session_id: &str) -> Result<()> {
        sqlx::query("UPDATE sessions SET interactions_count = interactions_count + 1 WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<SessionRow>> {
        Ok(
            sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn insert_short_term(
        &self,
        session_id: Option<&str>,
        record: &NewShortTerm,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"INSERT INTO short_term_memory (
                session_id, memory_type, content, context,
                importance, created_at, last_accessed, metadata
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(session_id)
        .bind(&record.kind)
        .bind(serde_json::to_string(&record.content)?)
        .bind(serde_json::to_string(&record.context)?)
        .bind(clamp_unit(record.importance))
        .bind(record.created_at)
        .bind(record.created_at)
        .bind(serde_json::to_string(&record.metadata)?)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn scan_short_term(
        &self,
        filter: &ScanFilter,
        limit: usize,
    ) -> Result<Vec<ShortTermRow>> {
        let rows = match filter.created_between {
            Some((start, end)) => {
                sqlx::query_as::<_, ShortTermRow>(
                    r#"SELECT * FROM short_term_memory
                       WHERE consolidated = 0 AND created_at >= ? AND created_at <= ?
                       ORDER BY importance DESC, created_at DESC
                       LIMIT ?"#,
                )
                .bind(start)
                .bind(end)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            },
            None => {
                sqlx::query_as::<_, ShortTermRow>(
                    r#"SELECT * FROM short_term_memory
                       WHERE consolidated = 0
                       ORDER BY importance DESC, created_at DESC
                       LIMIT ?"#,
                )
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            },
        };
        Ok(rows)
    }

    async fn consolidation_candidates(
        &self,
        criteria: &PromotionCriteria,
    ) -> Result<Vec<ShortTermRow>> {
        Ok(sqlx::query_as::<_, ShortTermRow>(
            r#"SELECT * FROM short_term_memory
               WHERE consolidated = 0
                 AND (importance >= ? OR access_count >= ? OR created_at < ?)
               ORDER BY importance DESC, access_count DESC
               LIMIT ?"#,
        )
        .bind(criteria.min_importance)
        .bind(criteria.min_access_count)
        .bind(criteria.created_before)
        .bind(criteria.batch as i64)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn promote(
        &self,
        source: &ShortTermRow,
        promotion: &Promotion,
    ) -> Result<PromotionOutcome> {
        let mut tx = self.pool.begin().await?;

        // Flip the flag first so a concurrent or repeated pass sees zero rows.
        let flipped = sqlx::query(
            "UPDATE short_term_memory SET consolidated = 1 WHERE id = ? AND consolidated = 0",
        )
        .bind(source.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if flipped == 0 {
            tx.rollback().await?;
            return Ok(PromotionOutcome::AlreadyConsolidated);
        }

        let existing: Option<(i64, String)> = sqlx::query_as(
            r#"SELECT id, source_memories FROM long_term_memory
               WHERE memory_type = ? AND content = ?
               ORDER BY confidence DESC
               LIMIT 1"#,
        )
        .bind(&source.memory_type)
        .bind(&source.content)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            Some((id, sources)) => {
                let mut sources: Vec<i64> = match serde_json::from_str(&sources) {
                    Ok(sources) => sources,
                    Err(e) => {
                        warn!(id, error = %e, "discarding malformed source_memories");
                        Vec::new()
                    },
                };
                if !sources.contains(&source.id) {
                    sources.push(source.id);
                }
                sqlx::query(
                    r#"UPDATE long_term_memory
                       SET confidence = MIN(confidence + ?, 1.0),
                           importance = MAX(importance, ?),
                           access_count = access_count + ?,
                           consolidation_count = consolidation_count + 1,
                           last_reinforced = ?,
                           source_memories = ?
                       WHERE id = ?"#,
                )
                .bind(promotion.reinforcement_step)
                .bind(clamp_unit(source.importance))
                .bind(source.access_count)
                .bind(promotion.now)
                .bind(serde_json::to_string(&sources)?)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                PromotionOutcome::Reinforced(id)
            },
            None => {
                let result = sqlx::query(
                    r#"INSERT INTO long_term_memory (
                        memory_type, content, importance, confidence,
                        access_count, created_at, last_accessed, last_reinforced,
                        source_memories, metadata
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                )
                .bind(&source.memory_type)
                .bind(&source.content)
                .bind(clamp_unit(source.importance))
                .bind(clamp_unit(promotion.initial_confidence))
                .bind(source.access_count)
                .bind(promotion.now)
                .bind(promotion.now)
                .bind(promotion.now)
                .bind(serde_json::to_string(&[source.id])?)
                .bind(&source.metadata)
                .execute(&mut *tx)
                .await?;
                PromotionOutcome::Created(result.last_insert_rowid())
            },
        };

        tx.commit().await?;
        debug!(source = source.id, ?outcome, "short-term record consolidated");
        Ok(outcome)
    }

    async fn prune_short_term(&self, before: i64) -> Result<u64> {
        Ok(
            sqlx::query("DELETE FROM short_term_memory WHERE consolidated = 1 AND created_at < ?")
                .bind(before)
                .execute(&self.pool)
                .await?
                .rows_affected(),
        )
    }

    async fn scan_long_term(&self, limit: usize) -> Result<Vec<LongTermRow>> {
        Ok(sqlx::query_as::<_, LongTermRow>(
            r#"SELECT * FROM long_term_memory
               ORDER BY importance DESC, confidence DESC
               LIMIT ?"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_episode(&self, episode: &NewEpisode) -> Result<i64> {
        let result = sqlx::query(
            r#"INSERT INTO episodic_memory (
                episode_type, title, description, outcome,
                emotional_valence, success, participants, context,
                timestamp, duration, importance, lessons_learned,
                related_episodes, metadata
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&episode.kind)
        .bind(&episode.title)
        .bind(&episode.description)
        .bind(&episode.outcome)
        .bind(episode.emotional_valence)
        .bind(episode.success as i64)
        .bind(serde_json::to_string(&episode.participants)?)
        .bind(serde_json::to_string(&episode.context)?)
        .bind(episode.timestamp)
        .bind(episode.duration)
        .bind(clamp_unit(episode.importance))
        .bind(serde_json::to_string(&episode.lessons_learned)?)
        .bind(serde_json::to_string(&episode.related_episodes)?)
        .bind(serde_json::to_string(&episode.metadata)?)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn scan_episodes(&self, limit: usize) -> Result<Vec<EpisodeRow>> {
        Ok(sqlx::query_as::<_, EpisodeRow>(
            r#"SELECT * FROM episodic_memory
               ORDER BY importance DESC, timestamp DESC
               LIMIT ?"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn record_access(&self, layer: Layer, id: i64, at: i64) -> Result<bool> {
        let sql = match layer {
            Layer::ShortTerm => {
                "UPDATE short_term_memory SET access_count = access_count + 1, last_accessed = ? WHERE id = ?"
            },
            Layer::LongTerm => {
                "UPDATE long_term_memory SET access_count = access_count + 1, last_accessed = ? WHERE id = ?"
            },
            Layer::Working | Layer::Episodic => return Ok(false),
        };
        let touched = sqlx::query(sql)
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(touched > 0)
    }

    async fn counts(&self) -> Result<TierCounts> {
        let short_term: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM short_term_memory WHERE consolidated = 0")
                .fetch_one(&self.pool)
                .await?;
        let long_term: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM long_term_memory")
            .fetch_one(&self.pool)
            .await?;
        let episodic: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM episodic_memory")
            .fetch_one(&self.pool)
            .await?;
        Ok(TierCounts {
            short_term,
            long_term,
            episodic,
        })
    }
}
