//! Table definitions and raw row types for the persisted tiers.

use {serde::de::DeserializeOwned, serde_json::Value};

use crate::{
    error::{MemoryError, Result},
    types::{Episode, Layer, LongTermMemory, ShortTermMemory, clamp_unit},
};

pub(crate) const CREATE_TABLES: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS sessions (
        id                 TEXT PRIMARY KEY,
        started_at         INTEGER NOT NULL,
        ended_at           INTEGER,
        interactions_count INTEGER NOT NULL DEFAULT 0,
        context            TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS short_term_memory (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id    TEXT,
        memory_type   TEXT NOT NULL,
        content       TEXT NOT NULL,
        context       TEXT,
        importance    REAL NOT NULL DEFAULT 0.5,
        access_count  INTEGER NOT NULL DEFAULT 0,
        created_at    INTEGER NOT NULL,
        last_accessed INTEGER,
        consolidated  INTEGER NOT NULL DEFAULT 0,
        metadata      TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS long_term_memory (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        memory_type         TEXT NOT NULL,
        content             TEXT NOT NULL,
        summary             TEXT,
        importance          REAL NOT NULL,
        confidence          REAL NOT NULL DEFAULT 0.5,
        access_count        INTEGER NOT NULL DEFAULT 0,
        consolidation_count INTEGER NOT NULL DEFAULT 1,
        created_at          INTEGER NOT NULL,
        last_accessed       INTEGER,
        last_reinforced     INTEGER,
        source_memories     TEXT NOT NULL DEFAULT '[]',
        tags                TEXT,
        metadata            TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS episodic_memory (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        episode_type      TEXT NOT NULL,
        title             TEXT NOT NULL,
        description       TEXT NOT NULL,
        outcome           TEXT,
        emotional_valence REAL NOT NULL DEFAULT 0,
        success           INTEGER NOT NULL DEFAULT 0,
        participants      TEXT,
        context           TEXT NOT NULL,
        timestamp         INTEGER NOT NULL,
        duration          INTEGER,
        importance        REAL NOT NULL,
        lessons_learned   TEXT,
        related_episodes  TEXT,
        metadata          TEXT
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_stm_session ON short_term_memory(session_id)",
    "CREATE INDEX IF NOT EXISTS idx_stm_importance ON short_term_memory(importance DESC)",
    "CREATE INDEX IF NOT EXISTS idx_stm_created ON short_term_memory(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_ltm_type ON long_term_memory(memory_type)",
    "CREATE INDEX IF NOT EXISTS idx_ltm_importance ON long_term_memory(importance DESC)",
    "CREATE INDEX IF NOT EXISTS idx_episode_type ON episodic_memory(episode_type)",
    "CREATE INDEX IF NOT EXISTS idx_episode_importance ON episodic_memory(importance DESC)",
];

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShortTermRow {
    pub id: i64,
    pub session_id: Option<String>,
    pub memory_type: String,
    pub content: String,
    pub context: Option<String>,
    pub importance: f64,
    pub access_count: i64,
    pub created_at: i64,
    pub last_accessed: Option<i64>,
    pub consolidated: i64,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LongTermRow {
    pub id: i64,
    pub memory_type: String,
    pub content: String,
    pub summary: Option<String>,
    pub importance: f64,
    pub confidence: f64,
    pub access_count: i64,
    pub consolidation_count: i64,
    pub created_at: i64,
    pub last_accessed: Option<i64>,
    pub last_reinforced: Option<i64>,
    pub source_memories: String,
    pub tags: Option<String>,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EpisodeRow {
    pub id: i64,
    pub episode_type: String,
    pub title: String,
    pub description: String,
    pub outcome: Option<String>,
    pub emotional_valence: f64,
    pub success: i64,
    pub participants: Option<String>,
    pub context: String,
    pub timestamp: i64,
    pub duration: Option<i64>,
    pub importance: f64,
    pub lessons_learned: Option<String>,
    pub related_episodes: Option<String>,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: String,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub interactions_count: i64,
    pub context: Option<String>,
}

/// Row counts per persisted tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct TierCounts {
    /// Un-consolidated short-term rows only.
    pub short_term: i64,
    pub long_term: i64,
    pub episodic: i64,
}

/// Decode a required JSON column. Failure makes the whole row malformed.
fn required<T: DeserializeOwned>(layer: Layer, id: i64, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| MemoryError::malformed(layer, id, e))
}

/// Decode an optional JSON column, tolerating garbage.
fn lenient<T: DeserializeOwned + Default>(raw: Option<&str>) -> T {
    raw.and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

fn lenient_object(raw: Option<&str>) -> Value {
    match lenient::<Value>(raw) {
        Value::Null => Value::Object(Default::default()),
        other => other,
    }
}

impl TryFrom<ShortTermRow> for ShortTermMemory {
    type Error = MemoryError;

    fn try_from(r: ShortTermRow) -> Result<Self> {
        Ok(Self {
            content: required(Layer::ShortTerm, r.id, &r.content)?,
            id: r.id,
            session_id: r.session_id,
            kind: r.memory_type,
            context: lenient_object(r.context.as_deref()),
            importance: clamp_unit(r.importance),
            access_count: r.access_count,
            created_at: r.created_at,
            last_accessed: r.last_accessed,
            consolidated: r.consolidated != 0,
            metadata: lenient_object(r.metadata.as_deref()),
        })
    }
}

impl TryFrom<LongTermRow> for LongTermMemory {
    type Error = MemoryError;

    fn try_from(r: LongTermRow) -> Result<Self> {
        Ok(Self {
            content: required(Layer::LongTerm, r.id, &r.content)?,
            id: r.id,
            kind: r.memory_type,
            summary: r.summary,
            importance: clamp_unit(r.importance),
            confidence: clamp_unit(r.confidence),
            access_count: r.access_count,
            consolidation_count: r.consolidation_count,
            created_at: r.created_at,
            last_accessed: r.last_accessed,
            last_reinforced: r.last_reinforced,
            source_memories: lenient(Some(r.source_memories.as_str())),
            tags: lenient(r.tags.as_deref()),
            metadata: lenient_object(r.metadata.as_deref()),
        })
    }
}

impl TryFrom<EpisodeRow> for Episode {
    type Error = MemoryError;

    fn try_from(r: EpisodeRow) -> Result<Self> {
        Ok(Self {
            context: required(Layer::Episodic, r.id, &r.context)?,
            id: r.id,
            kind: r.episode_type,
            title: r.title,
            description: r.description,
            outcome: r.outcome,
            emotional_valence: r.emotional_valence,
            success: r.success != 0,
            participants: lenient(r.participants.as_deref()),
            timestamp: r.timestamp,
            duration: r.duration,
            importance: clamp_unit(r.importance),
            lessons_learned: lenient(r.lessons_learned.as_deref()),
            related_episodes: lenient(r.related_episodes.as_deref()),
            metadata: lenient_object(r.metadata.as_deref()),
        })
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn stm_row(content: &str) -> ShortTermRow {
        ShortTermRow {
            id: 7,
            session_id: None,
            memory_type: "note".into(),
            content: content.into(),
            context: None,
            importance: 1.4,
            access_count: 0,
            created_at: 100,
            last_accessed: None,
            consolidated: 1,
            metadata: Some("not json".into()),
        }
    }

    #[test]
    fn short_term_row_decodes_and_clamps() {
        let mem = ShortTermMemory::try_from(stm_row(r#"{"text":"hi"}"#)).unwrap();
        assert_eq!(mem.content, json!({ "text": "hi" }));
        assert_eq!(mem.importance, 1.0);
        assert!(mem.consolidated);
        assert_eq!(mem.metadata, json!({}));
    }

    #[test]
    fn corrupt_content_is_malformed() {
        let err = ShortTermMemory::try_from(stm_row("{broken")).unwrap_err();
        match err {
            MemoryError::MalformedRecord { layer, id, .. } => {
                assert_eq!(layer, Layer::ShortTerm);
                assert_eq!(id, "7");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn long_term_sources_decode() {
        let row = LongTermRow {
            id: 1,
            memory_type: "fact".into(),
            content: r#""x""#.into(),
            summary: None,
            importance: 0.8,
            confidence: 0.6,
            access_count: 2,
            consolidation_count: 1,
            created_at: 0,
            last_accessed: None,
            last_reinforced: None,
            source_memories: "[3, 9]".into(),
            tags: None,
            metadata: None,
        };
        let mem = LongTermMemory::try_from(row).unwrap();
        assert_eq!(mem.source_memories, vec![3, 9]);
        assert!(mem.tags.is_empty());
    }
}
