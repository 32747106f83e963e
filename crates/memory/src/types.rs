//! Tier records and the shapes returned by search.

use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Clamp to the probability range. NaN maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// One of the four memory tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layer {
    Working,
    ShortTerm,
    LongTerm,
    Episodic,
}

impl Layer {
    pub const ALL: [Layer; 4] = [
        Layer::Working,
        Layer::ShortTerm,
        Layer::LongTerm,
        Layer::Episodic,
    ];

    /// Tie-break rank when two candidates score the same; higher wins.
    pub fn priority(self) -> u8 {
        match self {
            Layer::Working => 4,
            Layer::Episodic => 3,
            Layer::ShortTerm => 2,
            Layer::LongTerm => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Layer::Working => "working",
            Layer::ShortTerm => "short-term",
            Layer::LongTerm => "long-term",
            Layer::Episodic => "episodic",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scoring hooks shared by every tier's record type.
pub trait Scorable {
    fn layer(&self) -> Layer;

    /// Text the query terms are matched against.
    fn search_text(&self) -> String;

    /// Multiplier applied to the textual overlap score.
    fn weight(&self) -> f64;
}

// ── Working ─────────────────────────────────────────────────────────────────

/// A raw interaction handed to working memory.
#[derive(Debug, Clone)]
pub struct Interaction {
    pub kind: String,
    pub content: Value,
    pub context: Value,
    /// Explicit importance; derived from the interaction when absent.
    pub importance: Option<f64>,
}

impl Interaction {
    pub fn new(kind: impl Into<String>, content: Value) -> Self {
        Self {
            kind: kind.into(),
            content,
            context: Value::Object(Default::default()),
            importance: None,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }

    /// Heuristic importance: error-like kinds, explicit user requests and
    /// long content matter more.
    pub fn derived_importance(&self) -> f64 {
        let mut importance = 0.5;
        match self.kind.as_str() {
            "error" | "bug" => importance += 0.3,
            "success" => importance += 0.2,
            _ => {},
        }
        if self
            .context
            .get("userExplicit")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            importance += 0.2;
        }
        let length = match &self.content {
            Value::String(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            other => other.to_string().chars().count(),
        };
        if length > 500 {
            importance += 0.1;
        }
        clamp_unit(importance)
    }
}

/// An entry in the working-memory ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Value,
    pub context: Value,
    pub timestamp: i64,
    pub importance: f64,
}

impl WorkingEntry {
    pub fn from_interaction(interaction: Interaction) -> Self {
        let importance = clamp_unit(
            interaction
                .importance
                .unwrap_or_else(|| interaction.derived_importance()),
        );
        Self {
            id: format!("wm-{}", uuid::Uuid::new_v4()),
            kind: interaction.kind,
            content: interaction.content,
            context: interaction.context,
            timestamp: now_ms(),
            importance,
        }
    }
}

impl Scorable for WorkingEntry {
    fn layer(&self) -> Layer {
        Layer::Working
    }

    fn search_text(&self) -> String {
        self.content.to_string()
    }

    fn weight(&self) -> f64 {
        1.0
    }
}

// ── Short-term ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortTermMemory {
    pub id: i64,
    pub session_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Value,
    pub context: Value,
    pub importance: f64,
    pub access_count: i64,
    pub created_at: i64,
    pub last_accessed: Option<i64>,
    pub consolidated: bool,
    pub metadata: Value,
}

impl Scorable for ShortTermMemory {
    fn layer(&self) -> Layer {
        Layer::ShortTerm
    }

    fn search_text(&self) -> String {
        self.content.to_string()
    }

    fn weight(&self) -> f64 {
        self.importance
    }
}

/// A short-term record about to be inserted.
#[derive(Debug, Clone)]
pub struct NewShortTerm {
    pub kind: String,
    pub content: Value,
    pub context: Value,
    pub importance: f64,
    pub created_at: i64,
    pub metadata: Value,
}

impl NewShortTerm {
    pub fn new(kind: impl Into<String>, content: Value) -> Self {
        Self {
            kind: kind.into(),
            content,
            context: Value::Object(Default::default()),
            importance: 0.5,
            created_at: now_ms(),
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = clamp_unit(importance);
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Override the creation time (milliseconds since the Unix epoch).
    pub fn at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }

    pub(crate) fn from_working(entry: WorkingEntry) -> Self {
        Self {
            kind: entry.kind,
            content: entry.content,
            context: entry.context,
            importance: entry.importance,
            created_at: entry.timestamp,
            metadata: serde_json::json!({ "source": "working_memory" }),
        }
    }
}

// ── Long-term ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongTermMemory {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Value,
    pub summary: Option<String>,
    pub importance: f64,
    pub confidence: f64,
    pub access_count: i64,
    pub consolidation_count: i64,
    pub created_at: i64,
    pub last_accessed: Option<i64>,
    pub last_reinforced: Option<i64>,
    pub source_memories: Vec<i64>,
    pub tags: Vec<String>,
    pub metadata: Value,
}

impl Scorable for LongTermMemory {
    fn layer(&self) -> Layer {
        Layer::LongTerm
    }

    fn search_text(&self) -> String {
        self.content.to_string()
    }

    fn weight(&self) -> f64 {
        self.importance * self.confidence
    }
}

// ── Episodic ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub description: String,
    pub outcome: Option<String>,
    pub emotional_valence: f64,
    pub success: bool,
    pub participants: Vec<String>,
    pub context: Value,
    pub timestamp: i64,
    pub duration: Option<i64>,
    pub importance: f64,
    pub lessons_learned: Vec<String>,
    pub related_episodes: Vec<i64>,
    pub metadata: Value,
}

impl Scorable for Episode {
    fn layer(&self) -> Layer {
        Layer::Episodic
    }

    fn search_text(&self) -> String {
        format!(
            "{} {} {}",
            self.title,
            self.description,
            self.outcome.as_deref().unwrap_or("")
        )
    }

    fn weight(&self) -> f64 {
        self.importance
    }
}

/// An episode about to be inserted.
#[derive(Debug, Clone)]
pub struct NewEpisode {
    pub kind: String,
    pub title: String,
    pub description: String,
    pub outcome: Option<String>,
    pub emotional_valence: f64,
    pub success: bool,
    pub participants: Vec<String>,
    pub context: Value,
    pub timestamp: i64,
    pub duration: Option<i64>,
    pub importance: f64,
    pub lessons_learned: Vec<String>,
    pub related_episodes: Vec<i64>,
    pub metadata: Value,
}

impl NewEpisode {
    pub fn new(
        kind: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
            description: description.into(),
            outcome: None,
            emotional_valence: 0.0,
            success: false,
            participants: Vec::new(),
            context: Value::Object(Default::default()),
            timestamp: now_ms(),
            duration: None,
            importance: 0.7,
            lessons_learned: Vec::new(),
            related_episodes: Vec::new(),
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = clamp_unit(importance);
        self
    }

    pub fn succeeded(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// ── Cross-tier ──────────────────────────────────────────────────────────────

/// A record from any tier.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MemoryRecord {
    Working(WorkingEntry),
    ShortTerm(ShortTermMemory),
    LongTerm(LongTermMemory),
    Episodic(Episode),
}

impl MemoryRecord {
    fn inner(&self) -> &dyn Scorable {
        match self {
            MemoryRecord::Working(r) => r,
            MemoryRecord::ShortTerm(r) => r,
            MemoryRecord::LongTerm(r) => r,
            MemoryRecord::Episodic(r) => r,
        }
    }

    pub fn importance(&self) -> f64 {
        match self {
            MemoryRecord::Working(r) => r.importance,
            MemoryRecord::ShortTerm(r) => r.importance,
            MemoryRecord::LongTerm(r) => r.importance,
            MemoryRecord::Episodic(r) => r.importance,
        }
    }
}

impl Scorable for MemoryRecord {
    fn layer(&self) -> Layer {
        self.inner().layer()
    }

    fn search_text(&self) -> String {
        self.inner().search_text()
    }

    fn weight(&self) -> f64 {
        self.inner().weight()
    }
}

/// A record to append to one of the writable tiers. Long-term records only
/// come out of consolidation.
#[derive(Debug, Clone)]
pub enum NewRecord {
    Working(Interaction),
    ShortTerm(NewShortTerm),
    Episodic(NewEpisode),
}

/// Handle to a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordRef {
    pub layer: Layer,
    pub id: String,
}

/// A scored, tier-tagged search hit.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub layer: Layer,
    pub memory: MemoryRecord,
    pub score: f64,
    pub highlight: String,
}
