//! Per-tier search adapters: scan one tier, score what comes back, drop
//! anything under the tier's acceptance floor.

use std::sync::Arc;

use crate::{
    error::Result,
    manager::MemoryManager,
    search::{extract_highlight, query_terms, weighted_score},
    store::ScanFilter,
    types::{Candidate, Layer, MemoryRecord, Scorable},
};

/// A query prepared once and shared by every tier.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub terms: Vec<String>,
    /// Query embedding, when the embedding endpoint answered.
    pub embedding: Option<Arc<Vec<f32>>>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let terms = query_terms(&text);
        Self {
            text,
            terms,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Option<Arc<Vec<f32>>>) -> Self {
        self.embedding = embedding;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TierAdapter {
    layer: Layer,
    filter: ScanFilter,
    floor: f64,
}

impl TierAdapter {
    pub fn new(layer: Layer, floor: f64) -> Self {
        Self {
            layer,
            filter: ScanFilter::default(),
            floor,
        }
    }

    /// Restrict the scan to records created inside `[start, end]`.
    pub fn within(mut self, start: i64, end: i64) -> Self {
        self.filter = ScanFilter::between(start, end);
        self
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    pub async fn search(
        &self,
        manager: &MemoryManager,
        query: &SearchQuery,
        limit: usize,
    ) -> Result<Vec<Candidate>> {
        let records = manager.scan(self.layer, &self.filter, limit).await?;
        Ok(score_records(records, &query.terms, self.floor))
    }
}

/// Score `records` against `terms`, keeping those at or above `floor`.
/// A zero score never passes, whatever the floor.
pub fn score_records(records: Vec<MemoryRecord>, terms: &[String], floor: f64) -> Vec<Candidate> {
    records
        .into_iter()
        .filter_map(|memory| {
            let score = weighted_score(terms, &memory);
            if score <= 0.0 || score < floor {
                return None;
            }
            let highlight = extract_highlight(&memory.search_text(), terms);
            Some(Candidate {
                layer: memory.layer(),
                memory,
                score,
                highlight,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::types::{Interaction, LongTermMemory, ShortTermMemory, WorkingEntry},
        serde_json::json,
    };

    fn working(text: &str, importance: f64) -> MemoryRecord {
        MemoryRecord::Working(WorkingEntry::from_interaction(
            Interaction::new("interaction", json!(text)).with_importance(importance),
        ))
    }

    #[test]
    fn floor_drops_weak_matches() {
        let terms = query_terms("database migration rollback procedure");
        let records = vec![
            working("the database migration rollback procedure worked", 0.5),
            working("unrelated database chatter", 0.5),
        ];
        let kept = score_records(records, &terms, 0.3);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].score, 1.0);
        assert_eq!(kept[0].layer, Layer::Working);
        assert!(kept[0].highlight.contains("database"));
    }

    fn short_term(text: &str, importance: f64) -> MemoryRecord {
        MemoryRecord::ShortTerm(ShortTermMemory {
            id: 1,
            session_id: None,
            kind: "note".into(),
            content: json!(text),
            context: json!({}),
            importance,
            access_count: 0,
            created_at: 0,
            last_accessed: None,
            consolidated: false,
            metadata: json!({}),
        })
    }

    fn long_term(text: &str, importance: f64, confidence: f64) -> MemoryRecord {
        MemoryRecord::LongTerm(LongTermMemory {
            id: 2,
            kind: "fact".into(),
            content: json!(text),
            summary: None,
            importance,
            confidence,
            access_count: 0,
            consolidation_count: 1,
            created_at: 0,
            last_accessed: None,
            last_reinforced: None,
            source_memories: vec![],
            tags: vec![],
            metadata: json!({}),
        })
    }

    #[test]
    fn floor_applies_to_weighted_score() {
        let terms = query_terms("kubernetes upgrade");
        let text = "kubernetes upgrade finished";

        // Full text match, but importance 0.1 puts the adjusted score at 0.1.
        assert!(score_records(vec![short_term(text, 0.1)], &terms, 0.2).is_empty());
        let kept = score_records(vec![short_term(text, 0.5)], &terms, 0.2);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].score - 0.5).abs() < 1e-9);

        // 0.4 * 0.5 = 0.2 sits under the long-term floor of 0.25.
        assert!(score_records(vec![long_term(text, 0.4, 0.5)], &terms, 0.25).is_empty());
        let kept = score_records(vec![long_term(text, 0.5, 0.5)], &terms, 0.25);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].layer, Layer::LongTerm);
    }

    #[test]
    fn zero_scores_never_pass() {
        let terms = query_terms("on it");
        let kept = score_records(vec![working("on it now", 1.0)], &terms, 0.0);
        assert!(kept.is_empty());
    }

    #[test]
    fn query_prepares_terms() {
        let q = SearchQuery::new("Authentication Bug in db");
        assert_eq!(q.terms, vec!["authentication", "bug"]);
        assert!(q.embedding.is_none());
    }
}
