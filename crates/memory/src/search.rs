//! Textual relevance scoring, highlight extraction and cross-tier ranking.
//!
//! A query is split into terms longer than two characters. A record's score
//! is the share of query-term length found in its text, so longer terms
//! weigh more, multiplied by the record's tier weight.

use std::cmp::Ordering;

use crate::types::{Candidate, Scorable};

/// Characters of context kept on each side of a highlighted match.
const HIGHLIGHT_CONTEXT: usize = 40;
/// Characters shown when no query term matches.
const HIGHLIGHT_FALLBACK: usize = 100;

fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Lowercase one char at a time so folded text keeps the original char count.
fn fold(text: &str) -> String {
    text.chars().map(fold_char).collect()
}

/// Lowercased query terms longer than two characters, in query order.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(fold)
        .filter(|term| term.chars().count() > 2)
        .collect()
}

/// Share of total term length matched in `text`, in [0, 1]. Zero when there
/// are no usable terms.
pub fn text_similarity(terms: &[String], text: &str) -> f64 {
    let haystack = fold(text);
    let mut matches = 0.0;
    let mut total_weight = 0.0;
    for term in terms {
        let weight = term.chars().count() as f64;
        total_weight += weight;
        if haystack.contains(term.as_str()) {
            matches += weight;
        }
    }
    if total_weight > 0.0 {
        matches / total_weight
    } else {
        0.0
    }
}

/// Textual similarity scaled by the record's tier weight.
pub fn weighted_score<R: Scorable + ?Sized>(terms: &[String], record: &R) -> f64 {
    text_similarity(terms, &record.search_text()) * record.weight()
}

/// Cosine similarity of two vectors; 0 for empty, mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Excerpt around the first query term found in `text`, or its opening
/// characters when nothing matches.
pub fn extract_highlight(text: &str, terms: &[String]) -> String {
    let chars: Vec<char> = text.chars().collect();
    let folded: Vec<char> = chars.iter().copied().map(fold_char).collect();

    for term in terms {
        let needle: Vec<char> = term.chars().collect();
        if needle.is_empty() || needle.len() > folded.len() {
            continue;
        }
        if let Some(index) = folded.windows(needle.len()).position(|w| w == needle) {
            let start = index.saturating_sub(HIGHLIGHT_CONTEXT);
            let end = (index + needle.len() + HIGHLIGHT_CONTEXT).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            return format!("...{window}...");
        }
    }

    let head: String = chars.iter().take(HIGHLIGHT_FALLBACK).collect();
    format!("{head}...")
}

/// Higher score first; equal scores fall back to tier priority.
pub fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.layer.priority().cmp(&a.layer.priority()))
}

/// Order candidates from every tier into a single ranking.
pub fn rank(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(compare_candidates);
    candidates
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::types::{Interaction, Layer, LongTermMemory, MemoryRecord, ShortTermMemory, WorkingEntry},
        serde_json::json,
    };

    fn candidate(layer: Layer, score: f64) -> Candidate {
        let memory = MemoryRecord::Working(WorkingEntry::from_interaction(Interaction::new(
            "t",
            json!("x"),
        )));
        Candidate {
            layer,
            memory,
            score,
            highlight: String::new(),
        }
    }

    fn short_term(content: serde_json::Value, importance: f64) -> ShortTermMemory {
        ShortTermMemory {
            id: 1,
            session_id: None,
            kind: "note".into(),
            content,
            context: json!({}),
            importance,
            access_count: 0,
            created_at: 0,
            last_accessed: None,
            consolidated: false,
            metadata: json!({}),
        }
    }

    #[test]
    fn terms_drop_short_tokens() {
        assert_eq!(query_terms("Fix the DB auth bug"), vec!["fix", "the", "auth", "bug"]);
        assert!(query_terms("a is to").is_empty());
    }

    #[test]
    fn longer_terms_weigh_more() {
        let terms = query_terms("authentication bug");
        let only_long = text_similarity(&terms, "the authentication flow");
        let only_short = text_similarity(&terms, "a bug somewhere");
        assert!((only_long - 14.0 / 17.0).abs() < 1e-9);
        assert!((only_short - 3.0 / 17.0).abs() < 1e-9);
        assert_eq!(text_similarity(&terms, "AUTHENTICATION BUG"), 1.0);
    }

    #[test]
    fn empty_query_scores_zero() {
        let terms = query_terms("is a of");
        assert_eq!(text_similarity(&terms, "is a of anything"), 0.0);
    }

    #[test]
    fn exact_match_weighting_per_tier() {
        let terms = query_terms("authentication bug");
        let content = json!({ "text": "fixed the authentication bug in login" });

        let ltm = LongTermMemory {
            id: 1,
            kind: "fact".into(),
            content: content.clone(),
            summary: None,
            importance: 0.9,
            confidence: 0.9,
            access_count: 0,
            consolidation_count: 1,
            created_at: 0,
            last_accessed: None,
            last_reinforced: None,
            source_memories: vec![],
            tags: vec![],
            metadata: json!({}),
        };
        assert!((weighted_score(&terms, &ltm) - 0.81).abs() < 1e-9);
        assert!((weighted_score(&terms, &short_term(content, 0.9)) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn highlight_windows_first_matching_term() {
        let text = format!("{}Authentication failed{}", "x".repeat(60), "y".repeat(60));
        let terms = query_terms("missing authentication");
        let highlight = extract_highlight(&text, &terms);
        let expected = format!("...{}Authentication{}...", "x".repeat(40), "y".repeat(40));
        assert_eq!(highlight, expected);
    }

    #[test]
    fn highlight_falls_back_to_prefix() {
        let text = "z".repeat(150);
        let highlight = extract_highlight(&text, &query_terms("nothing here"));
        assert_eq!(highlight, format!("{}...", "z".repeat(100)));
    }

    #[test]
    fn highlight_handles_multibyte_text() {
        let text = "café résumé über naïve";
        let highlight = extract_highlight(text, &query_terms("ÜBER"));
        assert_eq!(highlight, "...café résumé über naïve...");
    }

    #[test]
    fn rank_orders_by_score_descending() {
        let ranked = rank(vec![
            candidate(Layer::LongTerm, 0.4),
            candidate(Layer::Working, 0.9),
            candidate(Layer::ShortTerm, 0.6),
        ]);
        let scores: Vec<f64> = ranked.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.9, 0.6, 0.4]);
    }

    #[test]
    fn ties_break_by_tier_priority() {
        let ranked = rank(vec![
            candidate(Layer::LongTerm, 0.5),
            candidate(Layer::ShortTerm, 0.5),
            candidate(Layer::Episodic, 0.5),
            candidate(Layer::Working, 0.5),
        ]);
        let layers: Vec<Layer> = ranked.iter().map(|c| c.layer).collect();
        assert_eq!(layers, vec![
            Layer::Working,
            Layer::Episodic,
            Layer::ShortTerm,
            Layer::LongTerm
        ]);
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
