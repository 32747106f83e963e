#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use {
    recall_memory::{
        Layer, MemoryConfig, MemoryManager, MemoryRecord, NewShortTerm, SearchConfig,
        SearchOptions, SemanticSearch,
    },
    serde_json::json,
};

fn config(dir: &tempfile::TempDir) -> MemoryConfig {
    MemoryConfig {
        db_path: dir.path().join("memory.db").to_string_lossy().into_owned(),
        ..Default::default()
    }
}

#[tokio::test]
async fn consolidated_memories_survive_restart_and_stay_searchable() {
    let dir = tempfile::tempdir().unwrap();

    {
        let manager = MemoryManager::open(config(&dir)).await.unwrap();
        manager
            .store_short_term(
                NewShortTerm::new("fact", json!("authentication bug in login")).with_importance(0.9),
            )
            .await
            .unwrap();
        let report = manager.consolidate().await.unwrap();
        assert_eq!(report.promoted, 1);
        manager.end_session().await.unwrap();
    }

    let manager = Arc::new(MemoryManager::open(config(&dir)).await.unwrap());
    let search = SemanticSearch::new(Arc::clone(&manager), SearchConfig::default());
    let response = search
        .search("authentication bug", &SearchOptions::default())
        .await
        .unwrap();

    // Only the long-term twin is visible; the short-term source is consolidated.
    assert_eq!(response.total_results, 1);
    let hit = &response.results[0];
    assert_eq!(hit.layer, Layer::LongTerm);
    assert!((hit.score - 0.9 * 0.6).abs() < 1e-9);

    // A second identical observation corroborates instead of duplicating.
    manager
        .store_short_term(
            NewShortTerm::new("fact", json!("authentication bug in login")).with_importance(0.9),
        )
        .await
        .unwrap();
    let report = manager.consolidate().await.unwrap();
    assert_eq!(report.reinforced, 1);

    let response = search
        .search("authentication bug", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(response.total_results, 1);
    let MemoryRecord::LongTerm(memory) = &response.results[0].memory else {
        panic!("expected a long-term hit");
    };
    assert!((memory.confidence - 0.7).abs() < 1e-9);
    assert_eq!(memory.consolidation_count, 2);
    assert_eq!(memory.source_memories.len(), 2);

    let stats = manager.stats().await.unwrap();
    assert_eq!(stats.long_term_memories, 1);
    assert_eq!(stats.short_term_memories, 0);
}
