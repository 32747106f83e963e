//! Tiered memory: working buffer → short-term → long-term, plus episodes,
//! persisted in SQLite and searched across all tiers at once.

pub mod config;
pub mod embeddings;
pub mod embeddings_cache;
pub mod embeddings_ollama;
pub mod error;
pub mod manager;
pub mod recall;
pub mod schema;
pub mod search;
pub mod store;
pub mod store_sqlite;
pub mod tiers;
pub mod types;
pub mod working;

pub use {
    config::{CacheEviction, EmbeddingConfig, MemoryConfig, SearchConfig},
    error::{MemoryError, Result},
    manager::{ConsolidationReport, MemoryManager, MemoryStats},
    recall::{
        RangeOptions, SearchOptions, SearchResponse, SearchStats, SemanticSearch,
        TimeRangeResponse,
    },
    types::{
        Candidate, Episode, Interaction, Layer, LongTermMemory, MemoryRecord, NewEpisode,
        NewRecord, NewShortTerm, RecordRef, ShortTermMemory, WorkingEntry,
    },
};
