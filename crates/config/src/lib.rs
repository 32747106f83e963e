//! Configuration loading, validation, and env substitution.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, data_dir, discover_and_load, find_config_file, load_config},
    schema::{EmbeddingsConfig, Eviction, FloorsConfig, MemorySection, RecallConfig, SearchSection},
};
