/// Pluggable embedding model: text in, vector out.
use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// The model name used by this provider (e.g. "nomic-embed-text").
    fn model_name(&self) -> &str;

    /// A stable key identifying this provider configuration, so vectors from
    /// different models are never mixed up.
    fn provider_key(&self) -> &str;
}
