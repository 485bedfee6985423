/// Provider-agnostic embedding trait for generating vectors from text.
use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// The model name used by this provider (e.g. "text-embedding-3-small").
    fn model_name(&self) -> &str;

    /// The dimensionality of the embeddings produced. Fixed per deployment:
    /// every stored fragment and every query vector has this length.
    fn dimensions(&self) -> usize;
}
