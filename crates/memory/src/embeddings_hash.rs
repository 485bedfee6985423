/// Deterministic, offline embedding provider.
///
/// Each lowercase word is hashed with SHA-256 into one of `dims` buckets and
/// the bag-of-words vector is L2-normalized. Texts sharing words get a
/// positive cosine similarity, texts with no words in common score 0. Meant
/// for tests and local development without network access.
use {
    async_trait::async_trait,
    sha2::{Digest, Sha256},
};

use crate::embeddings::EmbeddingProvider;

pub const DEFAULT_HASH_DIMENSIONS: usize = 256;

pub struct HashEmbeddingProvider {
    dims: usize,
    model: String,
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSIONS)
    }
}

impl HashEmbeddingProvider {
    pub fn new(dims: usize) -> Self {
        let dims = dims.max(1);
        Self {
            dims,
            model: format!("hash-bow-{dims}"),
        }
    }

    /// Synchronous embedding, shared by the trait impl and tests.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in words(text) {
            v[self.bucket(&word)] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }

    fn bucket(&self, word: &str) -> usize {
        let digest = Sha256::digest(word.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(head) % self.dims as u64) as usize
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}
