//! Vector embedding engine
//!
//! High-level API over the hashed embedder, with a cache for query vectors.

use super::hashed::{HashedConfig, HashedEmbedding};
use dashmap::DashMap;

/// Query cache entries kept before the cache is reset
const QUERY_CACHE_LIMIT: usize = 1024;

/// Vector embedding engine with query caching
///
/// Entry vectors are owned by the store; only query texts are cached here.
pub struct VectorEngine {
    model: HashedEmbedding,
    cache: DashMap<String, Vec<f32>>,
    dimension: usize,
}

impl VectorEngine {
    /// Create VectorEngine with the given number of buckets
    pub fn new(dimension: usize) -> Self {
        let model = HashedEmbedding::new(HashedConfig { dimension });
        let dimension = model.dimension();

        log::info!("VectorEngine ready ({}d hashed bag-of-words)", dimension);

        Self {
            model,
            cache: DashMap::new(),
            dimension,
        }
    }

    /// Embed entry text, uncached
    pub fn embed(&self, text: &str) -> Vec<f32> {
        self.model.embed(text)
    }

    /// Embed a search query with caching
    pub fn embed_query(&self, query: &str) -> Vec<f32> {
        if let Some(cached) = self.cache.get(query) {
            return cached.clone();
        }

        let embedding = self.model.embed(query);
        if self.cache.len() >= QUERY_CACHE_LIMIT {
            self.cache.clear();
        }
        self.cache.insert(query.to_string(), embedding.clone());
        embedding
    }

    /// Cosine similarity between two embeddings
    pub fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }

    /// Get embedding dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Get cache size
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

impl Default for VectorEngine {
    fn default() -> Self {
        Self::new(super::hashed::DEFAULT_DIMENSION)
    }
}

/// Calculate cosine similarity between two vectors
///
/// Mismatched lengths and zero-norm vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
