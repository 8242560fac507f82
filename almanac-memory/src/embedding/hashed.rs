//! Hashed bag-of-words embeddings
//!
//! Each lower-cased word token is hashed with SHA-256 and counted into one of
//! `dimension` buckets. No model files, fully deterministic.

use sha2::{Digest, Sha256};

/// Default number of buckets
pub const DEFAULT_DIMENSION: usize = 128;

/// Hashed embedding configuration
#[derive(Debug, Clone)]
pub struct HashedConfig {
    /// Number of hash buckets (default: 128)
    pub dimension: usize,
}

impl Default for HashedConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

/// Hashed bag-of-words embedding function
#[derive(Debug, Clone)]
pub struct HashedEmbedding {
    config: HashedConfig,
}

impl HashedEmbedding {
    pub fn new(config: HashedConfig) -> Self {
        // a zero-width vector would make every bucket index undefined
        let dimension = config.dimension.max(1);
        Self {
            config: HashedConfig { dimension },
        }
    }

    /// Embed single text into a raw count vector
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.config.dimension];
        for token in tokenize(text) {
            vector[self.bucket(&token)] += 1.0;
        }
        vector
    }

    /// Bucket index for a token
    pub fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(prefix) % self.config.dimension as u64) as usize
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }
}

impl Default for HashedEmbedding {
    fn default() -> Self {
        Self::new(HashedConfig::default())
    }
}

/// Lower-cased word tokens; a word is a run of alphanumerics or `_`
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Started Machine-Learning project_v2!"),
            vec!["started", "machine", "learning", "project_v2"]
        );
        assert!(tokenize("  ...  ").is_empty());
    }

    #[test]
    fn test_embed_counts_tokens() {
        let embedder = HashedEmbedding::default();
        let vector = embedder.embed("run run walk");
        assert_eq!(vector.len(), DEFAULT_DIMENSION);
        assert_eq!(vector.iter().sum::<f32>(), 3.0);
        assert!(vector[embedder.bucket("run")] >= 2.0);
    }

    #[test]
    fn test_embed_is_case_insensitive_and_deterministic() {
        let embedder = HashedEmbedding::default();
        assert_eq!(embedder.embed("Project"), embedder.embed("project"));
        assert_eq!(embedder.embed("a b c"), embedder.embed("a b c"));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashedEmbedding::default();
        assert!(embedder.embed("").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_custom_dimension() {
        let embedder = HashedEmbedding::new(HashedConfig { dimension: 16 });
        assert_eq!(embedder.dimension(), 16);
        assert!(embedder.bucket("anything") < 16);
        let zero = HashedEmbedding::new(HashedConfig { dimension: 0 });
        assert_eq!(zero.dimension(), 1);
    }
}
