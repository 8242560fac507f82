//! Embedding module for semantic search
//!
//! Uses hashed bag-of-words vectors instead of a trained model. Orthogonal
//! vectors score zero; distinct tokens can still share a bucket, so texts with
//! no common word may score above zero.

mod engine;
mod hashed;

pub use engine::{cosine_similarity, VectorEngine};
pub use hashed::{tokenize, HashedConfig, HashedEmbedding, DEFAULT_DIMENSION};
