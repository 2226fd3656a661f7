// sentence_embeddings - text → fixed-length vectors, and cosine similarity between them.
//
// Two pipelines:
// - embeddings: tokenizer → BERT forward pass → pooling/normalization
// - model2vec: tokenizer → static table lookup + mean, batched across worker threads

pub mod config;
pub mod embeddings;
pub mod error;
pub mod model2vec;
pub mod similarity;

#[cfg(test)]
mod testing;

pub use embeddings::engine::SentenceEmbedding;
pub use embeddings::model_config::{ArtifactSource, ModelConfig, ModelPreset};
pub use error::{EmbeddingError, Result};
pub use model2vec::encoder::Model2VecEncoder;
pub use model2vec::static_model::{positive_threads, StaticOptions};
pub use similarity::{cosine_similarity, EmbeddingVector};
