// embeddings/ - Transformer sentence embedding pipeline using candle (pure Rust).
//
// Provides:
// - Model configuration and presets
// - Tokenizer adapter and tensor builder
// - The inference boundary (candle BERT engine)
// - Masked mean pooling + L2 normalization, or pass-through of a pooled output

pub mod engine;
pub mod inference;
pub mod model_config;
pub mod pooling;
pub mod tensors;
pub mod tokenizer;
