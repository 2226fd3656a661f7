// model2vec/ - Static (non-neural) sentence embeddings.
//
// Provides:
// - Embedding table loading from safetensors (F32 / F16 / BF16)
// - Table lookup + mean encoding, fanned out over a worker pool
// - The append / encode_all / clear buffer front end

pub mod encoder;
pub mod static_model;
