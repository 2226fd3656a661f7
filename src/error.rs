// error.rs - Failure taxonomy shared by the transformer and static embedding paths.
//
// Nothing in the core retries. Each variant says who is at fault:
// - Load / Tokenization / Inference: bad artifacts or bad input, surfaced to the caller
// - Shape / DimensionMismatch: an internal invariant broke (programming error)
// - Encode: released handle or a failed worker during a batched encode

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("failed to load model artifacts: {0}")]
    Load(String),

    #[error("tokenization failed: {0}")]
    Tokenization(String),

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("model output '{0}' missing from run result")]
    MissingOutput(String),

    #[error("dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;
