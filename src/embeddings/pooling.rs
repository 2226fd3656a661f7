// pooling.rs - Turns encoder outputs into one vector per input sequence.
//
// Two modes, picked from ModelConfig:
// - Direct: the named output already is the sentence vector (exported pooling head); copy it.
// - MaskedMean: average the first output's token states over real tokens, then L2-normalize.
//
// Both are pure functions of (outputs, attention mask).

use candle_core::{DType, Tensor};

use crate::embeddings::model_config::ModelConfig;
use crate::embeddings::tensors::ModelOutputs;
use crate::error::{EmbeddingError, Result};
use crate::similarity::EmbeddingVector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolingMode {
    Direct { output_name: String },
    MaskedMean,
}

impl PoolingMode {
    pub fn from_config(config: &ModelConfig) -> Self {
        if config.normalize_embeddings {
            Self::MaskedMean
        } else {
            Self::Direct {
                output_name: config.output_tensor_name.clone(),
            }
        }
    }

    /// `attention_mask` is the `[batch, seq_len]` tensor that was fed to the encoder.
    pub fn pool(
        &self,
        outputs: &ModelOutputs,
        attention_mask: &Tensor,
    ) -> Result<Vec<EmbeddingVector>> {
        let batch = attention_mask.dim(0)?;
        match self {
            Self::Direct { output_name } => {
                let pooled = outputs
                    .get(output_name)
                    .ok_or_else(|| EmbeddingError::MissingOutput(output_name.clone()))?;
                copy_rows(pooled, batch)
            }
            Self::MaskedMean => {
                let (name, hidden) = outputs
                    .first()
                    .ok_or_else(|| EmbeddingError::MissingOutput("<first output>".into()))?;
                check_token_states(name, hidden, attention_mask)?;
                let pooled = mean_pooling(hidden, attention_mask)?;
                let normalized = l2_normalize(&pooled)?;
                Ok(normalized.to_vec2::<f32>()?)
            }
        }
    }
}

/// Attention-mask-aware mean pooling.
///
/// input_embeds: [batch, seq_len, hidden_size]
/// attention_mask: [batch, seq_len] (1 for real tokens, 0 for padding)
/// output: [batch, hidden_size]
///
/// The divisor is max(1, real token count), so an all-zero mask gives a zero row.
pub fn mean_pooling(input_embeds: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let input_embeds = input_embeds.to_dtype(DType::F32)?;

    // [batch, seq_len] → [batch, seq_len, 1]
    let mask = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;

    let sum_embeddings = input_embeds.broadcast_mul(&mask)?.sum(1)?;
    let token_counts = mask.sum(1)?.clamp(1f64, f64::MAX)?;

    Ok(sum_embeddings.broadcast_div(&token_counts)?)
}

/// L2 normalize each row. Rows with norm exactly zero are returned unchanged.
pub fn l2_normalize(tensor: &Tensor) -> Result<Tensor> {
    let norm = tensor.sqr()?.sum_keepdim(1)?.sqrt()?;
    let is_zero = norm.eq(&norm.zeros_like()?)?;
    let divisor = is_zero.where_cond(&norm.ones_like()?, &norm)?;
    Ok(tensor.broadcast_div(&divisor)?)
}

fn check_token_states(name: &str, hidden: &Tensor, attention_mask: &Tensor) -> Result<()> {
    let dims = hidden.dims();
    if dims.len() != 3 || dims[..2] != *attention_mask.dims() {
        return Err(EmbeddingError::Shape(format!(
            "output '{name}' has shape {:?}, expected [{}, hidden]",
            dims,
            attention_mask
                .dims()
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }
    Ok(())
}

fn copy_rows(pooled: &Tensor, batch: usize) -> Result<Vec<EmbeddingVector>> {
    let pooled = pooled.to_dtype(DType::F32)?;
    match pooled.rank() {
        1 if batch == 1 => Ok(vec![pooled.to_vec1::<f32>()?]),
        r if r >= 2 && pooled.dim(0)? == batch => Ok(pooled.flatten_from(1)?.to_vec2::<f32>()?),
        _ => Err(EmbeddingError::Shape(format!(
            "pooled output has shape {:?} for a batch of {batch}",
            pooled.dims()
        ))),
    }
}
