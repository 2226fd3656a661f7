// tensors.rs - Shapes tokenizer output into the batch-first i64 tensors an encoder expects.

use candle_core::{Device, Tensor};

use crate::config::embedding::{ATTENTION_MASK, INPUT_IDS, TOKEN_TYPE_IDS};
use crate::embeddings::tokenizer::TokenizeResult;
use crate::error::{EmbeddingError, Result};

/// Tensors keyed by name, in insertion order (so "the first output" is well defined).
#[derive(Debug, Clone, Default)]
pub struct NamedTensors {
    entries: Vec<(String, Tensor)>,
}

impl NamedTensors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = tensor;
        } else {
            self.entries.push((name, tensor));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn first(&self) -> Option<(&str, &Tensor)> {
        self.entries.first().map(|(n, t)| (n.as_str(), t))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub type ModelInputs = NamedTensors;
pub type ModelOutputs = NamedTensors;

/// Build `input_ids`, `attention_mask` (and `token_type_ids` when the model wants them),
/// each shaped `[batch, seq_len]`.
///
/// Batches of more than one sequence are right-padded to the longest one with id 0 / mask 0.
pub fn build_inputs(
    batch: &[TokenizeResult],
    uses_token_type_ids: bool,
    device: &Device,
) -> Result<ModelInputs> {
    if batch.is_empty() {
        return Err(EmbeddingError::Shape("cannot build tensors for an empty batch".into()));
    }

    for (i, r) in batch.iter().enumerate() {
        check_lengths(i, r, uses_token_type_ids)?;
    }

    let rows = batch.len();
    let seq_len = batch.iter().map(TokenizeResult::len).max().unwrap_or(0);

    let mut ids = vec![0i64; rows * seq_len];
    let mut mask = vec![0i64; rows * seq_len];
    let mut types = vec![0i64; rows * seq_len];

    for (row, r) in batch.iter().enumerate() {
        let offset = row * seq_len;
        ids[offset..offset + r.len()].copy_from_slice(&r.ids);
        mask[offset..offset + r.len()].copy_from_slice(&r.attention_mask);
        if let Some(tt) = &r.token_type_ids {
            types[offset..offset + r.len()].copy_from_slice(tt);
        }
    }

    let mut inputs = ModelInputs::new();
    inputs.insert(INPUT_IDS, Tensor::from_vec(ids, (rows, seq_len), device)?);
    inputs.insert(ATTENTION_MASK, Tensor::from_vec(mask, (rows, seq_len), device)?);
    if uses_token_type_ids {
        inputs.insert(TOKEN_TYPE_IDS, Tensor::from_vec(types, (rows, seq_len), device)?);
    }
    Ok(inputs)
}

fn check_lengths(index: usize, r: &TokenizeResult, uses_token_type_ids: bool) -> Result<()> {
    if r.attention_mask.len() != r.ids.len() {
        return Err(EmbeddingError::Shape(format!(
            "sequence {index}: {} ids but {} attention mask entries",
            r.ids.len(),
            r.attention_mask.len()
        )));
    }
    match (&r.token_type_ids, uses_token_type_ids) {
        (Some(tt), _) if tt.len() != r.ids.len() => Err(EmbeddingError::Shape(format!(
            "sequence {index}: {} ids but {} token type ids",
            r.ids.len(),
            tt.len()
        ))),
        (None, true) => Err(EmbeddingError::Shape(format!(
            "sequence {index}: model requires token_type_ids but tokenizer produced none"
        ))),
        _ => Ok(()),
    }
}
