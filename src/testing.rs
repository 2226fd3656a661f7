// testing.rs - Fixtures for unit tests: a tiny tokenizer, fake encoders, a tiny BERT checkpoint,
// safetensors bytes.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use crate::config::embedding::{
    ARCHITECTURE_FILE_NAME, ATTENTION_MASK, INPUT_IDS, LAST_HIDDEN_STATE, SENTENCE_EMBEDDING,
    TOKENIZER_FILE_NAME, WEIGHTS_FILE_NAME,
};
use crate::embeddings::inference::InferenceEngine;
use crate::embeddings::model_config::{ArtifactSource, ModelConfig};
use crate::embeddings::tensors::{ModelInputs, ModelOutputs};
use crate::embeddings::tokenizer::TokenizerAdapter;
use crate::error::{EmbeddingError, Result};

/// Lowercasing word-level tokenizer with BERT-style [CLS]/[SEP] wrapping.
///
/// [PAD]=0 [CLS]=1 [SEP]=2 [UNK]=3 hello=4 world=5 brave=6 new=7
pub const WORD_LEVEL_TOKENIZER_JSON: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [],
  "normalizer": { "type": "Lowercase" },
  "pre_tokenizer": { "type": "Whitespace" },
  "post_processor": { "type": "BertProcessing", "sep": ["[SEP]", 2], "cls": ["[CLS]", 1] },
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": {
      "[PAD]": 0, "[CLS]": 1, "[SEP]": 2, "[UNK]": 3,
      "hello": 4, "world": 5, "brave": 6, "new": 7
    },
    "unk_token": "[UNK]"
  }
}"#;

pub const VOCAB_SIZE: usize = 8;

pub fn word_level_tokenizer() -> TokenizerAdapter {
    let inner = Tokenizer::from_bytes(WORD_LEVEL_TOKENIZER_JSON.as_bytes()).unwrap();
    TokenizerAdapter::from_tokenizer(inner)
}

/// Encoder whose token state for id `k` is `[k, 1, -k/2]`.
///
/// With `pooled_head` it also emits `sentence_embedding` = plain (unmasked) mean of the
/// token states, so tests can tell the two pooling modes apart.
pub struct FakeEngine {
    pub pooled_head: bool,
    device: Device,
}

pub const FAKE_HIDDEN: usize = 3;

impl FakeEngine {
    pub const HIDDEN: usize = FAKE_HIDDEN;

    pub fn new(pooled_head: bool) -> Self {
        Self {
            pooled_head,
            device: Device::Cpu,
        }
    }

    fn token_state(id: i64) -> [f32; FAKE_HIDDEN] {
        let k = id as f32;
        [k, 1.0, -k / 2.0]
    }
}

impl InferenceEngine for FakeEngine {
    fn run(&self, inputs: &ModelInputs) -> Result<ModelOutputs> {
        let ids = inputs
            .get(INPUT_IDS)
            .ok_or_else(|| EmbeddingError::Inference("no input_ids".into()))?
            .to_vec2::<i64>()?;
        if inputs.get(ATTENTION_MASK).is_none() {
            return Err(EmbeddingError::Inference("no attention_mask".into()));
        }

        let batch = ids.len();
        let seq_len = ids.first().map(Vec::len).unwrap_or(0);
        let mut states = Vec::with_capacity(batch * seq_len * Self::HIDDEN);
        let mut pooled = Vec::with_capacity(batch * Self::HIDDEN);
        for row in &ids {
            let mut sum = [0f32; FAKE_HIDDEN];
            for &id in row {
                let s = Self::token_state(id);
                states.extend_from_slice(&s);
                for j in 0..Self::HIDDEN {
                    sum[j] += s[j];
                }
            }
            pooled.extend(sum.iter().map(|x| x / row.len().max(1) as f32));
        }

        let mut outputs = ModelOutputs::new();
        outputs.insert(
            LAST_HIDDEN_STATE,
            Tensor::from_vec(states, (batch, seq_len, Self::HIDDEN), &self.device)?,
        );
        if self.pooled_head {
            outputs.insert(
                SENTENCE_EMBEDDING,
                Tensor::from_vec(pooled, (batch, Self::HIDDEN), &self.device)?,
            );
        }
        Ok(outputs)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

pub struct FailingEngine {
    device: Device,
}

impl FailingEngine {
    pub fn new() -> Self {
        Self { device: Device::Cpu }
    }
}

impl InferenceEngine for FailingEngine {
    fn run(&self, _inputs: &ModelInputs) -> Result<ModelOutputs> {
        Err(EmbeddingError::Inference("session crashed".into()))
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// Serialize a `[rows, dims]` F32 table the way Model2Vec ships it.
pub fn static_table_safetensors(name: &str, rows: &[Vec<f32>]) -> Vec<u8> {
    let dims = rows.first().map(Vec::len).unwrap_or(0);
    let bytes: Vec<u8> = rows
        .iter()
        .flatten()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let view = safetensors::tensor::TensorView::new(
        safetensors::Dtype::F32,
        vec![rows.len(), dims],
        &bytes,
    )
    .unwrap();
    safetensors::tensor::serialize(vec![(name.to_string(), view)], &None::<HashMap<String, String>>)
        .unwrap()
}

/// Same table stored as F16.
pub fn static_table_safetensors_f16(name: &str, rows: &[Vec<f32>]) -> Vec<u8> {
    let dims = rows.first().map(Vec::len).unwrap_or(0);
    let bytes: Vec<u8> = rows
        .iter()
        .flatten()
        .flat_map(|v| half::f16::from_f32(*v).to_le_bytes())
        .collect();
    let view = safetensors::tensor::TensorView::new(
        safetensors::Dtype::F16,
        vec![rows.len(), dims],
        &bytes,
    )
    .unwrap();
    safetensors::tensor::serialize(vec![(name.to_string(), view)], &None::<HashMap<String, String>>)
        .unwrap()
}

pub const TINY_BERT_HIDDEN: usize = 8;

/// `config.json` of a one-layer BERT over the word-level fixture vocab.
pub fn tiny_bert_config_json() -> serde_json::Value {
    serde_json::json!({
        "vocab_size": VOCAB_SIZE,
        "hidden_size": TINY_BERT_HIDDEN,
        "num_hidden_layers": 1,
        "num_attention_heads": 2,
        "intermediate_size": 16,
        "hidden_act": "gelu",
        "hidden_dropout_prob": 0.0,
        "max_position_embeddings": 32,
        "type_vocab_size": 2,
        "initializer_range": 0.02,
        "layer_norm_eps": 1e-12,
        "pad_token_id": 0,
        "position_embedding_type": "absolute",
        "use_cache": false,
        "classifier_dropout": null,
        "model_type": "bert"
    })
}

/// Write a randomly initialized tiny BERT (weights, config.json, tokenizer.json) into `dir`
/// and return a pooling config that points at it.
pub fn write_tiny_bert(dir: &Path) -> ModelConfig {
    let config_json = tiny_bert_config_json();
    let bert_config: BertConfig = serde_json::from_value(config_json.clone()).unwrap();

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    BertModel::load(vb, &bert_config).unwrap();

    let weights = dir.join(WEIGHTS_FILE_NAME);
    varmap.save(&weights).unwrap();
    std::fs::write(dir.join(ARCHITECTURE_FILE_NAME), config_json.to_string()).unwrap();
    std::fs::write(dir.join(TOKENIZER_FILE_NAME), WORD_LEVEL_TOKENIZER_JSON).unwrap();

    ModelConfig {
        model_name: "tiny-bert".into(),
        model_weights_locator: ArtifactSource::Path(weights),
        tokenizer_locator: ArtifactSource::Path(dir.join(TOKENIZER_FILE_NAME)),
        architecture_locator: None,
        uses_token_type_ids: false,
        output_tensor_name: LAST_HIDDEN_STATE.into(),
        normalize_embeddings: true,
        max_sequence_length: None,
    }
}
