// inference.rs - The forward-pass boundary.
//
// The core only knows the names and shapes of the tensors it sends and receives. Anything that
// can map named inputs to named outputs can sit behind `InferenceEngine`; CandleBertEngine is the
// one we ship (BERT-family safetensors checkpoints on CPU).

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};

use crate::config::embedding::{ATTENTION_MASK, INPUT_IDS, LAST_HIDDEN_STATE, TOKEN_TYPE_IDS};
use crate::embeddings::model_config::ArtifactSource;
use crate::embeddings::tensors::{ModelInputs, ModelOutputs};
use crate::error::{EmbeddingError, Result};

pub trait InferenceEngine {
    /// One forward pass. Callers hold `&mut` on the owning session, so runs on one engine
    /// never overlap.
    fn run(&self, inputs: &ModelInputs) -> Result<ModelOutputs>;

    /// Device the input tensors must live on.
    fn device(&self) -> &Device;
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub thread_count: usize,
    /// BERT `config.json`.
    pub architecture: ArtifactSource,
}

pub struct CandleBertEngine {
    model: BertModel,
    device: Device,
    pool: rayon::ThreadPool,
}

impl CandleBertEngine {
    pub fn load(weights: &ArtifactSource, options: &EngineOptions) -> Result<Self> {
        let device = Device::Cpu;

        let config_bytes = options.architecture.read_bytes()?;
        let config: BertConfig = serde_json::from_slice(&config_bytes).map_err(|e| {
            EmbeddingError::Load(format!("parse {:?}: {e}", options.architecture))
        })?;

        log::info!(
            "Loading BERT encoder: hidden_size={}, layers={}, heads={}",
            config.hidden_size,
            config.num_hidden_layers,
            config.num_attention_heads,
        );

        let vb = match weights {
            ArtifactSource::Path(p) => unsafe {
                VarBuilder::from_mmaped_safetensors(&[p.clone()], DType::F32, &device)
                    .map_err(|e| EmbeddingError::Load(format!("weights {}: {e}", p.display())))?
            },
            ArtifactSource::Bytes(b) => {
                VarBuilder::from_buffered_safetensors(b.clone(), DType::F32, &device)
                    .map_err(|e| EmbeddingError::Load(format!("weights from bytes: {e}")))?
            }
        };

        let model = BertModel::load(vb, &config)
            .map_err(|e| EmbeddingError::Load(format!("build BERT model: {e}")))?;

        let threads = options.thread_count.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("bert-infer-{i}"))
            .build()
            .map_err(|e| EmbeddingError::Load(format!("inference thread pool: {e}")))?;

        log::info!("BERT encoder loaded (dims={}, threads={})", config.hidden_size, threads);

        Ok(Self { model, device, pool })
    }

    /// Threads in the forward-pass pool.
    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl InferenceEngine for CandleBertEngine {
    fn run(&self, inputs: &ModelInputs) -> Result<ModelOutputs> {
        let input_ids = inputs
            .get(INPUT_IDS)
            .ok_or_else(|| EmbeddingError::Inference(format!("missing input '{INPUT_IDS}'")))?;
        let attention_mask = inputs
            .get(ATTENTION_MASK)
            .ok_or_else(|| EmbeddingError::Inference(format!("missing input '{ATTENTION_MASK}'")))?;

        // Single-segment models still need a (zero) segment tensor.
        let token_type_ids = match inputs.get(TOKEN_TYPE_IDS) {
            Some(t) => t.clone(),
            None => input_ids.zeros_like()?,
        };

        // → [batch, seq_len, hidden_size]
        let hidden = self
            .pool
            .install(|| self.model.forward(input_ids, &token_type_ids, Some(attention_mask)))
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;

        let mut outputs = ModelOutputs::new();
        outputs.insert(LAST_HIDDEN_STATE, hidden);
        Ok(outputs)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}
