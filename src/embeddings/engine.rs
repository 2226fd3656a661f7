// engine.rs - Transformer sentence-embedding session: tokenizer + encoder, loaded as a pair.
//
// text → TokenizerAdapter → build_inputs → InferenceEngine::run → PoolingMode::pool
//
// Dropping (or `release`-ing) the session frees both halves together. A different model means a
// new session; a tokenizer is never swapped under a loaded encoder.

use crate::config::embedding::ATTENTION_MASK;
use crate::embeddings::inference::{CandleBertEngine, EngineOptions, InferenceEngine};
use crate::embeddings::model_config::ModelConfig;
use crate::embeddings::pooling::PoolingMode;
use crate::embeddings::tensors::build_inputs;
use crate::embeddings::tokenizer::TokenizerAdapter;
use crate::error::{EmbeddingError, Result};
use crate::similarity::EmbeddingVector;

pub struct SentenceEmbedding<E: InferenceEngine = CandleBertEngine> {
    config: ModelConfig,
    tokenizer: TokenizerAdapter,
    engine: E,
    pooling: PoolingMode,
    dims: Option<usize>,
}

impl SentenceEmbedding<CandleBertEngine> {
    /// Load the tokenizer and the candle encoder named by `config`.
    pub fn load(config: ModelConfig, thread_count: usize) -> Result<Self> {
        log::info!(
            "Loading sentence embedding model '{}' (weights={:?}, tokenizer={:?})",
            config.model_name,
            config.model_weights_locator,
            config.tokenizer_locator
        );
        let tokenizer = TokenizerAdapter::load(&config.tokenizer_locator)?;
        let options = EngineOptions {
            thread_count,
            architecture: config.architecture_source()?,
        };
        let engine = CandleBertEngine::load(&config.model_weights_locator, &options)?;
        Self::with_engine(config, tokenizer, engine)
    }
}

impl<E: InferenceEngine> SentenceEmbedding<E> {
    /// Pair an already-loaded engine with its tokenizer. The tokenizer is configured from
    /// `config` (segment ids, truncation).
    pub fn with_engine(
        config: ModelConfig,
        tokenizer: TokenizerAdapter,
        engine: E,
    ) -> Result<Self> {
        let tokenizer = tokenizer
            .with_token_type_ids(config.uses_token_type_ids)
            .with_max_length(config.max_sequence_length)?;
        let pooling = PoolingMode::from_config(&config);
        log::debug!("Model '{}' pooling mode: {:?}", config.model_name, pooling);
        Ok(Self {
            config,
            tokenizer,
            engine,
            pooling,
            dims: None,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Vector size, known after the first successful encode.
    pub fn dimensions(&self) -> Option<usize> {
        self.dims
    }

    /// Generate a sentence embedding for the given text.
    pub fn encode(&mut self, text: &str) -> Result<EmbeddingVector> {
        let mut vectors = self.encode_many(&[text])?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Shape("encoder returned no vector".into()))
    }

    /// Encode several texts in one padded forward pass. Output order matches input order and
    /// each vector equals what `encode` returns for that text alone.
    pub fn encode_many<S: AsRef<str>>(&mut self, texts: &[S]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch = texts
            .iter()
            .map(|t| self.tokenizer.tokenize(t.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        log::debug!(
            "Encoding {} text(s), longest sequence {} tokens",
            batch.len(),
            batch.iter().map(|r| r.len()).max().unwrap_or(0)
        );

        let inputs = build_inputs(&batch, self.config.uses_token_type_ids, self.engine.device())?;
        let outputs = self.engine.run(&inputs)?;
        let mask = inputs
            .get(ATTENTION_MASK)
            .ok_or_else(|| EmbeddingError::Shape("attention mask missing from inputs".into()))?;
        let vectors = self.pooling.pool(&outputs, mask)?;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::Shape(format!(
                "{} texts in, {} vectors out",
                texts.len(),
                vectors.len()
            )));
        }
        for v in &vectors {
            self.check_dims(v.len())?;
        }
        Ok(vectors)
    }

    /// Free the tokenizer and encoder. Consuming `self` makes a second release impossible.
    pub fn release(self) {
        log::info!("Releasing sentence embedding model '{}'", self.config.model_name);
        drop(self);
    }

    fn check_dims(&mut self, got: usize) -> Result<()> {
        match self.dims {
            Some(expected) if expected != got => Err(EmbeddingError::DimensionMismatch {
                left: expected,
                right: got,
            }),
            Some(_) => Ok(()),
            None => {
                self.dims = Some(got);
                Ok(())
            }
        }
    }
}
