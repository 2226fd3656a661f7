// encoder.rs - Accumulate-then-batch-encode front end for a StaticModel.
//
// Buffer lifecycle: Empty → append(s) → Accumulating → encode_all → (EncodingInFlight) →
// Accumulating → clear → Empty. Clearing is a separate step: encode_all leaves the buffer as
// is, so a second encode_all without clear() re-encodes the same entries.

use crate::embeddings::model_config::ArtifactSource;
use crate::error::{EmbeddingError, Result};
use crate::model2vec::static_model::{StaticModel, StaticOptions};
use crate::similarity::EmbeddingVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Empty,
    Accumulating,
    EncodingInFlight,
}

/// Ordered pending inputs of one encoder. Single writer.
#[derive(Debug)]
pub struct SequenceBuffer {
    items: Vec<String>,
    state: BufferState,
}

impl Default for SequenceBuffer {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            state: BufferState::Empty,
        }
    }
}

impl SequenceBuffer {
    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, text: String) -> Result<()> {
        if self.state == BufferState::EncodingInFlight {
            return Err(EmbeddingError::Encode("append while an encode is in flight".into()));
        }
        self.items.push(text);
        self.state = BufferState::Accumulating;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.state = BufferState::Empty;
    }
}

pub struct Model2VecEncoder {
    model: Option<StaticModel>,
    buffer: SequenceBuffer,
}

impl Model2VecEncoder {
    pub fn load(
        embeddings: &ArtifactSource,
        tokenizer: &ArtifactSource,
        options: StaticOptions,
    ) -> Result<Self> {
        Ok(Self::new(StaticModel::load(embeddings, tokenizer, options)?))
    }

    pub fn new(model: StaticModel) -> Self {
        Self {
            model: Some(model),
            buffer: SequenceBuffer::default(),
        }
    }

    pub fn state(&self) -> BufferState {
        self.buffer.state()
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Embedding size, or `None` once released.
    pub fn dims(&self) -> Option<usize> {
        self.model.as_ref().map(StaticModel::dims)
    }

    /// Worker pool size chosen at load, or `None` once released.
    pub fn max_threads(&self) -> Option<usize> {
        self.model.as_ref().map(StaticModel::max_threads)
    }

    pub fn is_released(&self) -> bool {
        self.model.is_none()
    }

    pub fn append(&mut self, text: impl Into<String>) -> Result<()> {
        if self.model.is_none() {
            return Err(EmbeddingError::Encode("append on a released encoder".into()));
        }
        self.buffer.push(text.into())
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Embed every buffered sequence, in append order. Does not clear the buffer.
    pub fn encode_all(&mut self, thread_count: i64) -> Result<Vec<EmbeddingVector>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| EmbeddingError::Encode("encoder was released".into()))?;
        if self.buffer.is_empty() {
            return Err(EmbeddingError::Encode("sequence buffer is empty".into()));
        }

        self.buffer.state = BufferState::EncodingInFlight;
        let result = model.encode(&self.buffer.items, thread_count);
        self.buffer.state = BufferState::Accumulating;

        match &result {
            Ok(v) => log::debug!("Encoded {} buffered sequence(s)", v.len()),
            Err(e) => log::error!("Batched static encode failed: {e}"),
        }
        result
    }

    /// append(all) → encode_all → clear. The buffer is cleared on every exit path.
    pub fn encode_batch<S: AsRef<str>>(
        &mut self,
        texts: &[S],
        thread_count: i64,
    ) -> Result<Vec<EmbeddingVector>> {
        if !self.buffer.is_empty() {
            log::warn!(
                "encode_batch called with {} stale buffered sequence(s); they are encoded too",
                self.buffer.len()
            );
        }
        let result = texts
            .iter()
            .try_for_each(|t| self.append(t.as_ref()))
            .and_then(|()| self.encode_all(thread_count));
        self.clear();
        result
    }

    /// Drop the table and tokenizer. Encoding afterwards fails with an encode error.
    pub fn release(&mut self) {
        if self.model.take().is_some() {
            log::info!("Static embedding model released");
        } else {
            log::warn!("Static embedding model released twice; ignoring");
        }
        self.buffer.clear();
    }
}
