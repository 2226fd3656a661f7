// static_model.rs - Model2Vec-style static embeddings: token table lookup + mean, no forward pass.
//
// The table is the `embeddings` tensor of a safetensors file, shaped [vocab, dims]. A sentence
// vector is the element-wise mean of the rows of its token ids.

use std::fs::File;

use memmap2::Mmap;
use rayon::prelude::*;
use safetensors::{Dtype, SafeTensors};

use crate::config;
use crate::embeddings::model_config::ArtifactSource;
use crate::embeddings::tokenizer::TokenizerAdapter;
use crate::error::{EmbeddingError, Result};
use crate::similarity::{l2_normalize, EmbeddingVector};

/// Row-major `[rows, dims]` f32 table.
pub struct EmbeddingTable {
    rows: usize,
    dims: usize,
    data: Vec<f32>,
}

impl EmbeddingTable {
    pub fn new(data: Vec<f32>, dims: usize) -> Result<Self> {
        if dims == 0 || data.len() % dims != 0 {
            return Err(EmbeddingError::Load(format!(
                "{} values do not form rows of {dims}",
                data.len()
            )));
        }
        Ok(Self {
            rows: data.len() / dims,
            dims,
            data,
        })
    }

    /// Read tensor `name` from a safetensors blob. F32, F16 and BF16 tables are accepted.
    pub fn from_safetensors(bytes: &[u8], name: &str) -> Result<Self> {
        let tensors = SafeTensors::deserialize(bytes)
            .map_err(|e| EmbeddingError::Load(format!("parse safetensors: {e}")))?;
        let view = tensors
            .tensor(name)
            .map_err(|e| EmbeddingError::Load(format!("tensor '{name}': {e}")))?;

        let &[_, dims] = view.shape() else {
            return Err(EmbeddingError::Load(format!(
                "tensor '{name}' has shape {:?}, expected [vocab, dims]",
                view.shape()
            )));
        };

        let raw = view.data();
        let data: Vec<f32> = match view.dtype() {
            Dtype::F32 => raw
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            Dtype::F16 => raw
                .chunks_exact(2)
                .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect(),
            Dtype::BF16 => raw
                .chunks_exact(2)
                .map(|b| half::bf16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect(),
            other => {
                return Err(EmbeddingError::Load(format!(
                    "tensor '{name}' has unsupported dtype {other:?}"
                )))
            }
        };
        Self::new(data, dims)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn row(&self, id: usize) -> Option<&[f32]> {
        (id < self.rows).then(|| &self.data[id * self.dims..(id + 1) * self.dims])
    }

    /// Element-wise mean of the rows for `ids`. No ids → zero vector.
    pub fn mean_of(&self, ids: &[u32]) -> Result<EmbeddingVector> {
        let mut sentence = vec![0.0f32; self.dims];
        for &id in ids {
            let row = self.row(id as usize).ok_or_else(|| {
                EmbeddingError::Encode(format!("token id {id} outside table of {} rows", self.rows))
            })?;
            for (acc, x) in sentence.iter_mut().zip(row) {
                *acc += x;
            }
        }
        if !ids.is_empty() {
            let n = ids.len() as f32;
            for acc in sentence.iter_mut() {
                *acc /= n;
            }
        }
        Ok(sentence)
    }
}

/// Load-time settings of a [`StaticModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticOptions {
    /// Size of the worker pool built at load. Per-call thread counts are capped by it.
    pub max_threads: usize,
    /// L2-normalize each sentence vector after averaging.
    pub normalize: bool,
}

impl Default for StaticOptions {
    fn default() -> Self {
        Self {
            max_threads: config::model2vec::DEFAULT_THREAD_COUNT,
            normalize: false,
        }
    }
}

/// Tokenizer + table + worker pool, loaded and released together.
pub struct StaticModel {
    tokenizer: TokenizerAdapter,
    table: EmbeddingTable,
    normalize: bool,
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for StaticModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticModel")
            .field("rows", &self.table.rows())
            .field("dims", &self.table.dims())
            .field("normalize", &self.normalize)
            .finish_non_exhaustive()
    }
}

impl StaticModel {
    pub fn load(
        embeddings: &ArtifactSource,
        tokenizer: &ArtifactSource,
        options: StaticOptions,
    ) -> Result<Self> {
        let tensor_name = config::model2vec::EMBEDDINGS_TENSOR_NAME;
        let table = match embeddings {
            ArtifactSource::Path(p) => {
                let file = File::open(p)
                    .map_err(|e| EmbeddingError::Load(format!("open {}: {e}", p.display())))?;
                // SAFETY: read-only map, dropped before this function returns.
                let mmap = unsafe { Mmap::map(&file) }
                    .map_err(|e| EmbeddingError::Load(format!("mmap {}: {e}", p.display())))?;
                EmbeddingTable::from_safetensors(&mmap, tensor_name)?
            }
            ArtifactSource::Bytes(b) => EmbeddingTable::from_safetensors(b, tensor_name)?,
        };
        let tokenizer = TokenizerAdapter::load(tokenizer)?;

        log::info!(
            "Static embedding table loaded from {:?}: rows={}, dims={}",
            embeddings,
            table.rows(),
            table.dims()
        );
        if tokenizer.vocab_size() > table.rows() {
            log::warn!(
                "Tokenizer vocab ({}) is larger than the embedding table ({} rows)",
                tokenizer.vocab_size(),
                table.rows()
            );
        }
        Self::from_parts(tokenizer, table, options)
    }

    /// Static tables are trained on raw word pieces, so special tokens are switched off.
    pub fn from_parts(
        tokenizer: TokenizerAdapter,
        table: EmbeddingTable,
        options: StaticOptions,
    ) -> Result<Self> {
        let threads = options.max_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("model2vec-{i}"))
            .build()
            .map_err(|e| EmbeddingError::Load(format!("static worker pool: {e}")))?;
        log::debug!(
            "Static worker pool ready (threads={}, normalize={})",
            threads,
            options.normalize
        );

        Ok(Self {
            tokenizer: tokenizer.with_special_tokens(false),
            table,
            normalize: options.normalize,
            pool,
        })
    }

    pub fn dims(&self) -> usize {
        self.table.dims()
    }

    pub fn max_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn encode_one(&self, text: &str) -> Result<EmbeddingVector> {
        let ids = self.tokenizer.token_ids(text)?;
        let mut sentence = self.table.mean_of(&ids)?;
        if self.normalize {
            l2_normalize(&mut sentence);
        }
        Ok(sentence)
    }

    /// Encode `sequences` on up to `thread_count` workers of the load-time pool (`<= 0` means
    /// one). Each worker takes a contiguous chunk; results come back in input order. Any
    /// failure fails the whole call.
    pub fn encode<S: AsRef<str> + Sync>(
        &self,
        sequences: &[S],
        thread_count: i64,
    ) -> Result<Vec<EmbeddingVector>> {
        if sequences.is_empty() {
            return Ok(Vec::new());
        }

        let workers = worker_count(thread_count, sequences.len()).min(self.max_threads());
        let chunk_len = sequences.len().div_ceil(workers);
        log::debug!(
            "Static encode: {} sequences on {} worker(s), {} per chunk",
            sequences.len(),
            workers,
            chunk_len
        );

        let chunks = self.pool.install(|| {
            sequences
                .par_chunks(chunk_len)
                .enumerate()
                .map(|(worker, part)| {
                    part.iter()
                        .map(|s| self.encode_one(s.as_ref()))
                        .collect::<Result<Vec<_>>>()
                        .map_err(|e| EmbeddingError::Encode(format!("worker {worker}: {e}")))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        Ok(chunks.into_iter().flatten().collect())
    }
}

/// Thread count from a caller-supplied integer: `<= 0` means 1.
pub fn positive_threads(requested: i64) -> usize {
    usize::try_from(requested.max(1)).unwrap_or(1)
}

/// [`positive_threads`], never more workers than sequences.
pub fn worker_count(thread_count: i64, sequences: usize) -> usize {
    positive_threads(thread_count).min(sequences).max(1)
}
