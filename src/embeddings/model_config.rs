// model_config.rs - Immutable description of one transformer model and where its artifacts live.
//
// A ModelConfig is chosen before anything is loaded. The tokenizer and the weights it names are
// always loaded together; switching models means dropping the old session and loading a new one.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config;
use crate::error::{EmbeddingError, Result};

/// Where an opaque artifact (weights, tokenizer definition, architecture json) comes from.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ArtifactSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl ArtifactSource {
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Path(p) => std::fs::read(p).map_err(|e| {
                EmbeddingError::Load(format!("read {}: {e}", p.display()))
            }),
            Self::Bytes(b) => Ok(b.clone()),
        }
    }

    /// A file next to this one, when this source is a path.
    pub fn sibling(&self, file_name: &str) -> Option<ArtifactSource> {
        match self {
            Self::Path(p) => p.parent().map(|dir| Self::Path(dir.join(file_name))),
            Self::Bytes(_) => None,
        }
    }
}

// Never dump a 100 MB byte vector into a log line.
impl fmt::Debug for ArtifactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub model_name: String,
    pub model_weights_locator: ArtifactSource,
    pub tokenizer_locator: ArtifactSource,
    /// BERT `config.json`. Defaults to the file next to the weights.
    #[serde(default)]
    pub architecture_locator: Option<ArtifactSource>,
    pub uses_token_type_ids: bool,
    pub output_tensor_name: String,
    /// true: masked mean pooling + L2 over the first output.
    /// false: `output_tensor_name` is already the sentence vector.
    pub normalize_embeddings: bool,
    /// Longest-first truncation at the tail, applied by the tokenizer.
    #[serde(default)]
    pub max_sequence_length: Option<usize>,
}

impl ModelConfig {
    pub fn architecture_source(&self) -> Result<ArtifactSource> {
        if let Some(src) = &self.architecture_locator {
            return Ok(src.clone());
        }
        self.model_weights_locator
            .sibling(config::embedding::ARCHITECTURE_FILE_NAME)
            .ok_or_else(|| {
                EmbeddingError::Load(format!(
                    "model '{}' loaded from bytes needs an explicit architecture locator",
                    self.model_name
                ))
            })
    }
}

/// Models the host knows how to find under a models directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelPreset {
    AllMiniLmL6V2,
    BgeSmallEnV15,
    SnowflakeArcticEmbedS,
}

impl ModelPreset {
    pub const ALL: [ModelPreset; 3] = [
        ModelPreset::AllMiniLmL6V2,
        ModelPreset::BgeSmallEnV15,
        ModelPreset::SnowflakeArcticEmbedS,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "all-minilm-l6-v2",
            Self::BgeSmallEnV15 => "bge-small-en-v1.5",
            Self::SnowflakeArcticEmbedS => "snowflake-arctic-embed-s",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// Build the config for this preset, with artifacts under `models_dir/<name>/`.
    ///
    /// The safetensors checkpoints only expose per-token states, so every preset pools.
    pub fn config(self, models_dir: &Path) -> ModelConfig {
        use config::embedding as cfg;

        let dir = models_dir.join(self.name());
        let (uses_token_type_ids, max_len) = match self {
            Self::AllMiniLmL6V2 => (false, cfg::MINILM_MAX_TOKENS),
            Self::BgeSmallEnV15 | Self::SnowflakeArcticEmbedS => (true, cfg::DEFAULT_MAX_TOKENS),
        };

        ModelConfig {
            model_name: self.name().to_string(),
            model_weights_locator: ArtifactSource::Path(dir.join(cfg::WEIGHTS_FILE_NAME)),
            tokenizer_locator: ArtifactSource::Path(dir.join(cfg::TOKENIZER_FILE_NAME)),
            architecture_locator: Some(ArtifactSource::Path(dir.join(cfg::ARCHITECTURE_FILE_NAME))),
            uses_token_type_ids,
            output_tensor_name: cfg::LAST_HIDDEN_STATE.to_string(),
            normalize_embeddings: true,
            max_sequence_length: Some(max_len),
        }
    }
}
