// tokenizer.rs - Thin adapter over a pretrained HF tokenizer definition (tokenizer.json).
//
// The vocabulary and splitting rules are opaque pretrained state. This adapter only fixes the
// output contract: three equal-length i64 sequences, deterministic for a given text + state.

use serde::Serialize;
use tokenizers::utils::truncation::{TruncationDirection, TruncationParams, TruncationStrategy};
use tokenizers::Tokenizer;

use crate::embeddings::model_config::ArtifactSource;
use crate::error::{EmbeddingError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenizeResult {
    pub ids: Vec<i64>,
    /// 1 = real token, 0 = padding.
    pub attention_mask: Vec<i64>,
    /// Only filled when the active model consumes segment ids.
    pub token_type_ids: Option<Vec<i64>>,
}

impl TokenizeResult {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Clone)]
pub struct TokenizerAdapter {
    inner: Tokenizer,
    add_special_tokens: bool,
    include_token_type_ids: bool,
}

impl TokenizerAdapter {
    pub fn load(source: &ArtifactSource) -> Result<Self> {
        let inner = match source {
            ArtifactSource::Path(p) => Tokenizer::from_file(p)
                .map_err(|e| EmbeddingError::Load(format!("tokenizer {}: {e}", p.display())))?,
            ArtifactSource::Bytes(b) => Tokenizer::from_bytes(b)
                .map_err(|e| EmbeddingError::Load(format!("tokenizer from bytes: {e}")))?,
        };
        log::info!(
            "Tokenizer loaded from {:?} (vocab={})",
            source,
            inner.get_vocab_size(true)
        );
        Ok(Self::from_tokenizer(inner))
    }

    pub fn from_tokenizer(inner: Tokenizer) -> Self {
        Self {
            inner,
            add_special_tokens: true,
            include_token_type_ids: false,
        }
    }

    /// Static embedding tables are trained without [CLS]/[SEP]; they turn this off.
    pub fn with_special_tokens(mut self, enabled: bool) -> Self {
        self.add_special_tokens = enabled;
        self
    }

    pub fn with_token_type_ids(mut self, enabled: bool) -> Self {
        self.include_token_type_ids = enabled;
        self
    }

    /// Truncate longest-first at the tail. `None` keeps whatever the tokenizer.json specifies.
    pub fn with_max_length(mut self, max_length: Option<usize>) -> Result<Self> {
        if let Some(max_length) = max_length {
            let params = TruncationParams {
                max_length,
                strategy: TruncationStrategy::LongestFirst,
                stride: 0,
                direction: TruncationDirection::Right,
            };
            self.inner
                .with_truncation(Some(params))
                .map_err(|e| EmbeddingError::Load(format!("invalid truncation params: {e}")))?;
        }
        Ok(self)
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    pub fn tokenize(&self, text: &str) -> Result<TokenizeResult> {
        let encoding = self
            .inner
            .encode(text, self.add_special_tokens)
            .map_err(|e| EmbeddingError::Tokenization(e.to_string()))?;

        let widen = |xs: &[u32]| xs.iter().map(|&x| i64::from(x)).collect::<Vec<_>>();
        Ok(TokenizeResult {
            ids: widen(encoding.get_ids()),
            attention_mask: widen(encoding.get_attention_mask()),
            token_type_ids: self
                .include_token_type_ids
                .then(|| widen(encoding.get_type_ids())),
        })
    }

    /// Same as [`tokenize`](Self::tokenize) for raw bytes coming off a wire.
    pub fn tokenize_bytes(&self, bytes: &[u8]) -> Result<TokenizeResult> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| EmbeddingError::Tokenization(format!("input is not valid UTF-8: {e}")))?;
        self.tokenize(text)
    }

    /// Raw ids without mask or segments, for table-lookup encoders.
    pub fn token_ids(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, self.add_special_tokens)
            .map_err(|e| EmbeddingError::Tokenization(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::word_level_tokenizer;

    #[test]
    fn test_tokenize_is_deterministic() {
        let tok = word_level_tokenizer().with_token_type_ids(true);
        let a = tok.tokenize("hello brave new world").unwrap();
        let b = tok.tokenize("hello brave new world").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sequences_have_equal_length() {
        let tok = word_level_tokenizer().with_token_type_ids(true);
        let r = tok.tokenize("Hello world").unwrap();
        // [CLS] hello world [SEP]
        assert_eq!(r.ids, vec![1, 4, 5, 2]);
        assert_eq!(r.attention_mask, vec![1, 1, 1, 1]);
        assert_eq!(r.token_type_ids.as_ref().map(Vec::len), Some(r.len()));
    }

    #[test]
    fn test_token_type_ids_omitted_unless_requested() {
        let tok = word_level_tokenizer();
        let r = tok.tokenize("hello").unwrap();
        assert!(r.token_type_ids.is_none());
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let tok = word_level_tokenizer().with_special_tokens(false);
        assert_eq!(tok.token_ids("hello zebra").unwrap(), vec![4, 3]);
    }

    #[test]
    fn test_truncation_keeps_head() {
        let tok = word_level_tokenizer()
            .with_special_tokens(false)
            .with_max_length(Some(2))
            .unwrap();
        let r = tok.tokenize("hello world brave new").unwrap();
        assert_eq!(r.ids, vec![4, 5]);
    }

    #[test]
    fn test_invalid_utf8_is_tokenization_error() {
        let tok = word_level_tokenizer();
        let err = tok.tokenize_bytes(&[0x68, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, EmbeddingError::Tokenization(_)));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let src = ArtifactSource::Bytes(b"not a tokenizer".to_vec());
        assert!(matches!(TokenizerAdapter::load(&src), Err(EmbeddingError::Load(_))));
    }
}
