
// IMPORTANT:
// Keep ALL numeric values centralized here (repo rule: no hardcoded numeric values
// scattered around).

// NOTE: HOST_VERSION must stay in sync with the `version` field in Cargo.toml.
pub const HOST_VERSION: &str = "0.3.0";

pub mod logging {
    pub const LOG_DIR_REL: &str = ".sentence_embeddings/logs";
    pub const LOG_FILE_NAME: &str = "embedding_host.log";

    // flexi_logger spec, overridable through the environment (e.g. "info, candle_core=warn").
    pub const LOG_SPEC_ENV: &str = "SENTENCE_EMBEDDINGS_LOG";
    pub const DEFAULT_LOG_SPEC: &str = "debug";

    pub const LOG_ROTATE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
    pub const LOG_ROTATE_KEEP_FILES: usize = 5;
}

pub mod native_messaging {
    pub const MAX_MESSAGE_SIZE_BYTES: u32 = 128 * 1024 * 1024;
}

pub mod embedding {
    // Input names every exported encoder understands.
    pub const INPUT_IDS: &str = "input_ids";
    pub const ATTENTION_MASK: &str = "attention_mask";
    pub const TOKEN_TYPE_IDS: &str = "token_type_ids";

    // Output names: per-token states vs an already pooled sentence vector.
    pub const LAST_HIDDEN_STATE: &str = "last_hidden_state";
    pub const SENTENCE_EMBEDDING: &str = "sentence_embedding";

    // Context limit shared by the BERT-family presets.
    pub const DEFAULT_MAX_TOKENS: usize = 512;
    pub const MINILM_MAX_TOKENS: usize = 256;

    pub const DEFAULT_THREAD_COUNT: usize = 2;

    // Model directory layout (one subdirectory per preset).
    pub const MODELS_DIR_REL: &str = ".sentence_embeddings/models";
    pub const WEIGHTS_FILE_NAME: &str = "model.safetensors";
    pub const TOKENIZER_FILE_NAME: &str = "tokenizer.json";
    pub const ARCHITECTURE_FILE_NAME: &str = "config.json";
}

pub mod model2vec {
    // Name of the [vocab, dims] table inside a Model2Vec safetensors file.
    pub const EMBEDDINGS_TENSOR_NAME: &str = "embeddings";

    pub const DEFAULT_THREAD_COUNT: usize = 4;
}
