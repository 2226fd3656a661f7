mod logging;
mod native_messaging;
mod protocol;

use std::io::{stdin, stdout};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use serde_json::Value;

use sentence_embeddings::{
    config, cosine_similarity, positive_threads, ArtifactSource, Model2VecEncoder, ModelConfig,
    ModelPreset, SentenceEmbedding, StaticOptions,
};

use crate::protocol::{Method, Response};

/// Sessions owned by this host. Each is dropped (released) before a replacement is loaded.
#[derive(Default)]
struct HostState {
    model: Option<SentenceEmbedding>,
    static_encoder: Option<Model2VecEncoder>,
    should_exit: bool,
}

fn main() {
    if let Err(e) = real_main() {
        // Keep stderr noisy for user bug reports; logs also go to file.
        eprintln!("[embedding_host] fatal error: {e:?}");
        log::error!("Fatal error: {:?}", e);
        std::process::exit(1);
    }
}

fn real_main() -> anyhow::Result<()> {
    let _logger = logging::init_logging()?;

    log::info!("=== Embedding Host Started ===");

    let mut state = HostState::default();
    let mut in_stream = stdin();
    let mut out_stream = stdout();

    let mut message_count: u64 = 0;
    loop {
        let req = match native_messaging::read_message(&mut in_stream) {
            Ok(Some(r)) => r,
            Ok(None) => {
                log::info!("No more messages after {} messages, exiting", message_count);
                break;
            }
            Err(e) => {
                log::error!("Error reading message: {:?}", e);
                break;
            }
        };

        message_count += 1;
        log::info!(
            "Processing message #{}: {} (id: {})",
            message_count,
            req.method,
            req.id
        );

        let started = Instant::now();
        let response = Response::from_outcome(
            req.id,
            handle_request(&mut state, &req.method, &req.params),
        );
        match &response {
            Response::Err { error, .. } => {
                log::error!("Handler error for {}: {}", req.method, error)
            }
            Response::Ok { .. } => log::debug!(
                "{} handled in {} ms",
                req.method,
                started.elapsed().as_millis()
            ),
        }

        if let Err(e) = native_messaging::write_message(&mut out_stream, &response) {
            log::error!("Error sending response: {:?}", e);
            break;
        }
        if state.should_exit {
            log::info!("Exiting as requested by client");
            break;
        }
    }

    release_all(&mut state);
    log::info!("=== Embedding Host Stopped ===");
    Ok(())
}

fn handle_request(state: &mut HostState, method: &str, params: &Value) -> anyhow::Result<Value> {
    let Some(method) = Method::parse(method) else {
        bail!("Unknown method: {method}");
    };
    if method.is_inference() && params.is_null() {
        bail!("{} requires parameters", method.as_str());
    }

    match method {
        Method::Hello => handle_hello(state, params),
        Method::Shutdown => {
            state.should_exit = true;
            Ok(serde_json::json!({ "ok": true }))
        }
        Method::Release => handle_release(state, params),
        Method::Similarity => handle_similarity(params),
        // Transformer path
        Method::LoadModel => handle_load_model(state, params),
        Method::Encode => handle_encode(state, params),
        Method::Compare => handle_compare(state, params),
        // Static (Model2Vec) path
        Method::LoadStatic => handle_load_static(state, params),
        Method::EncodeBatch => handle_encode_batch(state, params),
        Method::CompareStatic => handle_compare_static(state, params),
    }
}

fn handle_hello(state: &HostState, params: &Value) -> anyhow::Result<Value> {
    let client_version = params
        .get("clientVersion")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    log::info!(
        "Hello from client version {}, responding with host version {}",
        client_version,
        config::HOST_VERSION
    );

    Ok(serde_json::json!({
        "type": "hello-response",
        "hostImpl": "rust",
        "hostVersion": config::HOST_VERSION,
        "clientVersion": client_version,
        "methods": Method::ALL.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
        "presets": ModelPreset::ALL.iter().map(|p| p.name()).collect::<Vec<_>>(),
        "model": state.model.as_ref().map(|m| m.config().model_name.clone()),
        "staticLoaded": state.static_encoder.as_ref().is_some_and(|e| !e.is_released()),
    }))
}

fn handle_load_model(state: &mut HostState, params: &Value) -> anyhow::Result<Value> {
    let model_config = match params.get("config") {
        Some(v) => {
            serde_json::from_value::<ModelConfig>(v.clone()).context("invalid model config")?
        }
        None => {
            let name = str_param(params, "preset")?;
            let preset = ModelPreset::from_name(name)
                .with_context(|| format!("Unknown model preset: {name}"))?;
            let models_dir = match params.get("modelsDir").and_then(|v| v.as_str()) {
                Some(dir) => PathBuf::from(dir),
                None => logging::models_dir().context("Cannot determine home directory")?,
            };
            preset.config(&models_dir)
        }
    };
    let threads = threads_param(params, config::embedding::DEFAULT_THREAD_COUNT);

    // Tokenizer and weights are swapped as a pair: tear the old session down first.
    if let Some(old) = state.model.take() {
        old.release();
    }

    let started = Instant::now();
    let model = SentenceEmbedding::load(model_config, threads)
        .context("failed to load sentence embedding model")?;
    let load_ms = started.elapsed().as_millis() as u64;

    let cfg = model.config();
    let result = serde_json::json!({
        "ok": true,
        "modelName": cfg.model_name,
        "usesTokenTypeIds": cfg.uses_token_type_ids,
        "outputTensorName": cfg.output_tensor_name,
        "normalizeEmbeddings": cfg.normalize_embeddings,
        "threads": model.engine().thread_count(),
        "loadTimeMs": load_ms,
    });
    state.model = Some(model);
    Ok(result)
}

fn handle_encode(state: &mut HostState, params: &Value) -> anyhow::Result<Value> {
    let text = str_param(params, "text")?;
    let model = require_model(state)?;

    let started = Instant::now();
    let embedding = model.encode(text)?;
    let inference_ms = started.elapsed().as_millis() as u64;

    Ok(serde_json::json!({
        "embedding": embedding,
        "dims": embedding.len(),
        "inferenceTimeMs": inference_ms,
    }))
}

fn handle_compare(state: &mut HostState, params: &Value) -> anyhow::Result<Value> {
    let text1 = str_param(params, "text1")?;
    let text2 = str_param(params, "text2")?;
    let model = require_model(state)?;

    let started = Instant::now();
    let a = model.encode(text1)?;
    let b = model.encode(text2)?;
    let similarity = cosine_similarity(&a, &b)?;
    let inference_ms = started.elapsed().as_millis() as u64;

    Ok(serde_json::json!({
        "similarity": score_json(similarity),
        "inferenceTimeMs": inference_ms,
    }))
}

fn handle_load_static(state: &mut HostState, params: &Value) -> anyhow::Result<Value> {
    let embeddings = ArtifactSource::Path(PathBuf::from(str_param(params, "embeddingsPath")?));
    let tokenizer = ArtifactSource::Path(PathBuf::from(str_param(params, "tokenizerPath")?));
    let options = StaticOptions {
        max_threads: threads_param(params, default_static_threads()),
        normalize: params
            .get("normalize")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    };

    if let Some(mut old) = state.static_encoder.take() {
        old.release();
    }

    let started = Instant::now();
    let encoder = Model2VecEncoder::load(&embeddings, &tokenizer, options)
        .context("failed to load static embedding model")?;
    let load_ms = started.elapsed().as_millis() as u64;

    let result = serde_json::json!({
        "ok": true,
        "dims": encoder.dims(),
        "threads": encoder.max_threads(),
        "normalize": options.normalize,
        "loadTimeMs": load_ms,
    });
    state.static_encoder = Some(encoder);
    Ok(result)
}

fn handle_encode_batch(state: &mut HostState, params: &Value) -> anyhow::Result<Value> {
    let texts: Vec<String> =
        serde_json::from_value(params.get("texts").cloned().unwrap_or(Value::Null))
            .context("texts parameter is required and must be an array of strings")?;
    let encoder = require_static(state)?;
    let threads = static_threads_param(params, encoder);

    let started = Instant::now();
    let embeddings = encoder.encode_batch(&texts, threads)?;
    let inference_ms = started.elapsed().as_millis() as u64;

    Ok(serde_json::json!({
        "embeddings": embeddings,
        "count": embeddings.len(),
        "inferenceTimeMs": inference_ms,
    }))
}

fn handle_compare_static(state: &mut HostState, params: &Value) -> anyhow::Result<Value> {
    let text1 = str_param(params, "text1")?;
    let text2 = str_param(params, "text2")?;
    let encoder = require_static(state)?;
    let threads = static_threads_param(params, encoder);

    let started = Instant::now();
    let embeddings = encoder.encode_batch(&[text1, text2], threads)?;
    let similarity = cosine_similarity(&embeddings[0], &embeddings[1])?;
    let inference_ms = started.elapsed().as_millis() as u64;

    Ok(serde_json::json!({
        "similarity": score_json(similarity),
        "inferenceTimeMs": inference_ms,
    }))
}

fn handle_similarity(params: &Value) -> anyhow::Result<Value> {
    let a = vector_param(params, "a")?;
    let b = vector_param(params, "b")?;
    let similarity = cosine_similarity(&a, &b)?;
    Ok(serde_json::json!({ "similarity": score_json(similarity) }))
}

fn handle_release(state: &mut HostState, params: &Value) -> anyhow::Result<Value> {
    let target = params.get("target").and_then(|v| v.as_str()).unwrap_or("all");
    if !matches!(target, "model" | "static" | "all") {
        bail!("Unknown release target: {target}");
    }

    let mut released = Vec::new();
    if matches!(target, "model" | "all") {
        if let Some(model) = state.model.take() {
            model.release();
            released.push("model");
        }
    }
    if matches!(target, "static" | "all") {
        if let Some(mut encoder) = state.static_encoder.take() {
            encoder.release();
            released.push("static");
        }
    }
    Ok(serde_json::json!({ "ok": true, "released": released }))
}

fn release_all(state: &mut HostState) {
    if let Some(model) = state.model.take() {
        model.release();
    }
    if let Some(mut encoder) = state.static_encoder.take() {
        encoder.release();
    }
}

fn require_model(state: &mut HostState) -> anyhow::Result<&mut SentenceEmbedding> {
    state
        .model
        .as_mut()
        .context("No model loaded. Call 'loadModel' first.")
}

fn require_static(state: &mut HostState) -> anyhow::Result<&mut Model2VecEncoder> {
    state
        .static_encoder
        .as_mut()
        .context("No static model loaded. Call 'loadStatic' first.")
}

fn str_param<'a>(params: &'a Value, key: &str) -> anyhow::Result<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .with_context(|| format!("Missing required parameter: {key}"))
}

fn vector_param(params: &Value, key: &str) -> anyhow::Result<Vec<f32>> {
    let v = params
        .get(key)
        .with_context(|| format!("Missing required parameter: {key}"))?;
    serde_json::from_value(v.clone()).with_context(|| format!("{key} must be an array of numbers"))
}

/// `threads` from the request, `<= 0` clamped to 1, `default` when absent.
fn threads_param(params: &Value, default: usize) -> usize {
    params
        .get("threads")
        .and_then(|v| v.as_i64())
        .map_or(default, positive_threads)
}

/// Per-call static worker count; defaults to the pool size chosen at `loadStatic`.
fn static_threads_param(params: &Value, encoder: &Model2VecEncoder) -> i64 {
    params
        .get("threads")
        .and_then(|v| v.as_i64())
        .or_else(|| encoder.max_threads().and_then(|n| i64::try_from(n).ok()))
        .unwrap_or(1)
}

fn default_static_threads() -> usize {
    std::thread::available_parallelism()
        .map_or(config::model2vec::DEFAULT_THREAD_COUNT, |n| n.get())
}

/// NaN (degenerate vector) goes out as JSON null.
fn score_json(score: f32) -> Value {
    if score.is_finite() {
        serde_json::json!(score)
    } else {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};
    use candle_transformers::models::bert::{BertModel, Config as BertConfig};
    use serde_json::json;

    use super::*;

    const TOKENIZER_JSON: &str = r#"{
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
        "vocab": { "[PAD]": 0, "[CLS]": 1, "[SEP]": 2, "[UNK]": 3, "hello": 4, "world": 5 },
        "unk_token": "[UNK]"
      }
    }"#;

    /// One-layer, 8-wide BERT plus tokenizer, laid out like a preset directory.
    fn write_tiny_model(dir: &Path) -> Value {
        let architecture = json!({
            "vocab_size": 6, "hidden_size": 8, "num_hidden_layers": 1,
            "num_attention_heads": 2, "intermediate_size": 16, "hidden_act": "gelu",
            "hidden_dropout_prob": 0.0, "max_position_embeddings": 16, "type_vocab_size": 2,
            "initializer_range": 0.02, "layer_norm_eps": 1e-12, "pad_token_id": 0,
            "position_embedding_type": "absolute", "use_cache": false,
            "classifier_dropout": null, "model_type": "bert"
        });
        let bert: BertConfig = serde_json::from_value(architecture.clone()).unwrap();
        let varmap = VarMap::new();
        BertModel::load(VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu), &bert).unwrap();
        varmap.save(dir.join("model.safetensors")).unwrap();
        std::fs::write(dir.join("config.json"), architecture.to_string()).unwrap();
        std::fs::write(dir.join("tokenizer.json"), TOKENIZER_JSON).unwrap();

        json!({
            "modelName": "tiny",
            "modelWeightsLocator": dir.join("model.safetensors"),
            "tokenizerLocator": dir.join("tokenizer.json"),
            "usesTokenTypeIds": false,
            "outputTensorName": "last_hidden_state",
            "normalizeEmbeddings": true
        })
    }

    #[test]
    fn test_load_model_clamps_non_positive_threads() {
        let dir = tempfile::tempdir().unwrap();
        let model_config = write_tiny_model(dir.path());
        let mut state = HostState::default();

        for threads in [-1, 0, i64::MIN] {
            let params = json!({ "config": model_config, "threads": threads });
            let v = handle_load_model(&mut state, &params).unwrap();
            assert_eq!(v["threads"], 1, "threads={threads}");
            let encoded = handle_encode(&mut state, &json!({ "text": "hello world" })).unwrap();
            assert_eq!(encoded["dims"], 8);
        }

        let params = json!({ "config": model_config, "threads": 3 });
        assert_eq!(handle_load_model(&mut state, &params).unwrap()["threads"], 3);
    }

    #[test]
    fn test_threads_param() {
        assert_eq!(threads_param(&json!({ "threads": -1 }), 2), 1);
        assert_eq!(threads_param(&json!({ "threads": 0 }), 2), 1);
        assert_eq!(threads_param(&json!({ "threads": 5 }), 2), 5);
        assert_eq!(threads_param(&json!({}), 2), 2);
        assert_eq!(threads_param(&json!({ "threads": "many" }), 2), 2);
    }

    #[test]
    fn test_compare_on_tiny_model() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = HostState::default();
        let params = json!({ "config": write_tiny_model(dir.path()) });
        handle_load_model(&mut state, &params).unwrap();

        let same = json!({ "text1": "hello world", "text2": "HELLO WORLD" });
        let v = handle_request(&mut state, "compare", &same).unwrap();
        let score = v["similarity"].as_f64().unwrap();
        assert!((score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similarity_handler() {
        let params = json!({ "a": [1.0, 0.0], "b": [2.0, 0.0] });
        let v = handle_similarity(&params).unwrap();
        assert_eq!(v["similarity"].as_f64(), Some(1.0));
    }

    #[test]
    fn test_similarity_handler_degenerate_is_null() {
        let params = json!({ "a": [0.0, 0.0], "b": [2.0, 0.0] });
        let v = handle_similarity(&params).unwrap();
        assert!(v["similarity"].is_null());
    }

    #[test]
    fn test_similarity_handler_dimension_mismatch() {
        let params = json!({ "a": [1.0], "b": [2.0, 0.0] });
        let err = handle_similarity(&params).unwrap_err();
        assert!(format!("{err}").contains("dimension mismatch"));
    }

    #[test]
    fn test_encode_without_model_fails() {
        let mut state = HostState::default();
        let err = handle_request(&mut state, "encode", &json!({ "text": "hi" })).unwrap_err();
        assert!(format!("{err}").contains("loadModel"));
    }

    #[test]
    fn test_inference_method_without_params_fails() {
        let mut state = HostState::default();
        let err = handle_request(&mut state, "encodeBatch", &Value::Null).unwrap_err();
        assert!(format!("{err}").contains("requires parameters"));
    }

    #[test]
    fn test_unknown_method() {
        let mut state = HostState::default();
        let err = handle_request(&mut state, "Encode", &Value::Null).unwrap_err();
        assert!(format!("{err}").contains("Unknown method"));
    }

    #[test]
    fn test_unknown_preset_fails_before_teardown() {
        let mut state = HostState::default();
        let err = handle_load_model(&mut state, &json!({ "preset": "gpt-2" })).unwrap_err();
        assert!(format!("{err}").contains("Unknown model preset"));
    }

    #[test]
    fn test_release_rejects_unknown_target() {
        let mut state = HostState::default();
        assert!(handle_release(&mut state, &json!({ "target": "gpu" })).is_err());
        let v = handle_release(&mut state, &json!({})).unwrap();
        assert_eq!(v["released"], json!([]));
    }

    #[test]
    fn test_shutdown_sets_exit_flag() {
        let mut state = HostState::default();
        handle_request(&mut state, "shutdown", &Value::Null).unwrap();
        assert!(state.should_exit);
    }
}
