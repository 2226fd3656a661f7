use std::path::PathBuf;

use anyhow::Context;
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};

use sentence_embeddings::config;

/// Start file logging. The returned handle must outlive the message loop.
pub fn init_logging() -> anyhow::Result<LoggerHandle> {
    let log_dir = host_log_dir()?;
    let spec = log_spec(std::env::var(config::logging::LOG_SPEC_ENV).ok());

    // File gets the configured level; the UI process only sees warnings and errors on stderr.
    let handle = Logger::try_with_str(&spec)
        .with_context(|| format!("invalid log spec '{spec}'"))?
        .log_to_file(
            FileSpec::default()
                .directory(&log_dir)
                .basename(config::logging::LOG_FILE_NAME),
        )
        .rotate(
            Criterion::Size(config::logging::LOG_ROTATE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(config::logging::LOG_ROTATE_KEEP_FILES),
        )
        .duplicate_to_stderr(Duplicate::Warn)
        .format(flexi_logger::detailed_format)
        .start()
        .context("failed to start logger")?;

    log_banner(&spec, &log_dir);
    Ok(handle)
}

fn log_banner(spec: &str, log_dir: &std::path::Path) {
    use candle_core::utils;

    log::info!("{}", "=".repeat(60));
    log::info!("Sentence embedding host {} ({})", config::HOST_VERSION, std::env::consts::OS);
    log::info!("Log spec: {} (dir {})", spec, log_dir.display());
    match models_dir() {
        Some(dir) => log::info!("Models directory: {}", dir.display()),
        None => log::warn!("Models directory unknown: no home directory"),
    }
    log::info!(
        "CPU: {} threads available, avx={} neon={} f16c={}",
        std::thread::available_parallelism().map_or(1, |n| n.get()),
        utils::with_avx(),
        utils::with_neon(),
        utils::with_f16c()
    );
    log::info!("{}", "=".repeat(60));
}

/// Level spec from the environment override, or the default when unset or blank.
fn log_spec(env_value: Option<String>) -> String {
    env_value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| config::logging::DEFAULT_LOG_SPEC.to_string())
}

fn host_log_dir() -> anyhow::Result<PathBuf> {
    let home = home_dir().context("cannot determine home directory for logs")?;
    let dir = home.join(config::logging::LOG_DIR_REL);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed creating log dir {}", dir.display()))?;
    Ok(dir)
}

/// Default location of preset model directories.
pub fn models_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(config::embedding::MODELS_DIR_REL))
}

pub fn home_dir() -> Option<PathBuf> {
    ["HOME", "USERPROFILE"]
        .into_iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|v| !v.is_empty())
        .map(PathBuf::from)
}
