use std::time::Duration;

use crate::error::CoreError;

/// Env vars that must be set for the service to start. Mirrors the original
/// implementation's `REQUIRED_ENV_VARS` fail-fast contract: absent required
/// options abort startup instead of silently defaulting.
const REQUIRED_ENV_VARS: &[&str] = &[
    "EMBEDDING_ENDPOINT_URL",
    "LLM_ENDPOINT_URL",
    "ANN_STORE_PATH",
    "ANN_COLLECTION_NAME",
];

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| {
        // Strip inline `#`-comments, matching the original config loader's
        // `get_env_value` helper.
        v.split('#').next().unwrap_or("").trim().to_string()
    })
}

fn env_or(key: &str, default: &str) -> String {
    env_value(key)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_value(key)
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn truthy(value: &str) -> bool {
    !matches!(
        value.to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off" | "disabled" | ""
    )
}

#[derive(Debug, Clone)]
pub struct Config {
    pub embedding_endpoint_url: String,
    pub llm_endpoint_url: String,
    pub ocr_endpoint_url: Option<String>,
    pub cross_encoder_endpoint_url: Option<String>,
    pub ann_store_path: String,
    pub ann_collection_name: String,

    pub max_file_size_bytes: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub n_results: usize,
    pub cache_ttl: Duration,

    pub embeddings_cache_path: std::path::PathBuf,
    pub conversations_path: std::path::PathBuf,
    pub document_metadata_path: std::path::PathBuf,

    pub embedding_cache_capacity: usize,
    pub response_cache_capacity: usize,
    pub response_cache_eviction: crate::core::types::EvictionPolicy,

    pub http_timeout: Duration,
    pub http_connect_timeout: Duration,
    pub outbound_concurrency_limit: usize,

    pub frontend_cors_origin: Option<String>,

    pub log_level: String,
    pub log_file: Option<String>,
}

impl Config {
    /// Loads configuration from the environment, failing fast when a
    /// required option is absent. Must run before `telemetry::init` so a
    /// missing-config error is never silently swallowed by an uninitialized
    /// logger.
    pub fn from_env() -> Result<Self, CoreError> {
        let mut missing = Vec::new();
        for key in REQUIRED_ENV_VARS {
            if env_value(key).filter(|v| !v.is_empty()).is_none() {
                missing.push(*key);
            }
        }
        if !missing.is_empty() {
            return Err(CoreError::Config(format!(
                "missing required environment variable(s): {}",
                missing.join(", ")
            )));
        }

        let eviction = match env_or("RESPONSE_CACHE_EVICTION", "lru").as_str() {
            "lfu" => crate::core::types::EvictionPolicy::Lfu,
            "fifo" => crate::core::types::EvictionPolicy::Fifo,
            _ => crate::core::types::EvictionPolicy::Lru,
        };

        let data_root = env_value("RAGCORE_DATA_DIR")
            .filter(|v| !v.is_empty())
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| std::path::PathBuf::from("."))
                    .join(".ragcore")
            });

        Ok(Config {
            embedding_endpoint_url: env_value("EMBEDDING_ENDPOINT_URL").unwrap(),
            llm_endpoint_url: env_value("LLM_ENDPOINT_URL").unwrap(),
            ocr_endpoint_url: env_value("OCR_ENDPOINT_URL").filter(|v| !v.is_empty()),
            cross_encoder_endpoint_url: env_value("CROSS_ENCODER_ENDPOINT_URL")
                .filter(|v| !v.is_empty()),
            ann_store_path: env_value("ANN_STORE_PATH").unwrap(),
            ann_collection_name: env_value("ANN_COLLECTION_NAME").unwrap(),

            max_file_size_bytes: env_parse_or("MAX_FILE_SIZE", 157_286_400),
            chunk_size: env_parse_or("CHUNK_SIZE", 800),
            chunk_overlap: env_parse_or("CHUNK_OVERLAP", 400),
            n_results: env_parse_or("N_RESULTS", 5),
            cache_ttl: Duration::from_secs(env_parse_or("CACHE_TTL", 3600)),

            embeddings_cache_path: data_root.join("embeddings_cache"),
            conversations_path: data_root.join("conversations"),
            document_metadata_path: data_root.join("documents"),

            embedding_cache_capacity: env_parse_or("EMBEDDING_CACHE_CAPACITY", 10_000),
            response_cache_capacity: env_parse_or("RESPONSE_CACHE_CAPACITY", 2_000),
            response_cache_eviction: eviction,

            http_timeout: Duration::from_secs(env_parse_or("HTTP_TIMEOUT_SECS", 30)),
            http_connect_timeout: Duration::from_secs(env_parse_or(
                "HTTP_CONNECT_TIMEOUT_SECS",
                10,
            )),
            outbound_concurrency_limit: env_parse_or("OUTBOUND_LIMIT", 32),

            frontend_cors_origin: env_value("FRONTEND_CORS_ORIGIN").filter(|v| !v.is_empty()),

            log_level: env_or("LOG_LEVEL", "info"),
            log_file: env_value("LOG_FILE").filter(|v| !v.is_empty()),
        })
    }
}

pub fn reranker_enabled(cfg: &Config) -> bool {
    cfg.cross_encoder_endpoint_url.is_some()
        && env_value("RERANKER_ENABLED")
            .map(|v| truthy(&v))
            .unwrap_or(true)
}
