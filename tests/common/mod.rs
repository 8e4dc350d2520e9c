use std::path::PathBuf;
use std::time::Duration;

use ragcore::core::config::Config;
use ragcore::core::types::EvictionPolicy;

/// Builds a `Config` pointing entirely at a fresh temp directory, with
/// endpoint URLs that are syntactically valid but never reachable. Tests
/// that need a real embedding/LLM round trip override those two fields and
/// are marked `#[ignore]`, matching the pattern for tests needing live
/// services.
pub fn test_config() -> (Config, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let ann_store_path = tmp.path().join("ann").to_string_lossy().to_string();

    let config = Config {
        embedding_endpoint_url: "http://127.0.0.1:0/embed".to_string(),
        llm_endpoint_url: "http://127.0.0.1:0/chat".to_string(),
        ocr_endpoint_url: None,
        cross_encoder_endpoint_url: None,
        ann_store_path,
        ann_collection_name: "chunks".to_string(),

        max_file_size_bytes: 157_286_400,
        chunk_size: 800,
        chunk_overlap: 400,
        n_results: 5,
        cache_ttl: Duration::from_secs(3600),

        embeddings_cache_path: tmp.path().join("embeddings_cache"),
        conversations_path: tmp.path().join("conversations"),
        document_metadata_path: tmp.path().join("documents"),

        embedding_cache_capacity: 10_000,
        response_cache_capacity: 2_000,
        response_cache_eviction: EvictionPolicy::Lru,

        http_timeout: Duration::from_secs(2),
        http_connect_timeout: Duration::from_secs(1),
        outbound_concurrency_limit: 4,

        frontend_cors_origin: None,

        log_level: "error".to_string(),
        log_file: None,
    };

    (config, tmp)
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .connect_timeout(Duration::from_secs(1))
        .build()
        .expect("build http client")
}

#[allow(dead_code)]
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}
