use std::sync::Arc;

use crate::cache::response::ResponseCache;
use crate::core::config::Config;
use crate::document_store::DocumentStore;
use crate::embedding::cache::EmbeddingCache;
use crate::index::VectorIndexManager;
use crate::metrics::PerformanceMonitor;
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub http_client: reqwest::Client,

    pub index: Arc<VectorIndexManager>,
    pub embedding_cache: Arc<EmbeddingCache>,
    pub response_cache: Arc<ResponseCache>,
    pub sessions: Arc<SessionStore>,
    pub documents: Arc<DocumentStore>,
    pub performance: Arc<PerformanceMonitor>,

    /// Classifies document domain on ingest; shared with the query classifier
    /// since both are LLM round-trips with a keyword-vote fallback.
    pub domain_cache: moka::future::Cache<String, String>,
    pub query_class_cache: moka::future::Cache<String, String>,

    pub outbound_limit: Arc<tokio::sync::Semaphore>,

    /// Present only when `CROSS_ENCODER_ENDPOINT_URL` is configured; the
    /// hybrid retriever degrades to its base ranking when this is `None`.
    pub reranker_enabled: bool,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("reranker_enabled", &self.reranker_enabled)
            .field("ann_collection", &self.config.ann_collection_name)
            .finish()
    }
}

impl AppState {
    pub async fn new(config: Config, http_client: reqwest::Client) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let index = VectorIndexManager::connect(&config).await?;
        let embedding_cache = EmbeddingCache::load_or_new(&config).await?;
        let response_cache = ResponseCache::new(
            config.response_cache_capacity,
            config.response_cache_eviction,
            config.cache_ttl,
        );
        let sessions = SessionStore::new(config.conversations_path.clone());
        let documents = DocumentStore::load_or_new(config.document_metadata_path.clone()).await?;

        let reranker_enabled = crate::core::config::reranker_enabled(&config);

        Ok(Self {
            outbound_limit: Arc::new(tokio::sync::Semaphore::new(
                config.outbound_concurrency_limit,
            )),
            domain_cache: moka::future::Cache::builder()
                .max_capacity(10_000)
                .time_to_live(std::time::Duration::from_secs(60 * 60 * 24))
                .build(),
            query_class_cache: moka::future::Cache::builder()
                .max_capacity(10_000)
                .time_to_live(std::time::Duration::from_secs(60 * 60))
                .build(),
            config,
            http_client,
            index: Arc::new(index),
            embedding_cache: Arc::new(embedding_cache),
            response_cache: Arc::new(response_cache),
            sessions: Arc::new(sessions),
            documents: Arc::new(documents),
            performance: Arc::new(PerformanceMonitor::default()),
            reranker_enabled,
        })
    }

    /// Best-effort flush of in-memory caches to disk, called from the
    /// shutdown handler. Never fails the shutdown sequence.
    pub async fn flush(&self) {
        if let Err(e) = self.embedding_cache.flush().await {
            tracing::warn!("embedding cache flush failed: {}", e);
        }
    }
}
