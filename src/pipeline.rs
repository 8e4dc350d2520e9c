use std::sync::Arc;

use uuid::Uuid;

use crate::core::app_state::AppState;
use crate::core::types::{
    Chunk, ContextMetadata, ConversationMessage, Document, DocumentStatus, QueryRequest,
    QueryResponse, QueryStatus, RetrievalResult, SourceAttribution, UploadResponse,
};
use crate::error::CoreError;
use crate::ingest::extract::ExtractorRegistry;

/// Looks up a chunk's embedding, preferring the cache's exact hash match,
/// then its similarity fallback, and only calling the external embedding
/// endpoint on a full miss — the same tiering the embedding cache module
/// documents.
async fn embed_with_cache(state: &AppState, text: &str) -> Result<Vec<f32>, CoreError> {
    if let Some(vector) = state.embedding_cache.get_exact(text) {
        return Ok(vector);
    }
    if let Some(vector) = state.embedding_cache.get_similar(text) {
        return Ok(vector);
    }
    let _permit = state
        .outbound_limit
        .acquire()
        .await
        .map_err(|_| CoreError::Canceled)?;
    let started = std::time::Instant::now();
    let result = crate::embedding::client::embed(&state.http_client, &state.config, text).await;
    state
        .performance
        .record("embed", started.elapsed(), result.is_ok());
    let vector = result?;
    state.embedding_cache.put(text, vector.clone()).await?;
    Ok(vector)
}

/// Extracts a file's content, escalating to OCR when native extraction
/// can't be trusted: images always go through OCR, and a PDF whose first
/// `PDF_OCR_PROBE_PAGES` pages are all empty is assumed scanned.
async fn extract_with_ocr_escalation(
    state: &AppState,
    registry: &ExtractorRegistry,
    filename: &str,
    bytes: &[u8],
    mime: Option<&str>,
    ext: &str,
) -> Result<Vec<crate::ingest::extract::PreChunk>, CoreError> {
    if crate::ingest::extract::is_image_ext(ext) {
        return crate::ingest::extract::ocr_extract(&state.http_client, &state.config, filename, bytes, mime).await;
    }
    if ext == "pdf"
        && crate::ingest::extract::pdf_scanned(bytes, crate::ingest::extract::PDF_OCR_PROBE_PAGES)?
    {
        return crate::ingest::extract::ocr_extract(&state.http_client, &state.config, filename, bytes, mime).await;
    }
    crate::ingest::extract::extract(registry, &state.config, filename, bytes, mime)
}

/// Ingests one uploaded file: extract -> chunk -> enrich -> embed -> upsert.
pub async fn ingest_document(
    state: &AppState,
    registry: &ExtractorRegistry,
    filename: &str,
    bytes: &[u8],
    mime: Option<&str>,
) -> Result<UploadResponse, CoreError> {
    let mut warnings = Vec::new();
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let mut prechunks =
        extract_with_ocr_escalation(state, registry, filename, bytes, mime, &ext).await?;
    if prechunks.is_empty() {
        warnings.push("extraction produced no content".to_string());
    }

    let document_id = Uuid::new_v4().to_string();
    let mut raw_chunks = crate::ingest::chunk::chunk_document(&state.config, &document_id, filename, &prechunks);
    if raw_chunks.is_empty() && ext == "pdf" && state.config.ocr_endpoint_url.is_some() {
        warnings.push("native extraction produced zero chunks, retrying with OCR".to_string());
        prechunks =
            crate::ingest::extract::ocr_extract(&state.http_client, &state.config, filename, bytes, mime).await?;
        raw_chunks = crate::ingest::chunk::chunk_document(&state.config, &document_id, filename, &prechunks);
    }
    if raw_chunks.is_empty() {
        return Err(CoreError::ExtractionFailed {
            filename: filename.to_string(),
            reason: "chunker produced zero chunks".to_string(),
        });
    }

    let enriched = crate::ingest::enrich::enrich_chunks(state, filename, raw_chunks).await;
    let domain = enriched
        .first()
        .map(|c| c.domain.clone())
        .unwrap_or_else(|| "general".to_string());

    let mut embedded: Vec<(Chunk, Vec<f32>)> = Vec::with_capacity(enriched.len());
    for chunk in enriched {
        match embed_with_cache(state, &chunk.content).await {
            Ok(vector) => embedded.push((chunk, vector)),
            Err(e) => warnings.push(format!("embedding failed for a chunk: {e}")),
        }
    }

    if embedded.is_empty() {
        return Err(CoreError::ModelUnavailable(
            "no chunks could be embedded".to_string(),
        ));
    }

    // Purge any chunks from a prior ingest of this filename first so
    // re-ingesting identical bytes doesn't double the row count.
    state.index.delete(filename).await?;
    state.index.upsert(&embedded).await?;

    let chunk_count = embedded.len();
    let now = chrono::Utc::now();
    let document = Document {
        id: document_id.clone(),
        filename: filename.to_string(),
        content_hash: sha256_hex(bytes),
        domain: domain.clone(),
        status: DocumentStatus::Active,
        chunk_count,
        versions: Vec::new(),
        annotations: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    state.documents.upsert(document).await?;

    Ok(UploadResponse {
        filename: filename.to_string(),
        document_id,
        chunk_count,
        domain,
        warnings,
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Fixed message returned whenever there is no knowledge base or no
/// relevant chunk to ground an answer in (spec.md S4, §8 invariant 5).
const EMPTY_KB_MESSAGE: &str =
    "No relevant information was found in the knowledge base for this question.";

/// Retrieves, dedupes, assembles context, and answers a query (non-streaming
/// path). Degrades to an empty-knowledge-base message when nothing is
/// retrieved, matching `context_manager.py`'s fallback behavior.
pub async fn answer_query(state: &Arc<AppState>, request: QueryRequest) -> Result<QueryResponse, CoreError> {
    let session_id = request.session_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
    let session = state.sessions.get_or_create(&session_id).await?;
    let n_results = request.n_results.unwrap_or(state.config.n_results);

    // An empty index never reaches the embedding/LLM endpoints (spec.md S4).
    if state.index.count_rows().await? == 0 {
        return Ok(QueryResponse {
            status: QueryStatus::EmptyKb,
            answer: EMPTY_KB_MESSAGE.to_string(),
            sources: Vec::new(),
            context_metadata: ContextMetadata::default(),
        });
    }

    let embedding = embed_with_cache(state, &request.query).await?;
    let retrieval_started = std::time::Instant::now();
    let raw_results = crate::retrieval::hybrid::retrieve(
        state,
        &request.query,
        &embedding,
        n_results,
        request.filename_filter.as_deref(),
        request.domain_filter.as_deref(),
    )
    .await;
    state
        .performance
        .record("retrieve", retrieval_started.elapsed(), raw_results.is_ok());
    let raw_results = raw_results?;

    let target_domain = crate::query::classify_query(state, &request.query).await;
    let deduped: Vec<RetrievalResult> =
        crate::retrieval::dedup::dedupe_and_filter(&target_domain, raw_results, n_results);

    let assembled = crate::context::assemble(&request.query, &session.history, &deduped);
    let cache_key = crate::cache::response::cache_key(&request.query, &assembled.context, &session_id);
    if let Some(cached) = state.response_cache.get(&cache_key) {
        if let Ok(response) = serde_json::from_str::<QueryResponse>(&cached) {
            return Ok(response);
        }
    }

    let status = if deduped.is_empty() {
        QueryStatus::NoContext
    } else {
        QueryStatus::Success
    };
    let answer = if deduped.is_empty() {
        EMPTY_KB_MESSAGE.to_string()
    } else {
        call_llm_once(state, &request.query, &assembled.context).await?
    };

    let sources: Vec<SourceAttribution> = deduped.iter().map(|r| r.source.clone()).collect();

    state
        .sessions
        .append_message(
            &session_id,
            ConversationMessage {
                role: "user".to_string(),
                content: request.query.clone(),
                timestamp: chrono::Utc::now(),
                sources: vec![],
            },
        )
        .await?;
    state
        .sessions
        .append_message(
            &session_id,
            ConversationMessage {
                role: "assistant".to_string(),
                content: answer.clone(),
                timestamp: chrono::Utc::now(),
                sources: sources.clone(),
            },
        )
        .await?;

    let response = QueryResponse {
        status,
        answer,
        sources,
        context_metadata: assembled.metadata,
    };

    if let Ok(serialized) = serde_json::to_string(&response) {
        state.response_cache.put(cache_key, serialized);
    }

    Ok(response)
}

async fn call_llm_once(state: &AppState, query: &str, context: &str) -> Result<String, CoreError> {
    let started = std::time::Instant::now();
    let stream = crate::stream::dispatch(state, query.to_string(), context.to_string()).await?;
    let (text, dispatch_state) = crate::stream::drain_into(Box::pin(stream), |_| true).await;
    state.performance.record(
        "llm_call",
        started.elapsed(),
        dispatch_state == crate::stream::DispatchState::Done,
    );
    Ok(text)
}
