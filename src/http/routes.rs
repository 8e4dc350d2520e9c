use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post};
use axum::Router;
use futures::{Stream, StreamExt};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::app_state::AppState;
use crate::core::types::{DocumentListEntry, QueryRequest, QueryResponse, UploadResponse};
use crate::error::{CoreError, CoreResult};
use crate::ingest::extract::ExtractorRegistry;
use crate::stream::DispatchState;

#[derive(serde::Serialize)]
struct StatusFrame {
    status: &'static str,
}

fn status_event(status: &'static str) -> Event {
    Event::default()
        .event("status")
        .json_data(&StatusFrame { status })
        .unwrap_or_else(|_| Event::default().event("status"))
}

fn single_status_stream(
    status: &'static str,
) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::once(async move { Ok::<Event, Infallible>(status_event(status)) })
}

/// Builds the fixed 8-route HTTP surface, wired to `AppState`.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = match state.config.frontend_cors_origin.as_deref() {
        Some(origin) => CorsLayer::new().allow_origin(
            origin
                .parse::<axum::http::HeaderValue>()
                .expect("FRONTEND_CORS_ORIGIN must be a valid header value"),
        ),
        None => CorsLayer::permissive(),
    };

    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/query", post(query))
        .route("/query/stream", post(query_stream))
        .route("/documents", get(list_documents))
        .route("/documents/{filename}", delete(delete_document))
        .route("/domains", get(list_domains))
        .route("/reset_kb", post(reset_kb))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let row_count = state.index.count_rows().await.unwrap_or(0);
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "indexed_chunks": row_count,
        "index_tuning": state.index.tuning,
    }))
}

async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, CoreError> {
    let registry = ExtractorRegistry::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CoreError::DecodeFailed(e.to_string()))?
    {
        let Some(filename) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };
        let mime = field.content_type().map(|s| s.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| CoreError::DecodeFailed(e.to_string()))?;

        let response =
            crate::pipeline::ingest_document(&state, &registry, &filename, &bytes, mime.as_deref())
                .await?;
        return Ok(Json(response));
    }

    Err(CoreError::DecodeFailed("no file field in multipart body".to_string()))
}

async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, CoreError> {
    let response = crate::pipeline::answer_query(&state, request).await?;
    Ok(Json(response))
}

type EventStream = std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// Streams `{message:{content}, done}` frames as server-sent `message`
/// events, followed by one terminal `status` event
/// (`success`/`error`/`empty_kb`/`no_context`), matching §8 invariant 5's
/// "exactly one terminal frame" requirement.
async fn query_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> CoreResult<Sse<EventStream>> {
    let session_id = request
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let session = state.sessions.get_or_create(&session_id).await?;
    let n_results = request.n_results.unwrap_or(state.config.n_results);

    if state.index.count_rows().await? == 0 {
        let stream: EventStream = Box::pin(single_status_stream("empty_kb"));
        return Ok(Sse::new(stream).keep_alive(KeepAlive::default()));
    }

    let embedding = match state.embedding_cache.get_exact(&request.query) {
        Some(vector) => vector,
        None => crate::embedding::client::embed(&state.http_client, &state.config, &request.query).await?,
    };

    let raw_results = crate::retrieval::hybrid::retrieve(
        &state,
        &request.query,
        &embedding,
        n_results,
        request.filename_filter.as_deref(),
        request.domain_filter.as_deref(),
    )
    .await?;
    let target_domain = crate::query::classify_query(&state, &request.query).await;
    let deduped = crate::retrieval::dedup::dedupe_and_filter(&target_domain, raw_results, n_results);

    if deduped.is_empty() {
        let stream: EventStream = Box::pin(single_status_stream("no_context"));
        return Ok(Sse::new(stream).keep_alive(KeepAlive::default()));
    }

    let assembled = crate::context::assemble(&request.query, &session.history, &deduped);
    let token_stream = crate::stream::dispatch(&state, request.query.clone(), assembled.context.clone()).await?;

    let final_state = Arc::new(Mutex::new(DispatchState::NotStarted));
    let tap = final_state.clone();
    let body = token_stream.map(move |frame| {
        *tap.lock().unwrap() = match &frame {
            Ok(f) if f.done => DispatchState::Done,
            Ok(_) => DispatchState::Streaming,
            Err(_) => DispatchState::Canceled,
        };
        let event = match frame {
            Ok(f) => Event::default()
                .event("message")
                .json_data(&f)
                .unwrap_or_else(|_| Event::default().event("message")),
            Err(e) => Event::default().event("error").data(e.to_string()),
        };
        Ok::<Event, Infallible>(event)
    });

    let tail = futures::stream::once(async move {
        let status = match *final_state.lock().unwrap() {
            DispatchState::Done => "success",
            _ => "error",
        };
        Ok::<Event, Infallible>(status_event(status))
    });

    let stream: EventStream = Box::pin(body.chain(tail));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn list_documents(State(state): State<Arc<AppState>>) -> Result<Json<Vec<DocumentListEntry>>, CoreError> {
    let rows = state.index.list_documents().await?;
    let entries = rows
        .into_iter()
        .map(|(filename, domain)| {
            let chunk_count = state
                .documents
                .get(&filename)
                .map(|d| d.chunk_count)
                .unwrap_or(0);
            DocumentListEntry {
                filename,
                domain,
                chunk_count,
            }
        })
        .collect();
    Ok(Json(entries))
}

async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    state.index.delete(&filename).await?;
    state.documents.mark_deleted(&filename).await?;
    Ok(Json(serde_json::json!({ "deleted": filename })))
}

async fn list_domains(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, CoreError> {
    let rows = state.index.list_documents().await?;
    let mut domains: Vec<String> = rows.into_iter().map(|(_, domain)| domain).collect();
    domains.sort();
    domains.dedup();
    Ok(Json(domains))
}

async fn reset_kb(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, CoreError> {
    state.index.reset().await?;
    Ok(Json(serde_json::json!({ "reset": true })))
}
