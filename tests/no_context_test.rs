mod common;

use std::sync::Arc;

use ragcore::core::app_state::AppState;
use ragcore::core::types::{Chunk, QueryRequest, QueryStatus};

fn vector(seed: f32) -> Vec<f32> {
    (0..768).map(|i| (seed + i as f32) / 1000.0).collect()
}

/// A populated index that simply has nothing relevant to a query (here,
/// the only indexed chunk is filtered out by `filename_filter`) must still
/// answer with `status: "no_context"` and the fixed fallback message,
/// without ever reaching the LLM endpoint. The embedding is pre-seeded into
/// the exact-hash cache so the test needs no reachable embedding endpoint.
#[tokio::test]
async fn filtered_out_retrieval_yields_no_context_status() {
    let (config, _tmp) = common::test_config();
    let state = Arc::new(
        AppState::new(config, common::http_client())
            .await
            .expect("init app state"),
    );

    let chunk = Chunk {
        id: uuid::Uuid::new_v4().to_string(),
        document_id: uuid::Uuid::new_v4().to_string(),
        filename: "other.pdf".to_string(),
        content: "unrelated indexed content".to_string(),
        chunk_type: "text".to_string(),
        chunk_index: 0,
        domain: "general".to_string(),
        page_refs: vec![],
        title: "other.pdf".to_string(),
        section: None,
        metadata: Default::default(),
    };
    state
        .index
        .upsert(&[(chunk, vector(1.0))])
        .await
        .expect("upsert chunk");

    let query = "what does this say?";
    state
        .embedding_cache
        .put(query, vector(1.0))
        .await
        .expect("seed embedding cache");

    let response = ragcore::pipeline::answer_query(
        &state,
        QueryRequest {
            query: query.to_string(),
            session_id: None,
            n_results: None,
            filename_filter: Some("nonexistent.pdf".to_string()),
            domain_filter: None,
        },
    )
    .await
    .expect("answer_query must degrade rather than error");

    assert_eq!(response.status, QueryStatus::NoContext);
    assert!(response.sources.is_empty());
}
