mod common;

use std::sync::Arc;

use ragcore::core::app_state::AppState;
use ragcore::core::types::{QueryRequest, QueryStatus};

/// S4: an empty knowledge base must short-circuit before the embedding or LLM
/// endpoints are ever reached. `test_config` points both endpoint URLs at an
/// unreachable address, so reaching either one would turn into an `Err`
/// instead of the expected `status: "empty_kb"`.
#[tokio::test]
async fn empty_index_returns_empty_kb_without_calling_embedding_or_llm() {
    let (config, _tmp) = common::test_config();
    let state = Arc::new(
        AppState::new(config, common::http_client())
            .await
            .expect("init app state"),
    );

    assert_eq!(state.index.count_rows().await.expect("count rows"), 0);

    let request = QueryRequest {
        query: "what does article 12 say?".to_string(),
        session_id: None,
        n_results: None,
        filename_filter: None,
        domain_filter: None,
    };

    let response = ragcore::pipeline::answer_query(&state, request)
        .await
        .expect("answer_query must degrade gracefully, not error, on an empty index");

    assert_eq!(response.status, QueryStatus::EmptyKb);
    assert!(response.sources.is_empty());
    assert_eq!(response.context_metadata.used_chunks, 0);
}
