mod common;

use std::sync::Arc;

use ragcore::core::app_state::AppState;
use ragcore::core::types::{Chunk, Document, DocumentStatus};

fn chunk(filename: &str) -> Chunk {
    Chunk {
        id: uuid::Uuid::new_v4().to_string(),
        document_id: uuid::Uuid::new_v4().to_string(),
        filename: filename.to_string(),
        content: "some indexed content".to_string(),
        chunk_type: "text".to_string(),
        chunk_index: 0,
        domain: "general".to_string(),
        page_refs: vec![],
        title: filename.to_string(),
        section: None,
        metadata: Default::default(),
    }
}

fn vector() -> Vec<f32> {
    vec![0.1; 768]
}

/// Deleting a document must clear both the vector index and tombstone the
/// document metadata record, without discarding its version/annotation
/// history.
#[tokio::test]
async fn delete_clears_index_and_tombstones_metadata() {
    let (config, _tmp) = common::test_config();
    let state = Arc::new(
        AppState::new(config, common::http_client())
            .await
            .expect("init app state"),
    );

    state
        .index
        .upsert(&[(chunk("penal.pdf"), vector())])
        .await
        .expect("upsert chunk");

    let now = chrono::Utc::now();
    state
        .documents
        .upsert(Document {
            id: uuid::Uuid::new_v4().to_string(),
            filename: "penal.pdf".to_string(),
            content_hash: "abc123".to_string(),
            domain: "law".to_string(),
            status: DocumentStatus::Active,
            chunk_count: 1,
            versions: Vec::new(),
            annotations: Vec::new(),
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("record document metadata");

    assert_eq!(state.index.count_rows().await.expect("count rows"), 1);

    state.index.delete("penal.pdf").await.expect("delete from index");
    state
        .documents
        .mark_deleted("penal.pdf")
        .await
        .expect("tombstone metadata");

    assert_eq!(
        state.index.count_rows().await.expect("count rows after delete"),
        0,
        "a deleted filename must return zero rows on subsequent queries"
    );
    let doc = state.documents.get("penal.pdf").expect("metadata survives delete");
    assert_eq!(doc.status, DocumentStatus::Deleted);
    assert_eq!(doc.chunk_count, 1, "tombstone preserves prior chunk_count for audit");
}
