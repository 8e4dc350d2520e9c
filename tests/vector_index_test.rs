mod common;

use std::collections::HashMap;

use ragcore::core::types::Chunk;
use ragcore::index::VectorIndexManager;

fn chunk(filename: &str, domain: &str, index: usize) -> Chunk {
    Chunk {
        id: uuid::Uuid::new_v4().to_string(),
        document_id: uuid::Uuid::new_v4().to_string(),
        filename: filename.to_string(),
        content: format!("chunk {index} of {filename}"),
        chunk_type: "text".to_string(),
        chunk_index: index,
        domain: domain.to_string(),
        page_refs: vec![],
        title: filename.to_string(),
        section: None,
        metadata: HashMap::new(),
    }
}

fn vector(seed: f32) -> Vec<f32> {
    (0..768).map(|i| (seed + i as f32) / 1000.0).collect()
}

#[tokio::test]
async fn upsert_then_query_returns_nearest_neighbor() {
    let (config, _tmp) = common::test_config();
    let index = VectorIndexManager::connect(&config).await.expect("connect index");

    let a = chunk("penal.pdf", "law", 0);
    let b = chunk("recipe.txt", "cooking", 0);
    index
        .upsert(&[(a.clone(), vector(1.0)), (b.clone(), vector(900.0))])
        .await
        .expect("upsert chunks");

    let results = index
        .query(&vector(1.0), 5, None, None)
        .await
        .expect("query index");

    assert!(!results.is_empty(), "expected at least one result");
    assert_eq!(results[0].0.filename, "penal.pdf");
}

#[tokio::test]
async fn domain_filter_excludes_other_domains() {
    let (config, _tmp) = common::test_config();
    let index = VectorIndexManager::connect(&config).await.expect("connect index");

    index
        .upsert(&[
            (chunk("law.pdf", "law", 0), vector(1.0)),
            (chunk("law2.pdf", "law", 1), vector(2.0)),
            (chunk("food.txt", "cooking", 0), vector(900.0)),
        ])
        .await
        .expect("upsert chunks");

    let results = index
        .query(&vector(1.0), 10, None, Some("law"))
        .await
        .expect("query with domain filter");

    assert!(
        results.iter().all(|(c, _)| c.domain == "law"),
        "domain_filter=law must exclude non-law chunks, got: {:?}",
        results.iter().map(|(c, _)| &c.domain).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn delete_then_query_returns_zero_rows_for_that_filename() {
    let (config, _tmp) = common::test_config();
    let index = VectorIndexManager::connect(&config).await.expect("connect index");

    index
        .upsert(&[(chunk("ephemeral.pdf", "general", 0), vector(5.0))])
        .await
        .expect("upsert chunk");
    assert_eq!(index.count_rows().await.expect("count rows"), 1);

    index.delete("ephemeral.pdf").await.expect("delete filename");

    assert_eq!(
        index.count_rows().await.expect("count rows after delete"),
        0,
        "delete must remove every row for the deleted filename"
    );
}

#[tokio::test]
async fn reset_drops_every_row_regardless_of_filename() {
    let (config, _tmp) = common::test_config();
    let index = VectorIndexManager::connect(&config).await.expect("connect index");

    index
        .upsert(&[
            (chunk("a.pdf", "law", 0), vector(1.0)),
            (chunk("b.pdf", "cooking", 0), vector(2.0)),
        ])
        .await
        .expect("upsert chunks");
    assert_eq!(index.count_rows().await.expect("count rows"), 2);

    index.reset().await.expect("reset knowledge base");

    assert_eq!(index.count_rows().await.expect("count rows after reset"), 0);
}
