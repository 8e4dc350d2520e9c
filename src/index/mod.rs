use std::sync::Arc;

use arrow_array::{
    types::Float32Type, Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use backoff::{future::retry, ExponentialBackoff};

use crate::core::config::Config;
use crate::core::types::Chunk;
use crate::error::CoreError;

/// Tuning parameters we intend the ANN store to use. lancedb's `Index::Auto`
/// is the only index-creation call we invoke with confidence (see
/// DESIGN.md OQ-1); these numbers are tracked for introspection and to guide
/// a future explicit-HNSW builder call once its API shape is confirmed.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct IndexTuning {
    pub construction_ef: usize,
    pub search_ef: usize,
    pub m: usize,
}

impl Default for IndexTuning {
    fn default() -> Self {
        Self {
            construction_ef: 128,
            search_ef: 64,
            m: 16,
        }
    }
}

const UPSERT_BATCH_SIZE: usize = 50;
const UPSERT_BATCH_PACING: std::time::Duration = std::time::Duration::from_millis(500);

pub struct VectorIndexManager {
    table: tokio::sync::Mutex<lancedb::Table>,
    embedding_dim: usize,
    pub tuning: IndexTuning,
}

fn chunk_schema(embedding_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("document_id", DataType::Utf8, false),
        Field::new("filename", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("chunk_type", DataType::Utf8, false),
        Field::new("domain", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("section", DataType::Utf8, true),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                embedding_dim as i32,
            ),
            false,
        ),
    ]))
}

impl VectorIndexManager {
    pub async fn connect(cfg: &Config) -> anyhow::Result<Self> {
        let db = lancedb::connect(&cfg.ann_store_path).execute().await?;
        let table_name = &cfg.ann_collection_name;

        // Probe dimension lazily: the first upsert determines it for a
        // freshly-created table, matching the teacher's eager embedding-model
        // dimension probe pattern in `features/history.rs`, adapted since we
        // don't hold an embedding model in-process.
        let embedding_dim = 768;

        let table = match db.open_table(table_name).execute().await {
            Ok(t) => t,
            Err(lancedb::Error::TableNotFound { .. }) => {
                let schema = chunk_schema(embedding_dim);
                let empty = RecordBatchIterator::new(Vec::<Result<RecordBatch, arrow_schema::ArrowError>>::new(), schema.clone());
                db.create_table(table_name, Box::new(empty))
                    .execute()
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = table
            .create_index(&["vector"], lancedb::index::Index::Auto)
            .execute()
            .await
        {
            tracing::debug!("index creation skipped (likely empty table): {}", e);
        }

        Ok(Self {
            table: tokio::sync::Mutex::new(table),
            embedding_dim,
            tuning: IndexTuning::default(),
        })
    }

    /// Upserts chunks in batches of `UPSERT_BATCH_SIZE`, pacing ~500ms
    /// between batches and retrying each batch up to 3 times with
    /// exponential backoff, matching
    /// `vectorstore.py::add_to_vector_collection`'s `@retry` decorator.
    pub async fn upsert(&self, chunks: &[(Chunk, Vec<f32>)]) -> Result<(), CoreError> {
        for batch in chunks.chunks(UPSERT_BATCH_SIZE) {
            let policy = ExponentialBackoff {
                max_elapsed_time: Some(std::time::Duration::from_secs(30)),
                ..Default::default()
            };
            let batch_ref = batch;
            retry(policy, || async {
                self.upsert_batch(batch_ref)
                    .await
                    .map_err(backoff::Error::transient)
            })
            .await
            .map_err(|e: CoreError| CoreError::UpsertFailed(e.to_string()))?;

            if chunks.len() > UPSERT_BATCH_SIZE {
                tokio::time::sleep(UPSERT_BATCH_PACING).await;
            }
        }
        Ok(())
    }

    async fn upsert_batch(&self, batch: &[(Chunk, Vec<f32>)]) -> Result<(), CoreError> {
        let schema = chunk_schema(self.embedding_dim);

        let ids: Vec<&str> = batch.iter().map(|(c, _)| c.id.as_str()).collect();
        let document_ids: Vec<&str> = batch.iter().map(|(c, _)| c.document_id.as_str()).collect();
        let filenames: Vec<&str> = batch.iter().map(|(c, _)| c.filename.as_str()).collect();
        let contents: Vec<&str> = batch.iter().map(|(c, _)| c.content.as_str()).collect();
        let chunk_types: Vec<&str> = batch.iter().map(|(c, _)| c.chunk_type.as_str()).collect();
        let domains: Vec<&str> = batch.iter().map(|(c, _)| c.domain.as_str()).collect();
        let titles: Vec<&str> = batch.iter().map(|(c, _)| c.title.as_str()).collect();
        let sections: Vec<Option<&str>> = batch.iter().map(|(c, _)| c.section.as_deref()).collect();
        let vectors: Vec<Option<Vec<Option<f32>>>> = batch
            .iter()
            .map(|(_, v)| Some(v.iter().map(|f| Some(*f)).collect()))
            .collect();

        let vector_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            vectors,
            self.embedding_dim as i32,
        );

        let record = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(document_ids)),
                Arc::new(StringArray::from(filenames)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(chunk_types)),
                Arc::new(StringArray::from(domains)),
                Arc::new(StringArray::from(titles)),
                Arc::new(StringArray::from(sections)),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| CoreError::UpsertFailed(e.to_string()))?;

        let batches = RecordBatchIterator::new(vec![Ok(record)], schema);
        let table = self.table.lock().await;
        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| CoreError::UpsertFailed(e.to_string()))?;
        Ok(())
    }

    pub async fn query(
        &self,
        embedding: &[f32],
        limit: usize,
        filename_filter: Option<&str>,
        domain_filter: Option<&str>,
    ) -> Result<Vec<(Chunk, f32)>, CoreError> {
        let table = self.table.lock().await;
        let mut builder = table
            .query()
            .nearest_to(embedding)
            .map_err(|e| CoreError::QueryFailed(e.to_string()))?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(limit);

        let mut conditions = Vec::new();
        if let Some(f) = filename_filter {
            conditions.push(format!("filename = '{}'", f.replace('\'', "''")));
        }
        // `general` is treated as "no domain filter" (DESIGN.md OQ-4).
        if let Some(d) = domain_filter.filter(|d| *d != "general") {
            conditions.push(format!("domain = '{}'", d.replace('\'', "''")));
        }
        if !conditions.is_empty() {
            builder = builder.only_if(conditions.join(" AND "));
        }

        let mut stream = builder
            .execute()
            .await
            .map_err(|e| CoreError::QueryFailed(e.to_string()))?;

        let mut out = Vec::new();
        use futures::TryStreamExt;
        while let Some(record) = stream
            .try_next()
            .await
            .map_err(|e| CoreError::QueryFailed(e.to_string()))?
        {
            out.extend(batch_to_chunks(&record)?);
        }
        Ok(out)
    }

    pub async fn delete(&self, filename: &str) -> Result<(), CoreError> {
        let table = self.table.lock().await;
        table
            .delete(&format!("filename = '{}'", filename.replace('\'', "''")))
            .await
            .map_err(|e| CoreError::QueryFailed(e.to_string()))
    }

    /// Drops every row, used by the knowledge-base reset endpoint.
    pub async fn reset(&self) -> Result<(), CoreError> {
        let table = self.table.lock().await;
        table
            .delete("id IS NOT NULL")
            .await
            .map_err(|e| CoreError::QueryFailed(e.to_string()))
    }

    /// Best-effort document listing via a broad scan, matching
    /// `vectorstore.py::list_documents`'s "query_texts=['.'], n_results=10000"
    /// aggregation approach.
    pub async fn list_documents(&self) -> Result<Vec<(String, String)>, CoreError> {
        let table = self.table.lock().await;
        let mut stream = table
            .query()
            .limit(10_000)
            .execute()
            .await
            .map_err(|e| CoreError::QueryFailed(e.to_string()))?;

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        use futures::TryStreamExt;
        while let Some(record) = stream
            .try_next()
            .await
            .map_err(|e| CoreError::QueryFailed(e.to_string()))?
        {
            for chunk in batch_to_chunks(&record)? {
                if seen.insert(chunk.0.filename.clone()) {
                    out.push((chunk.0.filename, chunk.0.domain));
                }
            }
        }
        Ok(out)
    }

    pub async fn count_rows(&self) -> Result<usize, CoreError> {
        let table = self.table.lock().await;
        table
            .count_rows(None)
            .await
            .map_err(|e| CoreError::QueryFailed(e.to_string()))
    }
}

fn batch_to_chunks(record: &RecordBatch) -> Result<Vec<(Chunk, f32)>, CoreError> {
    let col = |name: &str| -> Result<&StringArray, CoreError> {
        record
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| CoreError::QueryFailed(format!("missing/invalid column: {name}")))
    };

    let ids = col("id")?;
    let document_ids = col("document_id")?;
    let filenames = col("filename")?;
    let contents = col("content")?;
    let chunk_types = col("chunk_type")?;
    let domains = col("domain")?;
    // Older rows written before title/section existed fall back to the
    // filename and no section, rather than failing the whole read.
    let titles = record.column_by_name("title").and_then(|c| c.as_any().downcast_ref::<StringArray>());
    let sections = record.column_by_name("section").and_then(|c| c.as_any().downcast_ref::<StringArray>());
    let distance = record
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let mut out = Vec::with_capacity(record.num_rows());
    for i in 0..record.num_rows() {
        let similarity = distance
            .map(|d| (1.0 - d.value(i)).clamp(0.0, 1.0))
            .unwrap_or(0.0);
        let filename = filenames.value(i).to_string();
        let title = titles
            .filter(|t| !t.is_null(i))
            .map(|t| t.value(i).to_string())
            .unwrap_or_else(|| filename.clone());
        let section = sections
            .filter(|s| !s.is_null(i))
            .map(|s| s.value(i).to_string());
        out.push((
            Chunk {
                id: ids.value(i).to_string(),
                document_id: document_ids.value(i).to_string(),
                filename,
                content: contents.value(i).to_string(),
                chunk_type: chunk_types.value(i).to_string(),
                chunk_index: 0,
                domain: domains.value(i).to_string(),
                page_refs: Vec::new(),
                title,
                section,
                metadata: Default::default(),
            },
            similarity,
        ));
    }
    Ok(out)
}
