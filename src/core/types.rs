use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A document as registered with the ingestion pipeline. Cyclic references
/// between documents are never held here directly; see `DocumentRelationship`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub content_hash: String,
    pub domain: String,
    pub status: DocumentStatus,
    pub chunk_count: usize,
    pub versions: Vec<DocumentVersion>,
    pub annotations: Vec<DocumentAnnotation>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Active,
    Archived,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub version_number: u32,
    pub content_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub change_summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationType {
    Note,
    Flag,
    Correction,
    Summary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAnnotation {
    pub id: String,
    pub annotation_type: AnnotationType,
    pub body: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Kept out of `Document` by design: the adjacency list is a separate store
/// keyed by document id so cyclic document relationships never require a
/// direct struct reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRelationship {
    pub source_filename: String,
    pub target_filename: String,
    pub relationship_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub filename: String,
    pub content: String,
    pub chunk_type: String,
    pub chunk_index: usize,
    pub domain: String,
    pub page_refs: Vec<u32>,
    /// Display title for source attribution; defaults to the source filename.
    pub title: String,
    /// Structural section label (e.g. "Section 302"), when the chunker
    /// crossed a detected heading.
    pub section: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub content_hash: String,
    pub vector: Vec<f32>,
    pub dim: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub session_id: Option<String>,
    pub n_results: Option<usize>,
    pub filename_filter: Option<String>,
    pub domain_filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAttribution {
    pub filename: String,
    pub attribution: String,
    pub page_refs: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub content: String,
    pub source: SourceAttribution,
    pub domain: String,
    pub similarity: f32,
    pub hybrid_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub sources: Vec<SourceAttribution>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub history: Vec<ConversationMessage>,
    pub summary: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_active_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    Lru,
    Lfu,
    Fifo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub hits: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub filename: String,
    pub document_id: String,
    pub chunk_count: usize,
    pub domain: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub status: QueryStatus,
    pub answer: String,
    pub sources: Vec<SourceAttribution>,
    pub context_metadata: ContextMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Success,
    EmptyKb,
    NoContext,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub total_chunks: usize,
    pub used_chunks: usize,
    pub history_messages: usize,
    pub has_summary: bool,
    pub context_length: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentListEntry {
    pub filename: String,
    pub domain: String,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamFrame {
    pub message: StreamMessage,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMessage {
    pub content: String,
}
