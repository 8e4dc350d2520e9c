use std::collections::HashMap;
use std::sync::Mutex;

use crate::core::types::{Document, DocumentAnnotation, DocumentRelationship, DocumentStatus};
use crate::error::CoreError;
use crate::persist;

fn safe_name(filename: &str) -> String {
    filename
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

/// Document metadata store, one JSON file per filename under
/// `document_metadata_path`, plus a single adjacency-list file for
/// relationships (kept out of `Document` by design, see core::types).
pub struct DocumentStore {
    dir: std::path::PathBuf,
    documents: Mutex<HashMap<String, Document>>,
    relationships: Mutex<Vec<DocumentRelationship>>,
}

impl DocumentStore {
    pub async fn load_or_new(dir: std::path::PathBuf) -> Result<Self, CoreError> {
        persist::ensure_dir(&dir).await?;
        let mut documents = HashMap::new();
        for path in persist::list_entries(&dir).await? {
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(bytes) = tokio::fs::read(&path).await {
                if let Ok(doc) = serde_json::from_slice::<Document>(&bytes) {
                    documents.insert(doc.filename.clone(), doc);
                }
            }
        }
        let relationships = Self::read_relationships(&dir).await;
        Ok(Self {
            dir,
            documents: Mutex::new(documents),
            relationships: Mutex::new(relationships),
        })
    }

    async fn read_relationships(dir: &std::path::Path) -> Vec<DocumentRelationship> {
        let path = dir.join("_relationships.json");
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Inserts a freshly-ingested document, or, on re-ingest of a filename
    /// whose content hash changed, appends a `DocumentVersion` to the
    /// existing record instead of discarding its history.
    pub async fn upsert(&self, mut incoming: Document) -> Result<(), CoreError> {
        let previous = self.documents.lock().unwrap().get(&incoming.filename).cloned();
        if let Some(prev) = previous {
            if prev.content_hash != incoming.content_hash {
                let mut versions = prev.versions.clone();
                versions.push(crate::core::types::DocumentVersion {
                    version_number: versions.len() as u32 + 1,
                    content_hash: prev.content_hash.clone(),
                    created_at: prev.updated_at,
                    change_summary: "re-ingested with changed content".to_string(),
                });
                incoming.versions = versions;
                incoming.annotations = prev.annotations;
            } else {
                incoming.versions = prev.versions;
                incoming.annotations = prev.annotations;
            }
        }

        self.documents
            .lock()
            .unwrap()
            .insert(incoming.filename.clone(), incoming.clone());
        self.persist_one(&incoming).await
    }

    async fn persist_one(&self, doc: &Document) -> Result<(), CoreError> {
        let path = self.dir.join(format!("{}.json", safe_name(&doc.filename)));
        let bytes = serde_json::to_vec_pretty(doc).map_err(|e| CoreError::Other(e.into()))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| CoreError::Other(e.into()))
    }

    pub fn list(&self) -> Vec<Document> {
        self.documents.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, filename: &str) -> Option<Document> {
        self.documents.lock().unwrap().get(filename).cloned()
    }

    /// Tombstones a document rather than removing its metadata record, so
    /// annotations/versions survive a vector-index delete.
    pub async fn mark_deleted(&self, filename: &str) -> Result<(), CoreError> {
        let doc = {
            let mut documents = self.documents.lock().unwrap();
            let Some(doc) = documents.get_mut(filename) else {
                return Ok(());
            };
            doc.status = DocumentStatus::Deleted;
            doc.updated_at = chrono::Utc::now();
            doc.clone()
        };
        self.persist_one(&doc).await
    }

    pub async fn add_annotation(
        &self,
        filename: &str,
        annotation: DocumentAnnotation,
    ) -> Result<(), CoreError> {
        let doc = {
            let mut documents = self.documents.lock().unwrap();
            let Some(doc) = documents.get_mut(filename) else {
                return Err(CoreError::InvariantViolation(format!(
                    "no document metadata for {filename}"
                )));
            };
            doc.annotations.push(annotation);
            doc.clone()
        };
        self.persist_one(&doc).await
    }

    pub async fn add_relationship(&self, relationship: DocumentRelationship) -> Result<(), CoreError> {
        let snapshot = {
            let mut relationships = self.relationships.lock().unwrap();
            relationships.push(relationship);
            relationships.clone()
        };
        let path = self.dir.join("_relationships.json");
        let bytes = serde_json::to_vec_pretty(&snapshot).map_err(|e| CoreError::Other(e.into()))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| CoreError::Other(e.into()))
    }

    pub fn relationships_for(&self, filename: &str) -> Vec<DocumentRelationship> {
        self.relationships
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.source_filename == filename || r.target_filename == filename)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(filename: &str, hash: &str) -> Document {
        let now = chrono::Utc::now();
        Document {
            id: uuid::Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            content_hash: hash.to_string(),
            domain: "general".to_string(),
            status: DocumentStatus::Active,
            chunk_count: 1,
            versions: Vec::new(),
            annotations: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn reingest_with_changed_hash_appends_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::load_or_new(dir.path().to_path_buf()).await.unwrap();
        store.upsert(doc("a.txt", "hash1")).await.unwrap();
        store.upsert(doc("a.txt", "hash2")).await.unwrap();
        let current = store.get("a.txt").unwrap();
        assert_eq!(current.content_hash, "hash2");
        assert_eq!(current.versions.len(), 1);
    }

    #[tokio::test]
    async fn mark_deleted_sets_tombstone_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::load_or_new(dir.path().to_path_buf()).await.unwrap();
        store.upsert(doc("a.txt", "hash1")).await.unwrap();
        store.mark_deleted("a.txt").await.unwrap();
        assert_eq!(store.get("a.txt").unwrap().status, DocumentStatus::Deleted);
    }
}
