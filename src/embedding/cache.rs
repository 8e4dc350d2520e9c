use std::collections::HashSet;
use std::sync::Mutex;

use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::core::config::Config;
use crate::error::CoreError;
use crate::persist;

#[derive(Clone, serde::Serialize, serde::Deserialize)]
struct Entry {
    original_text: String,
    vector: Vec<f32>,
}

/// Content-hash-keyed embedding cache with FIFO eviction at a fixed capacity,
/// mirroring the original's per-hash pickle cache (`rag_core/cache.py`) but
/// genuinely durable: every insert is mirrored to disk so a restart doesn't
/// lose the cache (see DESIGN.md, Open Question OQ-2).
pub struct EmbeddingCache {
    capacity: usize,
    dir: std::path::PathBuf,
    entries: Mutex<IndexMap<String, Entry>>,
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

const SIMILARITY_THRESHOLD: f32 = 0.95;

impl EmbeddingCache {
    pub async fn load_or_new(cfg: &Config) -> Result<Self, CoreError> {
        let dir = cfg.embeddings_cache_path.clone();
        persist::ensure_dir(&dir).await?;

        let mut entries = IndexMap::new();
        for path in persist::list_entries(&dir).await? {
            if path.extension().and_then(|e| e.to_str()) != Some("bincode") {
                continue;
            }
            let Some(hash) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(entry) = persist::read_bincode::<Entry>(&path).await? {
                entries.insert(hash.to_string(), entry);
            }
        }

        Ok(Self {
            capacity: cfg.embedding_cache_capacity,
            dir,
            entries: Mutex::new(entries),
        })
    }

    /// Exact lookup by content hash.
    pub fn get_exact(&self, text: &str) -> Option<Vec<f32>> {
        let hash = content_hash(text);
        let entries = self.entries.lock().unwrap();
        entries.get(&hash).map(|e| e.vector.clone())
    }

    /// Fallback lookup: scans stored originals for a near-duplicate by
    /// token-set Jaccard similarity. Only consulted on an exact-hash miss.
    pub fn get_similar(&self, text: &str) -> Option<Vec<f32>> {
        let query_tokens = tokenize(text);
        let entries = self.entries.lock().unwrap();
        entries
            .values()
            .filter_map(|e| {
                let score = jaccard(&query_tokens, &tokenize(&e.original_text));
                (score >= SIMILARITY_THRESHOLD).then_some((score, e.vector.clone()))
            })
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, vector)| vector)
    }

    pub async fn put(&self, text: &str, vector: Vec<f32>) -> Result<(), CoreError> {
        let hash = content_hash(text);
        let entry = Entry {
            original_text: text.to_string(),
            vector,
        };

        let evicted = {
            let mut entries = self.entries.lock().unwrap();
            entries.insert(hash.clone(), entry.clone());
            if entries.len() > self.capacity {
                // FIFO: the oldest inserted key sits at index 0.
                entries.shift_remove_index(0).map(|(k, _)| k)
            } else {
                None
            }
        };

        persist::write_bincode(&persist::content_hash_path(&self.dir, &hash), &entry).await?;
        if let Some(evicted_hash) = evicted {
            let path = persist::content_hash_path(&self.dir, &evicted_hash);
            let _ = tokio::fs::remove_file(path).await;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best-effort flush hook for graceful shutdown; entries are already
    /// written through on every `put`, so this currently only logs the
    /// in-memory size for observability.
    pub async fn flush(&self) -> Result<(), CoreError> {
        tracing::debug!(entries = self.len(), "embedding cache flush (write-through, no-op)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jaccard_identical_sets_is_one() {
        let a = tokenize("the quick brown fox");
        let b = tokenize("the quick brown fox");
        assert_eq!(jaccard(&a, &b), 1.0);
    }

    #[test]
    fn jaccard_disjoint_sets_is_zero() {
        let a = tokenize("alpha beta");
        let b = tokenize("gamma delta");
        assert_eq!(jaccard(&a, &b), 0.0);
    }

    #[tokio::test]
    async fn exact_hit_after_put() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache {
            capacity: 10,
            dir: dir.path().to_path_buf(),
            entries: Mutex::new(IndexMap::new()),
        };
        cache.put("hello world", vec![1.0, 2.0]).await.unwrap();
        assert_eq!(cache.get_exact("hello world"), Some(vec![1.0, 2.0]));
    }

    #[tokio::test]
    async fn fifo_eviction_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache {
            capacity: 2,
            dir: dir.path().to_path_buf(),
            entries: Mutex::new(IndexMap::new()),
        };
        cache.put("first", vec![1.0]).await.unwrap();
        cache.put("second", vec![2.0]).await.unwrap();
        cache.put("third", vec![3.0]).await.unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_exact("first"), None);
        assert_eq!(cache.get_exact("third"), Some(vec![3.0]));
    }
}
