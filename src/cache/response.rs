use std::sync::Mutex;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::core::types::EvictionPolicy;

struct Entry {
    value: String,
    created_at: Instant,
    hits: u64,
}

/// Bounded response cache with a selectable eviction policy fixed at
/// construction time. `moka`'s TinyLFU policy cannot be swapped for plain
/// LRU/FIFO at runtime, so this one cache is hand-rolled on `indexmap`
/// (see DESIGN.md).
pub struct ResponseCache {
    capacity: usize,
    ttl: Duration,
    policy: EvictionPolicy,
    entries: Mutex<IndexMap<String, Entry>>,
}

pub fn cache_key(query: &str, context: &str, session_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hasher.update(b"|");
    hasher.update(context.as_bytes());
    hasher.update(b"|");
    hasher.update(session_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl ResponseCache {
    pub fn new(capacity: usize, policy: EvictionPolicy, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            policy,
            entries: Mutex::new(IndexMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();
        let expired = entries
            .get(key)
            .map(|e| e.created_at.elapsed() > self.ttl)
            .unwrap_or(false);
        if expired {
            entries.shift_remove(key);
            return None;
        }
        let entry = entries.get_mut(key)?;
        entry.hits += 1;
        let value = entry.value.clone();
        if self.policy == EvictionPolicy::Lru {
            // Move to the back so eviction drops the least-recently-used.
            entries.shift_remove(key);
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.clone(),
                    created_at: Instant::now(),
                    hits: 0,
                },
            );
        }
        Some(value)
    }

    pub fn put(&self, key: String, value: String) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key,
            Entry {
                value,
                created_at: Instant::now(),
                hits: 0,
            },
        );
        if entries.len() > self.capacity {
            let evict_index = match self.policy {
                EvictionPolicy::Fifo | EvictionPolicy::Lru => 0,
                EvictionPolicy::Lfu => entries
                    .values()
                    .enumerate()
                    .min_by_key(|(_, e)| e.hits)
                    .map(|(i, _)| i)
                    .unwrap_or(0),
            };
            entries.shift_remove_index(evict_index);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_evicts_oldest_insert() {
        let cache = ResponseCache::new(2, EvictionPolicy::Fifo, Duration::from_secs(60));
        cache.put("a".to_string(), "1".to_string());
        cache.put("b".to_string(), "2".to_string());
        cache.put("c".to_string(), "3".to_string());
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("c"), Some("3".to_string()));
    }

    #[test]
    fn lfu_evicts_least_hit_entry() {
        let cache = ResponseCache::new(2, EvictionPolicy::Lfu, Duration::from_secs(60));
        cache.put("a".to_string(), "1".to_string());
        cache.put("b".to_string(), "2".to_string());
        cache.get("a");
        cache.get("a");
        cache.put("c".to_string(), "3".to_string());
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn cache_key_is_stable_for_same_inputs() {
        let k1 = cache_key("q", "c", "s");
        let k2 = cache_key("q", "c", "s");
        assert_eq!(k1, k2);
    }
}
