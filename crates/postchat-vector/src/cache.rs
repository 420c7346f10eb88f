//! Embedding cache keyed by `(embedder_id, content_hash)`.
//!
//! Consulted before calling a provider and written through on misses, so
//! re-embedding unchanged text does not repeat remote calls.
use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub content_hash: String,
    pub embedder_id: String,
    pub vector: Vec<f32>,
}

pub fn hash_content(s: &str) -> String {
    blake3::hash(s.as_bytes()).to_hex().to_string()
}

pub struct EmbeddingCache {
    capacity: usize,
    entries: RwLock<HashMap<(String, String), Vec<f32>>>,
}

impl EmbeddingCache {
    /// `capacity == 0` disables caching.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: RwLock::new(HashMap::new()) }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Vectors for the hashes present under `embedder_id`, keyed by hash.
    pub async fn get_many(&self, embedder_id: &str, hashes: &[String]) -> HashMap<String, Vec<f32>> {
        if !self.is_enabled() { return HashMap::new(); }
        let entries = self.entries.read().await;
        let mut out = HashMap::new();
        for h in hashes {
            if let Some(v) = entries.get(&(embedder_id.to_string(), h.clone())) { out.insert(h.clone(), v.clone()); }
        }
        debug!(hits = out.len(), lookups = hashes.len(), "embedding cache lookup");
        out
    }

    pub async fn put_many(&self, new_entries: Vec<CacheEntry>) {
        if !self.is_enabled() || new_entries.is_empty() { return; }
        let mut entries = self.entries.write().await;
        for e in new_entries {
            if entries.len() >= self.capacity {
                debug!(capacity = self.capacity, "embedding cache full, clearing");
                entries.clear();
            }
            entries.insert((e.embedder_id, e.content_hash), e.vector);
        }
    }
}
