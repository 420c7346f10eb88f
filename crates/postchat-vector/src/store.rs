use std::collections::HashMap;

use async_trait::async_trait;
use postchat_core::traits::ChunkStore;
use postchat_core::types::{Chunk, PostId};
use postchat_core::{Error, Result};
use tokio::sync::RwLock;
use tracing::debug;

/// Chunk sets per post. A replace swaps the whole set under one write lock.
#[derive(Default)]
pub struct MemoryChunkStore {
    chunks: RwLock<HashMap<PostId, Vec<Chunk>>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn total_chunks(&self) -> usize {
        self.chunks.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn get_chunks_by_post(&self, post_id: PostId) -> Result<Vec<Chunk>> {
        let mut out = self.chunks.read().await.get(&post_id).cloned().unwrap_or_default();
        out.sort_by_key(|c| c.chunk_index);
        Ok(out)
    }

    async fn replace_chunks(&self, post_id: PostId, chunks: Vec<Chunk>) -> Result<()> {
        if let Some(stray) = chunks.iter().find(|c| c.post_id != post_id) {
            return Err(Error::Storage(format!("chunk {} belongs to post {}, not {}", stray.id, stray.post_id, post_id)));
        }
        if let Some(bare) = chunks.iter().find(|c| c.vector.is_empty()) {
            return Err(Error::Storage(format!("chunk {} has no vector", bare.id)));
        }
        let count = chunks.len();
        let mut table = self.chunks.write().await;
        if chunks.is_empty() {
            table.remove(&post_id);
        } else {
            table.insert(post_id, chunks);
        }
        debug!(%post_id, chunks = count, "replaced chunk set");
        Ok(())
    }

    async fn delete_chunks(&self, post_id: PostId) -> Result<()> {
        let removed = self.chunks.write().await.remove(&post_id).map(|v| v.len()).unwrap_or(0);
        debug!(%post_id, removed, "deleted chunks");
        Ok(())
    }
}
