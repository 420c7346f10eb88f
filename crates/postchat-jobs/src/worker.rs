use std::sync::Arc;

use postchat_core::data_processor::DataProcessor;
use postchat_core::locks::PostLocks;
use postchat_core::traits::{ChunkStore, Embedder, PostRepository};
use postchat_core::types::EmbeddingJob;
use postchat_core::{Error, Result, ValidationError};
use postchat_vector::cache::{hash_content, CacheEntry, EmbeddingCache};
use tracing::{debug, info};

use crate::queue::{MemoryJobQueue, RetryDecision};

/// Turns one post into a stored, embedded chunk set and marks it ready.
pub struct EmbeddingWorker {
    posts: Arc<dyn PostRepository>,
    chunks: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
    processor: DataProcessor,
    locks: PostLocks,
}

impl EmbeddingWorker {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        chunks: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        cache: Arc<EmbeddingCache>,
        processor: DataProcessor,
        locks: PostLocks,
    ) -> Self {
        Self { posts, chunks, embedder, cache, processor, locks }
    }

    /// Returns the number of chunks written. Nothing is written unless every
    /// chunk was embedded.
    pub async fn process(&self, job: &EmbeddingJob) -> Result<usize> {
        let post = self
            .posts
            .get_by_id(job.post_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("post {}", job.post_id)))?;

        let mut chunks = self.processor.chunk_post(&post);
        if chunks.is_empty() {
            return Err(ValidationError::NoContent.into());
        }

        let embedder_id = self.embedder.embedder_id().to_string();
        let hashes: Vec<String> = chunks.iter().map(|c| hash_content(&c.content)).collect();
        let cached = self.cache.get_many(&embedder_id, &hashes).await;
        let mut new_entries = Vec::new();
        for (chunk, hash) in chunks.iter_mut().zip(hashes) {
            chunk.vector = match cached.get(&hash) {
                Some(v) => v.clone(),
                None => {
                    let v = self.embedder.embed(&chunk.content).await?;
                    new_entries.push(CacheEntry { content_hash: hash, embedder_id: embedder_id.clone(), vector: v.clone() });
                    v
                }
            };
            debug!(post_id = %post.id, chunk_index = chunk.chunk_index, "embedded chunk");
        }
        let misses = new_entries.len();
        self.cache.put_many(new_entries).await;

        let count = chunks.len();
        let _guard = self.locks.lock(job.post_id).await?;
        let mut post = self
            .posts
            .get_by_id(job.post_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("post {}", job.post_id)))?;
        self.chunks.replace_chunks(post.id, chunks).await?;
        post.chat_enabled = true;
        post.embeddings_ready = true;
        self.posts.update(&post).await?;
        info!(post_id = %post.id, chunks = count, cache_misses = misses, "post embeddings ready");
        Ok(count)
    }

    /// Process `job` and settle it on `queue`: complete, retry with backoff,
    /// or bury when the failure cannot succeed on a later attempt.
    pub async fn handle(&self, queue: &MemoryJobQueue, job: EmbeddingJob) -> Option<RetryDecision> {
        match self.process(&job).await {
            Ok(_) => {
                queue.complete(job.id).await;
                None
            }
            Err(e) if e.is_retryable() => Some(queue.retry_or_bury(&job, &e).await),
            Err(e) => {
                info!(job_id = %job.id, post_id = %job.post_id, error = %e, "dropping embedding job");
                queue.bury(job.id, &e).await;
                Some(RetryDecision::Buried)
            }
        }
    }
}
