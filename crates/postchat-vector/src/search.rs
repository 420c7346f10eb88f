//! Question-to-context retrieval over a post's stored chunks.
use std::sync::Arc;

use postchat_core::similarity::cosine_similarity;
use postchat_core::traits::{ChunkStore, Embedder};
use postchat_core::types::{Chunk, PostId, ScoredChunk};
use postchat_core::Result;
use tracing::debug;

/// Context handed to the generator when a post has nothing to retrieve.
pub const NO_CONTEXT_FALLBACK: &str = "There is no relevant information from the document. Answer the question as best as you can or inform the user you cannot answer.";

/// Score every chunk against `question_vec` and keep the best `k`.
///
/// Descending by score; equal scores keep their chunk order.
pub fn rank_chunks(question_vec: &[f32], chunks: &[Chunk], k: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = chunks
        .iter()
        .map(|c| ScoredChunk { chunk_index: c.chunk_index, content: c.content.clone(), score: cosine_similarity(question_vec, &c.vector) })
        .collect();
    // sort_by is stable
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    scored
}

pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn ChunkStore>,
    top_k: usize,
}

impl RetrievalEngine {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn ChunkStore>, top_k: usize) -> Self {
        Self { embedder, store, top_k: top_k.max(1) }
    }

    /// Top chunks joined by a blank line, or [`NO_CONTEXT_FALLBACK`].
    pub async fn retrieve(&self, post_id: PostId, question: &str) -> Result<String> {
        let top = self.retrieve_scored(post_id, question).await?;
        if top.is_empty() {
            debug!(%post_id, "no chunks stored, using fallback context");
            return Ok(NO_CONTEXT_FALLBACK.to_string());
        }
        Ok(top.into_iter().map(|c| c.content).collect::<Vec<_>>().join("\n\n"))
    }

    pub async fn retrieve_scored(&self, post_id: PostId, question: &str) -> Result<Vec<ScoredChunk>> {
        let question_vec = self.embedder.embed(question).await?;
        let chunks = self.store.get_chunks_by_post(post_id).await?;
        let top = rank_chunks(&question_vec, &chunks, self.top_k);
        debug!(%post_id, candidates = chunks.len(), selected = top.len(), "ranked chunks");
        Ok(top)
    }
}
