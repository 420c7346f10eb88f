use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::{ChatExchange, Chunk, Fragment, JobId, Post, PostId, UserId};

/// Lazy, finite and non-restartable sequence of answer fragments.
/// Dropping it closes the underlying connection.
pub type FragmentStream = BoxStream<'static, Result<Fragment>>;

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn get_by_id(&self, id: PostId) -> Result<Option<Post>>;
    async fn update(&self, post: &Post) -> Result<()>;
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// All chunks of a post ordered by `chunk_index`.
    async fn get_chunks_by_post(&self, post_id: PostId) -> Result<Vec<Chunk>>;
    /// Atomically swap the post's chunk set: afterwards either all of `chunks`
    /// are stored or the previous set is untouched.
    async fn replace_chunks(&self, post_id: PostId, chunks: Vec<Chunk>) -> Result<()>;
    /// Idempotent.
    async fn delete_chunks(&self, post_id: PostId) -> Result<()>;
}

#[async_trait]
pub trait ExchangeRepository: Send + Sync {
    async fn create_exchange(&self, exchange: &ChatExchange) -> Result<()>;
    async fn list_by_post(&self, post_id: PostId) -> Result<Vec<ChatExchange>>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model, used as a cache namespace.
    fn embedder_id(&self) -> &str;
    /// Embedding dimensionality, `0` when only known after the first call.
    fn dim(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Submit `context` as the system instruction and `question` as the user
    /// message. Connection failures surface here, before any fragment.
    async fn stream_answer(&self, context: &str, question: &str) -> Result<FragmentStream>;
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, post_id: PostId, user_id: UserId) -> Result<JobId>;
    async fn has_active_job(&self, post_id: PostId) -> bool;
}
