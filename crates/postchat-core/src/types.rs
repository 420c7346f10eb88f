//! Domain types shared by the embedding pipeline and the chat orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PostId = Uuid;
pub type UserId = Uuid;
pub type ChunkId = Uuid;
pub type JobId = Uuid;
pub type ExchangeId = Uuid;

/// A document that can be opted into AI chat by its author.
///
/// - `chat_enabled`: the chat accepts questions
/// - `embeddings_ready`: retrieval has chunks to search; never true while the
///   post has no stored chunk
///
/// Only the two flags are mutated by this workspace; the rest belongs to the
/// document subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub title: String,
    pub content: String,
    pub chat_enabled: bool,
    pub embeddings_ready: bool,
}

impl Post {
    pub fn new(author_id: UserId, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id,
            title: title.into(),
            content: content.into(),
            chat_enabled: false,
            embeddings_ready: false,
        }
    }

    pub fn is_authored_by(&self, user_id: UserId) -> bool {
        self.author_id == user_id
    }

    /// Whether `ask` may be served, optionally requiring stored embeddings.
    pub fn accepts_questions(&self, require_ready: bool) -> bool {
        self.chat_enabled && (!require_ready || self.embeddings_ready)
    }
}

/// A bounded slice of a post's text paired with its embedding.
///
/// Chunks are immutable once written and are replaced as a whole set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: ChunkId,
    pub post_id: PostId,
    pub chunk_index: usize,
    pub content: String,
    pub vector: Vec<f32>,
}

/// A chunk's text scored against one question. Request-scoped, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk_index: usize,
    pub content: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingJob {
    pub id: JobId,
    pub post_id: PostId,
    pub user_id: UserId,
    /// 1-based delivery attempt.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl EmbeddingJob {
    pub fn new(post_id: PostId, user_id: UserId) -> Self {
        Self { id: Uuid::new_v4(), post_id, user_id, attempt: 1, enqueued_at: Utc::now() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobState {
    Queued,
    Running,
    Retrying { next_attempt: u32 },
    Succeeded,
    Dead { error: String },
}

impl JobState {
    /// Queued, running or waiting for a retry.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running | Self::Retrying { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub job: EmbeddingJob,
    pub state: JobState,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One persisted question/answer pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatExchange {
    pub id: ExchangeId,
    pub post_id: PostId,
    pub user_id: UserId,
    pub prompt: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

impl ChatExchange {
    pub fn new(post_id: PostId, user_id: UserId, prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            post_id,
            user_id,
            prompt: prompt.into(),
            response: response.into(),
            created_at: Utc::now(),
        }
    }
}

/// The authenticated identity behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: UserId,
}

impl Requester {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

/// Payload accepted by `ask`: `{"question": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskRequest {
    pub question: String,
}

/// One piece of a streamed answer, in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
}

impl Fragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The `{"text": ...}` object relayed to chat clients.
    pub fn to_wire(&self) -> String {
        serde_json::json!({ "text": self.text }).to_string()
    }
}

/// Where a post sits in the chat lifecycle.
///
/// `Disabled --enable--> PendingEmbedding --worker ok--> Ready --disable--> Disabled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatState {
    Disabled,
    PendingEmbedding,
    Ready,
}

impl ChatState {
    pub fn of(post: &Post, has_active_job: bool) -> Self {
        if post.chat_enabled && post.embeddings_ready {
            Self::Ready
        } else if has_active_job {
            Self::PendingEmbedding
        } else {
            Self::Disabled
        }
    }
}
