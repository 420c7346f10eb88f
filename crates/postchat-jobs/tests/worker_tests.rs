use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use postchat_core::data_processor::DataProcessor;
use postchat_core::locks::PostLocks;
use postchat_core::memory::MemoryPostRepository;
use postchat_core::signal::StopSignal;
use postchat_core::traits::{ChunkStore, Embedder, JobQueue, PostRepository};
use postchat_core::types::{JobState, Post, PostId};
use postchat_core::{Error, Result};
use postchat_jobs::{EmbeddingWorker, MemoryJobQueue, RetryDecision, RetryPolicy, WorkerPool};
use postchat_vector::{EmbeddingCache, MemoryChunkStore};
use uuid::Uuid;

/// Fails the first `failures` calls and any text containing `poison`,
/// otherwise embeds by text length.
struct ScriptedEmbedder {
    failures: usize,
    poison: Option<&'static str>,
    calls: AtomicUsize,
}

impl ScriptedEmbedder {
    fn failing(failures: usize) -> Self {
        Self { failures, poison: None, calls: AtomicUsize::new(0) }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    fn embedder_id(&self) -> &str { "scripted" }
    fn dim(&self) -> usize { 2 }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures || self.poison.map_or(false, |p| text.contains(p)) {
            return Err(Error::Upstream(format!("transient failure {}", n)));
        }
        Ok(vec![text.len() as f32, 1.0])
    }
}

struct Fixture {
    posts: Arc<MemoryPostRepository>,
    chunks: Arc<MemoryChunkStore>,
    embedder: Arc<ScriptedEmbedder>,
    queue: Arc<MemoryJobQueue>,
    worker: Arc<EmbeddingWorker>,
    locks: PostLocks,
}

fn fixture(failures: usize, max_attempts: u32, cache_capacity: usize) -> Fixture {
    let posts = Arc::new(MemoryPostRepository::new());
    let chunks = Arc::new(MemoryChunkStore::new());
    let embedder = Arc::new(ScriptedEmbedder::failing(failures));
    let policy = RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
        backoff_multiplier: 2.0,
    };
    let queue = Arc::new(MemoryJobQueue::new(policy));
    let locks = PostLocks::new();
    let worker = Arc::new(EmbeddingWorker::new(
        posts.clone(),
        chunks.clone(),
        embedder.clone(),
        Arc::new(EmbeddingCache::new(cache_capacity)),
        DataProcessor::new(),
        locks.clone(),
    ));
    Fixture { posts, chunks, embedder, queue, worker, locks }
}

async fn insert_post(posts: &MemoryPostRepository, content: &str) -> Post {
    let post = Post::new(Uuid::new_v4(), "title", content);
    posts.insert(post.clone()).await;
    post
}

async fn wait_until_settled(queue: &MemoryJobQueue, post_id: PostId) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while queue.has_active_job(post_id).await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job settled");
}

#[tokio::test]
async fn process_writes_chunks_and_flips_flags() {
    let f = fixture(0, 3, 100);
    let post = insert_post(&f.posts, "cats are mammals\n\ndogs are loyal").await;
    let job = postchat_core::types::EmbeddingJob::new(post.id, post.author_id);

    assert_eq!(f.worker.process(&job).await.unwrap(), 2);
    let stored = f.chunks.get_chunks_by_post(post.id).await.unwrap();
    assert_eq!(stored.iter().map(|c| c.content.as_str()).collect::<Vec<_>>(), vec!["cats are mammals", "dogs are loyal"]);
    assert!(stored.iter().all(|c| !c.vector.is_empty()));

    let post = f.posts.get_by_id(post.id).await.unwrap().unwrap();
    assert!(post.chat_enabled && post.embeddings_ready);
}

#[tokio::test]
async fn embedding_failure_writes_nothing() {
    let f = fixture(0, 3, 100);
    // Second chunk fails: the first embedding must not be persisted alone.
    let failing = Arc::new(ScriptedEmbedder { poison: Some("second"), ..ScriptedEmbedder::failing(0) });
    let worker = EmbeddingWorker::new(
        f.posts.clone(),
        f.chunks.clone(),
        failing.clone(),
        Arc::new(EmbeddingCache::new(0)),
        DataProcessor::new(),
        PostLocks::new(),
    );
    let post = insert_post(&f.posts, "first paragraph\n\nsecond paragraph").await;
    let job = postchat_core::types::EmbeddingJob::new(post.id, post.author_id);

    let err = worker.process(&job).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(failing.calls(), 2);
    assert!(f.chunks.get_chunks_by_post(post.id).await.unwrap().is_empty());
    let post = f.posts.get_by_id(post.id).await.unwrap().unwrap();
    assert!(!post.embeddings_ready && !post.chat_enabled);
}

#[tokio::test]
async fn empty_post_is_dropped_without_retry() {
    let f = fixture(0, 5, 100);
    let post = insert_post(&f.posts, "  \n\n ").await;
    let id = f.queue.enqueue(post.id, post.author_id).await.unwrap();
    let job = f.queue.dequeue(&StopSignal::new()).await.unwrap();

    assert_eq!(f.worker.handle(&f.queue, job).await, Some(RetryDecision::Buried));
    assert!(matches!(f.queue.status(id).await.unwrap().state, JobState::Dead { .. }));
    assert_eq!(f.embedder.calls(), 0);
}

#[tokio::test]
async fn missing_post_is_dropped_without_retry() {
    let f = fixture(0, 5, 100);
    f.queue.enqueue(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
    let job = f.queue.dequeue(&StopSignal::new()).await.unwrap();
    assert_eq!(f.worker.handle(&f.queue, job).await, Some(RetryDecision::Buried));
}

#[tokio::test]
async fn pool_retries_transient_failures_until_ready() {
    let f = fixture(2, 5, 100);
    let post = insert_post(&f.posts, "a single paragraph").await;
    let pool = WorkerPool::spawn(f.queue.clone(), f.worker.clone(), 2, StopSignal::new());
    assert_eq!(pool.len(), 2);

    let id = f.queue.enqueue(post.id, post.author_id).await.unwrap();
    wait_until_settled(&f.queue, post.id).await;
    pool.shutdown().await.unwrap();

    let rec = f.queue.status(id).await.unwrap();
    assert_eq!(rec.state, JobState::Succeeded);
    assert_eq!(rec.job.attempt, 3);
    assert!(f.posts.get_by_id(post.id).await.unwrap().unwrap().embeddings_ready);
}

#[tokio::test]
async fn pool_buries_job_after_exhausting_attempts() {
    let f = fixture(usize::MAX, 2, 100);
    let post = insert_post(&f.posts, "never embeds").await;
    let pool = WorkerPool::spawn(f.queue.clone(), f.worker.clone(), 1, StopSignal::new());

    let id = f.queue.enqueue(post.id, post.author_id).await.unwrap();
    wait_until_settled(&f.queue, post.id).await;
    pool.shutdown().await.unwrap();

    assert!(matches!(f.queue.status(id).await.unwrap().state, JobState::Dead { .. }));
    assert_eq!(f.embedder.calls(), 2);
    let post = f.posts.get_by_id(post.id).await.unwrap().unwrap();
    assert!(!post.chat_enabled && !post.embeddings_ready);
    assert!(f.chunks.get_chunks_by_post(post.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn unchanged_text_is_served_from_cache() {
    let f = fixture(0, 3, 100);
    let post = insert_post(&f.posts, "one\n\ntwo").await;
    let job = postchat_core::types::EmbeddingJob::new(post.id, post.author_id);
    f.worker.process(&job).await.unwrap();
    assert_eq!(f.embedder.calls(), 2);

    f.chunks.delete_chunks(post.id).await.unwrap();
    f.worker.process(&job).await.unwrap();
    assert_eq!(f.embedder.calls(), 2, "second pass hit the cache");
    assert_eq!(f.chunks.get_chunks_by_post(post.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn write_waits_while_post_lock_is_held() {
    let f = fixture(0, 3, 100);
    let post = insert_post(&f.posts, "dogs are loyal").await;
    let job = postchat_core::types::EmbeddingJob::new(post.id, post.author_id);

    let guard = f.locks.lock(post.id).await.unwrap();
    let worker = f.worker.clone();
    let task = tokio::spawn(async move { worker.process(&job).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished(), "write must wait for the lock holder");
    assert!(f.chunks.get_chunks_by_post(post.id).await.unwrap().is_empty());
    assert!(!f.posts.get_by_id(post.id).await.unwrap().unwrap().embeddings_ready);

    drop(guard);
    let written = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();
    assert_eq!(written, 1);
    assert!(f.posts.get_by_id(post.id).await.unwrap().unwrap().embeddings_ready);
}
