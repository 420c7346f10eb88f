use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use postchat_core::config::QueueSettings;
use postchat_core::signal::StopSignal;
use postchat_core::traits::JobQueue;
use postchat_core::types::{EmbeddingJob, JobId, JobRecord, JobState, PostId, UserId};
use postchat_core::{Error, Result};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// Exponential backoff between delivery attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&QueueSettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &QueueSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            backoff_multiplier: settings.backoff_multiplier,
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let backoff = self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exp);
        let backoff_ms = backoff.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(backoff_ms as u64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry { next_attempt: u32, delay: Duration },
    Buried,
}

/// Finished job records kept for [`MemoryJobQueue::status`].
pub const HISTORY_CAPACITY: usize = 256;

/// Active jobs indexed by id and by post, plus a bounded tail of finished ones.
#[derive(Default)]
struct JobTable {
    active: HashMap<JobId, JobRecord>,
    by_post: HashMap<PostId, JobId>,
    history: VecDeque<JobRecord>,
}

impl JobTable {
    fn get(&self, job_id: JobId) -> Option<&JobRecord> {
        self.active.get(&job_id).or_else(|| self.history.iter().rev().find(|r| r.job.id == job_id))
    }

    /// Terminal states move the record out of the active set.
    fn set_state(&mut self, job_id: JobId, state: JobState, last_error: Option<String>) {
        let Some(rec) = self.active.get_mut(&job_id) else {
            return;
        };
        let finished = !state.is_active();
        rec.state = state;
        if last_error.is_some() {
            rec.last_error = last_error;
        }
        rec.updated_at = Utc::now();
        if !finished {
            return;
        }
        if let Some(rec) = self.active.remove(&job_id) {
            if self.by_post.get(&rec.job.post_id) == Some(&job_id) {
                self.by_post.remove(&rec.job.post_id);
            }
            if self.history.len() >= HISTORY_CAPACITY {
                self.history.pop_front();
            }
            self.history.push_back(rec);
        }
    }
}

type Records = Arc<Mutex<JobTable>>;

/// Process-local queue with at-least-once delivery and per-post dedupe.
pub struct MemoryJobQueue {
    policy: RetryPolicy,
    tx: mpsc::UnboundedSender<EmbeddingJob>,
    rx: Mutex<mpsc::UnboundedReceiver<EmbeddingJob>>,
    records: Records,
}

impl MemoryJobQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { policy, tx, rx: Mutex::new(rx), records: Arc::new(Mutex::new(JobTable::default())) }
    }

    /// Next job, or `None` once `stop` fires. Each job goes to one caller.
    pub async fn dequeue(&self, stop: &StopSignal) -> Option<EmbeddingJob> {
        let mut rx = tokio::select! {
            biased;
            _ = stop.cancelled() => return None,
            rx = self.rx.lock() => rx,
        };
        let job = tokio::select! {
            biased;
            _ = stop.cancelled() => return None,
            job = rx.recv() => job?,
        };
        drop(rx);
        self.set_state(job.id, JobState::Running, None).await;
        debug!(job_id = %job.id, post_id = %job.post_id, attempt = job.attempt, "dequeued embedding job");
        Some(job)
    }

    pub async fn complete(&self, job_id: JobId) {
        self.set_state(job_id, JobState::Succeeded, None).await;
    }

    /// Schedule a delayed re-delivery, or bury the job once its attempts are spent.
    pub async fn retry_or_bury(&self, job: &EmbeddingJob, err: &Error) -> RetryDecision {
        if job.attempt >= self.policy.max_attempts {
            error!(job_id = %job.id, post_id = %job.post_id, attempts = job.attempt, error = %err, "embedding job exhausted retries");
            self.bury(job.id, err).await;
            return RetryDecision::Buried;
        }
        let next_attempt = job.attempt + 1;
        let delay = self.policy.backoff_for(job.attempt);
        warn!(job_id = %job.id, attempt = job.attempt, ?delay, error = %err, "embedding job failed, retrying");
        self.set_state(job.id, JobState::Retrying { next_attempt }, Some(err.to_string())).await;

        let retry = EmbeddingJob { attempt: next_attempt, ..job.clone() };
        let (tx, records) = (self.tx.clone(), Arc::clone(&self.records));
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(rec) = records.lock().await.active.get_mut(&retry.id) {
                rec.job.attempt = retry.attempt;
                rec.state = JobState::Queued;
                rec.updated_at = Utc::now();
            }
            if tx.send(retry).is_err() {
                warn!("job queue closed before retry could be delivered");
            }
        });
        RetryDecision::Retry { next_attempt, delay }
    }

    /// Drop a job without further attempts.
    pub async fn bury(&self, job_id: JobId, err: &Error) {
        self.set_state(job_id, JobState::Dead { error: err.to_string() }, Some(err.to_string())).await;
    }

    /// Active jobs, or one of the last [`HISTORY_CAPACITY`] finished ones.
    pub async fn status(&self, job_id: JobId) -> Option<JobRecord> {
        self.records.lock().await.get(job_id).cloned()
    }

    pub async fn active_jobs(&self) -> Vec<JobRecord> {
        let mut active: Vec<JobRecord> = self.records.lock().await.active.values().cloned().collect();
        active.sort_by_key(|r| r.job.enqueued_at);
        active
    }

    async fn set_state(&self, job_id: JobId, state: JobState, last_error: Option<String>) {
        self.records.lock().await.set_state(job_id, state, last_error);
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, post_id: PostId, user_id: UserId) -> Result<JobId> {
        let mut records = self.records.lock().await;
        if let Some(existing) = records.by_post.get(&post_id) {
            debug!(%post_id, job_id = %existing, "embedding job already active");
            return Ok(*existing);
        }
        let job = EmbeddingJob::new(post_id, user_id);
        let id = job.id;
        self.tx.send(job.clone()).map_err(|_| Error::Operation("job queue closed".to_string()))?;
        records.active.insert(id, JobRecord { job, state: JobState::Queued, last_error: None, updated_at: Utc::now() });
        records.by_post.insert(post_id, id);
        info!(%post_id, job_id = %id, "embedding job enqueued");
        Ok(id)
    }

    async fn has_active_job(&self, post_id: PostId) -> bool {
        self.records.lock().await.by_post.contains_key(&post_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy { max_attempts, initial_backoff: Duration::from_millis(5), max_backoff: Duration::from_millis(40), backoff_multiplier: 2.0 }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff_for(1), Duration::from_millis(500));
        assert_eq!(p.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(p.backoff_for(3), Duration::from_millis(2000));
        assert_eq!(p.backoff_for(30), Duration::from_secs(60));
        assert_eq!(policy(3).backoff_for(10), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn enqueue_dedupes_active_jobs_per_post() {
        let q = MemoryJobQueue::new(policy(3));
        let (post, other, user) = (PostId::new_v4(), PostId::new_v4(), UserId::new_v4());
        let a = q.enqueue(post, user).await.unwrap();
        let b = q.enqueue(post, user).await.unwrap();
        let c = q.enqueue(other, user).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(q.active_jobs().await.len(), 2);

        let stop = StopSignal::new();
        let job = q.dequeue(&stop).await.unwrap();
        q.complete(job.id).await;
        assert!(!q.has_active_job(job.post_id).await);
        assert_ne!(q.enqueue(job.post_id, user).await.unwrap(), job.id, "finished jobs do not block a new one");
    }

    #[tokio::test]
    async fn failed_job_is_redelivered_then_buried() {
        let q = MemoryJobQueue::new(policy(2));
        let stop = StopSignal::new();
        let id = q.enqueue(PostId::new_v4(), UserId::new_v4()).await.unwrap();

        let first = q.dequeue(&stop).await.unwrap();
        assert_eq!(first.attempt, 1);
        assert_eq!(q.status(id).await.unwrap().state, JobState::Running);
        let decision = q.retry_or_bury(&first, &Error::Upstream("down".into())).await;
        assert_eq!(decision, RetryDecision::Retry { next_attempt: 2, delay: Duration::from_millis(5) });
        assert!(q.has_active_job(first.post_id).await);

        let second = tokio::time::timeout(Duration::from_secs(1), q.dequeue(&stop)).await.unwrap().unwrap();
        assert_eq!((second.id, second.attempt), (id, 2));
        assert_eq!(q.retry_or_bury(&second, &Error::Upstream("down".into())).await, RetryDecision::Buried);

        let rec = q.status(id).await.unwrap();
        assert!(matches!(rec.state, JobState::Dead { .. }));
        assert!(rec.last_error.unwrap().contains("down"));
        assert!(!q.has_active_job(first.post_id).await);
    }

    #[tokio::test]
    async fn dequeue_returns_none_after_stop() {
        let q = MemoryJobQueue::new(policy(1));
        let stop = StopSignal::new();
        let waiter = {
            let stop = stop.clone();
            async move { q.dequeue(&stop).await }
        };
        let handle = tokio::spawn(waiter);
        tokio::time::sleep(Duration::from_millis(10)).await;
        stop.stop();
        let got = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn finished_jobs_leave_the_active_set_and_history_is_bounded() {
        let q = MemoryJobQueue::new(policy(1));
        let stop = StopSignal::new();
        let user = UserId::new_v4();
        let mut ids = Vec::new();
        for _ in 0..(HISTORY_CAPACITY + 100) {
            ids.push(q.enqueue(PostId::new_v4(), user).await.unwrap());
            let job = q.dequeue(&stop).await.unwrap();
            q.complete(job.id).await;
        }
        {
            let table = q.records.lock().await;
            assert!(table.active.is_empty());
            assert!(table.by_post.is_empty());
            assert_eq!(table.history.len(), HISTORY_CAPACITY);
        }
        assert!(q.status(ids[0]).await.is_none(), "oldest record pruned");
        let last = q.status(*ids.last().unwrap()).await.unwrap();
        assert_eq!(last.state, JobState::Succeeded);
    }
}
