//! Background embedding: a retrying job queue, the worker that turns a post
//! into stored chunks, and the pool that drains the queue.

pub mod pool;
pub mod queue;
pub mod worker;

pub use pool::WorkerPool;
pub use queue::{MemoryJobQueue, RetryDecision, RetryPolicy, HISTORY_CAPACITY};
pub use worker::EmbeddingWorker;
