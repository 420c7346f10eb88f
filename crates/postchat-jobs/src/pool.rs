use std::sync::Arc;

use postchat_core::signal::StopSignal;
use postchat_core::{Error, Result};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::queue::MemoryJobQueue;
use crate::worker::EmbeddingWorker;

/// Fixed number of tasks draining the queue, one job at a time each.
pub struct WorkerPool {
    tasks: JoinSet<()>,
    stop: StopSignal,
}

impl WorkerPool {
    pub fn spawn(queue: Arc<MemoryJobQueue>, worker: Arc<EmbeddingWorker>, size: usize, stop: StopSignal) -> Self {
        let size = size.max(1);
        let mut tasks = JoinSet::new();
        for slot in 0..size {
            let (queue, worker, stop) = (Arc::clone(&queue), Arc::clone(&worker), stop.clone());
            tasks.spawn(async move {
                while let Some(job) = queue.dequeue(&stop).await {
                    debug!(slot, job_id = %job.id, "worker picked job");
                    worker.handle(&queue, job).await;
                }
                debug!(slot, "worker stopped");
            });
        }
        info!(workers = size, "embedding worker pool started");
        Self { tasks, stop }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stop taking new jobs and wait for in-flight ones to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stop.stop();
        while let Some(res) = self.tasks.join_next().await {
            res.map_err(|e| Error::Operation(format!("worker task failed: {}", e)))?;
        }
        info!("embedding worker pool stopped");
        Ok(())
    }
}
