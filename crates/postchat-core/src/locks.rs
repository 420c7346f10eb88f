//! Per-post mutual exclusion between the embedding writer and chat disabling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{Error, Result};
use crate::types::PostId;

/// Hands out one async mutex per post. Clones share the same table.
#[derive(Clone, Default)]
pub struct PostLocks {
    table: Arc<Mutex<HashMap<PostId, Arc<AsyncMutex<()>>>>>,
}

impl PostLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `post_id`; released when the guard drops.
    pub async fn lock(&self, post_id: PostId) -> Result<OwnedMutexGuard<()>> {
        let slot = {
            let mut table = self
                .table
                .lock()
                .map_err(|_| Error::Operation("post lock table poisoned".to_string()))?;
            // Drop entries nobody else is holding so the table stays small.
            table.retain(|_, m| Arc::strong_count(m) > 1);
            Arc::clone(table.entry(post_id).or_default())
        };
        Ok(slot.lock_owned().await)
    }
}
