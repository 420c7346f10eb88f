//! In-process repositories used by the CLI and by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::traits::{ExchangeRepository, PostRepository};
use crate::types::{ChatExchange, Post, PostId};

#[derive(Default)]
pub struct MemoryPostRepository {
    posts: RwLock<HashMap<PostId, Post>>,
}

impl MemoryPostRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, post: Post) {
        self.posts.write().await.insert(post.id, post);
    }

    pub async fn len(&self) -> usize {
        self.posts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.posts.read().await.is_empty()
    }
}

#[async_trait]
impl PostRepository for MemoryPostRepository {
    async fn get_by_id(&self, id: PostId) -> Result<Option<Post>> {
        Ok(self.posts.read().await.get(&id).cloned())
    }

    async fn update(&self, post: &Post) -> Result<()> {
        let mut posts = self.posts.write().await;
        match posts.get_mut(&post.id) {
            Some(slot) => {
                *slot = post.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("post {}", post.id))),
        }
    }
}

#[derive(Default)]
pub struct MemoryExchangeRepository {
    exchanges: RwLock<Vec<ChatExchange>>,
}

impl MemoryExchangeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExchangeRepository for MemoryExchangeRepository {
    async fn create_exchange(&self, exchange: &ChatExchange) -> Result<()> {
        self.exchanges.write().await.push(exchange.clone());
        Ok(())
    }

    async fn list_by_post(&self, post_id: PostId) -> Result<Vec<ChatExchange>> {
        let mut out: Vec<ChatExchange> = self
            .exchanges
            .read()
            .await
            .iter()
            .filter(|e| e.post_id == post_id)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.created_at);
        Ok(out)
    }
}
