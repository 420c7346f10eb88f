//! Chat lifecycle for posts: opt-in/out, question answering and history.
//!
//! Toggles answer with a plain boolean so callers cannot tell a missing post
//! from someone else's post; the richer [`ToggleOutcome`] stays internal to
//! the service and its tests.

use std::sync::Arc;

use futures::StreamExt;
use postchat_core::config::ChatSettings;
use postchat_core::locks::PostLocks;
use postchat_core::signal::StopSignal;
use postchat_core::traits::{AnswerGenerator, ChunkStore, ExchangeRepository, JobQueue, PostRepository};
use postchat_core::types::{AskRequest, ChatExchange, ChatState, Fragment, PostId, Requester};
use postchat_core::{Error, Result, ValidationError};
use postchat_vector::RetrievalEngine;
use tracing::{debug, info, warn};

use crate::intent::Intent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Applied,
    NotFound,
    Forbidden,
    AlreadyInState,
}

impl ToggleOutcome {
    pub fn applied(self) -> bool {
        self == Self::Applied
    }
}

/// Everything the orchestrator talks to.
pub struct Collaborators {
    pub posts: Arc<dyn PostRepository>,
    pub chunks: Arc<dyn ChunkStore>,
    pub exchanges: Arc<dyn ExchangeRepository>,
    pub queue: Arc<dyn JobQueue>,
    pub retrieval: RetrievalEngine,
    pub generator: Arc<dyn AnswerGenerator>,
}

pub struct ChatOrchestrator {
    posts: Arc<dyn PostRepository>,
    chunks: Arc<dyn ChunkStore>,
    exchanges: Arc<dyn ExchangeRepository>,
    queue: Arc<dyn JobQueue>,
    retrieval: RetrievalEngine,
    generator: Arc<dyn AnswerGenerator>,
    locks: PostLocks,
    settings: ChatSettings,
}

impl ChatOrchestrator {
    /// `locks` must be shared with the embedding worker.
    pub fn new(deps: Collaborators, locks: PostLocks, settings: ChatSettings) -> Self {
        Self {
            posts: deps.posts,
            chunks: deps.chunks,
            exchanges: deps.exchanges,
            queue: deps.queue,
            retrieval: deps.retrieval,
            generator: deps.generator,
            locks,
            settings,
        }
    }

    pub async fn enable_chat(&self, post_id: PostId, requester: Requester) -> Result<bool> {
        Ok(self.enable_chat_outcome(post_id, requester).await?.applied())
    }

    pub async fn disable_chat(&self, post_id: PostId, requester: Requester) -> Result<bool> {
        Ok(self.disable_chat_outcome(post_id, requester).await?.applied())
    }

    /// Queue an embedding job. The flags flip when the worker finishes.
    pub async fn enable_chat_outcome(&self, post_id: PostId, requester: Requester) -> Result<ToggleOutcome> {
        let Some(post) = self.posts.get_by_id(post_id).await? else {
            return Ok(ToggleOutcome::NotFound);
        };
        if !post.is_authored_by(requester.user_id) {
            debug!(%post_id, user_id = %requester.user_id, "enable ignored: not the author");
            return Ok(ToggleOutcome::Forbidden);
        }
        if post.chat_enabled || self.queue.has_active_job(post_id).await {
            return Ok(ToggleOutcome::AlreadyInState);
        }
        let job_id = self.queue.enqueue(post_id, requester.user_id).await?;
        info!(%post_id, %job_id, "chat enable accepted");
        Ok(ToggleOutcome::Applied)
    }

    /// Clear both flags, then drop the post's chunks.
    ///
    /// A failed chunk delete after the flags were saved is reported as
    /// [`Error::PartialFailure`]; the flags are not rolled back.
    pub async fn disable_chat_outcome(&self, post_id: PostId, requester: Requester) -> Result<ToggleOutcome> {
        let Some(post) = self.posts.get_by_id(post_id).await? else {
            return Ok(ToggleOutcome::NotFound);
        };
        if !post.is_authored_by(requester.user_id) {
            debug!(%post_id, user_id = %requester.user_id, "disable ignored: not the author");
            return Ok(ToggleOutcome::Forbidden);
        }
        if !post.chat_enabled {
            return Ok(ToggleOutcome::AlreadyInState);
        }

        let _guard = self.locks.lock(post_id).await?;
        let Some(mut post) = self.posts.get_by_id(post_id).await? else {
            return Ok(ToggleOutcome::NotFound);
        };
        // A concurrent disable may have won the lock first.
        if !post.chat_enabled {
            return Ok(ToggleOutcome::AlreadyInState);
        }
        post.chat_enabled = false;
        post.embeddings_ready = false;
        self.posts.update(&post).await?;

        if let Err(e) = self.chunks.delete_chunks(post_id).await {
            warn!(%post_id, error = %e, "chat disabled but chunk cleanup failed");
            return Err(Error::PartialFailure { post_id, reason: e.to_string() });
        }
        info!(%post_id, "chat disabled");
        Ok(ToggleOutcome::Applied)
    }

    /// Answer the `{"question": ...}` payload, passing each fragment to
    /// `on_fragment` in arrival order. Returns how many fragments were relayed.
    pub async fn ask<F>(
        &self,
        post_id: PostId,
        requester: Requester,
        raw_payload: &str,
        stop: &StopSignal,
        mut on_fragment: F,
    ) -> Result<usize>
    where
        F: FnMut(&Fragment) + Send,
    {
        let question = parse_question(raw_payload)?;
        let post = self.posts.get_by_id(post_id).await?;
        let post = match post {
            Some(p) if p.accepts_questions(self.settings.require_embeddings_ready) => p,
            _ => return Err(Error::Unavailable("post not found or AI not enabled".to_string())),
        };
        debug!(post_id = %post.id, user_id = %requester.user_id, "answering question");

        if self.settings.short_circuit_small_talk {
            if let Some(reply) = Intent::classify(&question).canned_reply() {
                on_fragment(&Fragment::new(reply));
                return Ok(1);
            }
        }

        let context = tokio::select! {
            biased;
            _ = stop.cancelled() => {
                info!(%post_id, "answer cancelled during retrieval");
                return Err(Error::Cancelled);
            }
            context = self.retrieval.retrieve(post.id, &question) => context?,
        };
        let mut stream = tokio::select! {
            biased;
            _ = stop.cancelled() => {
                info!(%post_id, "answer cancelled before generation started");
                return Err(Error::Cancelled);
            }
            stream = self.generator.stream_answer(&context, &question) => stream?,
        };

        let mut relayed = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = stop.cancelled() => None,
                next = stream.next() => Some(next),
            };
            let Some(next) = next else {
                drop(stream);
                info!(%post_id, relayed, "answer cancelled");
                return Err(Error::Cancelled);
            };
            match next {
                Some(Ok(fragment)) => {
                    on_fragment(&fragment);
                    relayed += 1;
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        debug!(%post_id, relayed, "answer complete");
        Ok(relayed)
    }

    /// Run [`ask`](Self::ask), then persist the full answer as one exchange.
    pub async fn ask_and_record<F>(
        &self,
        post_id: PostId,
        requester: Requester,
        raw_payload: &str,
        stop: &StopSignal,
        mut on_fragment: F,
    ) -> Result<ChatExchange>
    where
        F: FnMut(&Fragment) + Send,
    {
        let question = parse_question(raw_payload)?;
        let mut answer = String::new();
        self.ask(post_id, requester, raw_payload, stop, |fragment| {
            answer.push_str(&fragment.text);
            on_fragment(fragment);
        })
        .await?;
        let exchange = ChatExchange::new(post_id, requester.user_id, question, answer);
        self.record_exchange(Some(&exchange)).await?;
        Ok(exchange)
    }

    pub async fn record_exchange(&self, exchange: Option<&ChatExchange>) -> Result<()> {
        let exchange = exchange.ok_or(ValidationError::MissingExchange)?;
        if exchange.user_id.is_nil() || exchange.post_id.is_nil() {
            return Err(ValidationError::MissingIdentity.into());
        }
        if exchange.prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt.into());
        }
        if exchange.response.trim().is_empty() {
            return Err(ValidationError::EmptyResponse.into());
        }
        self.exchanges.create_exchange(exchange).await
    }

    /// Label of a known intent.
    pub fn classify(&self, message: &str) -> Result<String> {
        if message.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        match Intent::classify(message) {
            Intent::Unknown => Err(Error::UnknownIntent(Intent::Unknown.label().to_string())),
            intent => Ok(intent.label().to_string()),
        }
    }

    pub async fn chat_state(&self, post_id: PostId) -> Result<Option<ChatState>> {
        let Some(post) = self.posts.get_by_id(post_id).await? else {
            return Ok(None);
        };
        let pending = self.queue.has_active_job(post_id).await;
        Ok(Some(ChatState::of(&post, pending)))
    }

    pub async fn history(&self, post_id: PostId) -> Result<Vec<ChatExchange>> {
        self.exchanges.list_by_post(post_id).await
    }
}

fn parse_question(raw_payload: &str) -> Result<String> {
    let req: AskRequest = serde_json::from_str(raw_payload)
        .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;
    let question = req.question.trim();
    if question.is_empty() {
        return Err(ValidationError::EmptyQuestion.into());
    }
    Ok(question.to_string())
}
