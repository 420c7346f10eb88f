use std::time::Duration;

use async_trait::async_trait;
use postchat_core::config::GenerationSettings;
use postchat_core::traits::{AnswerGenerator, FragmentStream};
use postchat_core::{Error, Result};
use serde::Serialize;
use tracing::{debug, warn};

use crate::stream::fragment_stream;

pub struct GenerationClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl GenerationClient {
    pub fn new(settings: &GenerationSettings) -> Result<Self> {
        // Answers may stream for longer than any fixed total; only the gap
        // between reads is bounded.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("generation http client: {}", e)))?;
        Ok(Self { client, endpoint: settings.endpoint(), model: settings.model.clone() })
    }
}

#[async_trait]
impl AnswerGenerator for GenerationClient {
    async fn stream_answer(&self, context: &str, question: &str) -> Result<FragmentStream> {
        let body = ChatRequest {
            model: &self.model,
            stream: true,
            messages: [
                ChatMessage { role: "system", content: context },
                ChatMessage { role: "user", content: question },
            ],
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("generation request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
            warn!("generation endpoint returned {}: {}", status, text);
            return Err(Error::Upstream(format!("generation endpoint returned {}: {}", status, text)));
        }
        debug!(%status, model = %self.model, "generation stream opened");
        Ok(fragment_stream(resp.bytes_stream()))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}
