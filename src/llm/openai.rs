//! OpenAI-Compatible Model Client
//!
//! One reqwest client speaking the `/chat/completions` and `/embeddings`
//! endpoints of any OpenAI-compatible server. Retries 429 and 5xx with
//! exponential backoff; everything else fails fast.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{CompletionPort, EmbeddingPort, LlmError};
use crate::config::PipelineConfig;

/// Completion sampling temperature. Low on purpose: synopses and answers
/// should stay close to the source text.
const TEMPERATURE: f32 = 0.1;

const MAX_RETRIES: usize = 3;

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    chat_model: String,
    embedding_model: String,
    dimensions: usize,
}

impl OpenAiClient {
    pub fn new(config: &PipelineConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|_| LlmError::Http("invalid API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
        })
    }

    async fn post_with_retry<B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response, LlmError> {
        let mut attempt = 0usize;
        loop {
            let result = self.http.post(url).json(body).send().await;
            match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    let text = resp.text().await.unwrap_or_default();
                    if retryable && attempt + 1 < MAX_RETRIES {
                        attempt += 1;
                        let backoff = Duration::from_millis(500 * (1 << attempt.min(5)) as u64);
                        warn!(status = %status, attempt = attempt, "Model request retrying");
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(LlmError::Rejected {
                        status: status.as_u16(),
                        body: text,
                    });
                }
                Err(err) => {
                    let retryable = err.is_timeout() || err.is_connect();
                    if retryable && attempt + 1 < MAX_RETRIES {
                        attempt += 1;
                        let backoff = Duration::from_millis(500 * (1 << attempt.min(5)) as u64);
                        warn!(error = %err, attempt = attempt, "Model request retrying");
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

#[async_trait]
impl CompletionPort for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.chat_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: TEMPERATURE,
        };

        debug!(model = %self.chat_model, prompt_len = prompt.len(), "Completion request");
        let resp = self
            .post_with_retry(&format!("{}/chat/completions", self.base_url), &body)
            .await?;

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| LlmError::Malformed("no choices in completion response".to_string()))
    }
}

#[async_trait]
impl EmbeddingPort for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
            dimensions: self.dimensions,
        };

        debug!(model = %self.embedding_model, count = texts.len(), "Embedding request");
        let resp = self
            .post_with_retry(&format!("{}/embeddings", self.base_url), &body)
            .await?;

        let mut parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != texts.len() {
            return Err(LlmError::Malformed(format!(
                "{} embeddings returned for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
