//! OpenAI-compatible embeddings and chat completions.

use super::{endpoint, http_client, send_json};
use crate::chat::{ChatModel, PromptMessage};
use crate::config::{non_empty, parse_endpoint, ProviderSettings};
use crate::embeddings::Embedder;
use crate::error::{ConfigError, ProviderError};
use crate::models::EmbedderProfile;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const BACKEND: &str = "openai";

#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    batch_size: usize,
    retry: RetryPolicy,
}

impl OpenAiEmbedder {
    pub fn new(settings: &ProviderSettings, batch_size: usize) -> Result<Self, ConfigError> {
        let api_key = non_empty(&settings.openai_api_key)
            .ok_or(ConfigError::MissingCredential("OPENAI_API_KEY"))?;
        parse_endpoint("openai_base_url", &settings.openai_base_url)?;
        Ok(Self {
            client: http_client(settings.request_timeout, Some(api_key))?,
            endpoint: endpoint(&settings.openai_base_url, "embeddings"),
            model: settings.openai_embedding_model.clone(),
            batch_size: batch_size.max(1),
            retry: settings.retry,
        })
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let mut parsed: EmbeddingResponse = self
            .retry
            .run("openai.embeddings", || {
                send_json(self.client.post(&self.endpoint).json(&request), BACKEND)
            })
            .await?;

        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != inputs.len() {
            return Err(ProviderError::request(
                BACKEND,
                format!(
                    "returned {} embeddings for {} inputs",
                    parsed.data.len(),
                    inputs.len()
                ),
            ));
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn profile(&self) -> EmbedderProfile {
        EmbedderProfile {
            provider: BACKEND.to_string(),
            model: self.model.clone(),
        }
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!(batch = batch.len(), "requesting openai embeddings");
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| ProviderError::request(BACKEND, "empty embedding response"))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl OpenAiChat {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        let api_key = non_empty(&settings.openai_api_key)
            .ok_or(ConfigError::MissingCredential("OPENAI_API_KEY"))?;
        parse_endpoint("openai_base_url", &settings.openai_base_url)?;
        Ok(Self {
            client: http_client(settings.request_timeout, Some(api_key))?,
            endpoint: endpoint(&settings.openai_base_url, "chat/completions"),
            model: settings.openai_chat_model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            retry: settings.retry,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn name(&self) -> String {
        format!("{BACKEND}/{}", self.model)
    }

    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages,
        };
        let parsed: ChatResponse = self
            .retry
            .run("openai.chat", || {
                send_json(self.client.post(&self.endpoint).json(&body), BACKEND)
            })
            .await?;

        Ok(parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: &'a [PromptMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}
