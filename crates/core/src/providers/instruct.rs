//! Self-hosted instruction-tuned models.
//!
//! Embeddings come from a text-embeddings-inference server (`POST /embed`),
//! generation from a text-generation-inference server (`POST /generate`).

use super::{endpoint, http_client, send_json};
use crate::chat::{flatten_messages, ChatModel, PromptMessage};
use crate::config::{non_empty, parse_endpoint, ProviderSettings};
use crate::embeddings::Embedder;
use crate::error::{ConfigError, ProviderError};
use crate::models::EmbedderProfile;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const BACKEND: &str = "self-hosted";

pub struct InstructEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    embed_instruction: String,
    query_instruction: String,
    batch_size: usize,
    retry: RetryPolicy,
}

impl InstructEmbedder {
    pub fn new(settings: &ProviderSettings, batch_size: usize) -> Result<Self, ConfigError> {
        parse_endpoint("instruct_embedding_url", &settings.instruct_embedding_url)?;
        Ok(Self {
            client: http_client(settings.request_timeout, non_empty(&settings.instruct_api_key))?,
            endpoint: endpoint(&settings.instruct_embedding_url, "embed"),
            model: settings.instruct_embedding_model.clone(),
            embed_instruction: settings.embed_instruction.clone(),
            query_instruction: settings.query_instruction.clone(),
            batch_size: batch_size.max(1),
            retry: settings.retry,
        })
    }

    async fn embed_with_instruction(
        &self,
        instruction: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let inputs = texts
            .iter()
            .map(|text| format!("{instruction}{text}"))
            .collect::<Vec<_>>();
        let request = EmbedRequest {
            inputs: &inputs,
            truncate: true,
        };

        let vectors: Vec<Vec<f32>> = self
            .retry
            .run("self-hosted.embed", || {
                send_json(self.client.post(&self.endpoint).json(&request), BACKEND)
            })
            .await?;

        if vectors.len() != texts.len() {
            return Err(ProviderError::request(
                BACKEND,
                format!("returned {} embeddings for {} inputs", vectors.len(), texts.len()),
            ));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for InstructEmbedder {
    fn profile(&self) -> EmbedderProfile {
        EmbedderProfile {
            provider: BACKEND.to_string(),
            model: self.model.clone(),
        }
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_with_instruction(&self.embed_instruction, batch).await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_with_instruction(&self.query_instruction, &[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| ProviderError::request(BACKEND, "empty embedding response"))
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    truncate: bool,
}

pub struct InstructChat {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl InstructChat {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        parse_endpoint("instruct_chat_url", &settings.instruct_chat_url)?;
        Ok(Self {
            client: http_client(settings.request_timeout, non_empty(&settings.instruct_api_key))?,
            endpoint: endpoint(&settings.instruct_chat_url, "generate"),
            model: settings.instruct_chat_model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            retry: settings.retry,
        })
    }
}

#[async_trait]
impl ChatModel for InstructChat {
    fn name(&self) -> String {
        format!("{BACKEND}/{}", self.model)
    }

    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, ProviderError> {
        let prompt = flatten_messages(messages);
        let body = GenerateRequest {
            inputs: &prompt,
            parameters: GenerateParameters::new(self.temperature, self.max_tokens),
        };
        let parsed: GenerateResponse = self
            .retry
            .run("self-hosted.generate", || {
                send_json(self.client.post(&self.endpoint).json(&body), BACKEND)
            })
            .await?;
        Ok(parsed.generated_text.trim().to_string())
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: GenerateParameters,
}

#[derive(Serialize)]
struct GenerateParameters {
    max_new_tokens: u32,
    // the server rejects a temperature of zero
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    return_full_text: bool,
}

impl GenerateParameters {
    fn new(temperature: f32, max_new_tokens: u32) -> Self {
        Self {
            max_new_tokens,
            temperature: (temperature > 0.0).then_some(temperature),
            return_full_text: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    generated_text: String,
}
