//! HTTP clients for the hosted and self-hosted model providers.

pub mod instruct;
pub mod openai;

pub use instruct::{InstructChat, InstructEmbedder};
pub use openai::{OpenAiChat, OpenAiEmbedder};

use crate::chat::{ChatModel, ExtractiveChat};
use crate::config::{PipelineConfig, ProviderKind, ProviderSettings};
use crate::embeddings::{CharacterNgramEmbedder, Embedder};
use crate::error::{ConfigError, ProviderError};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

pub fn build_embedder(
    config: &PipelineConfig,
    settings: &ProviderSettings,
) -> Result<Arc<dyn Embedder>, ConfigError> {
    let embedder: Arc<dyn Embedder> = match config.provider {
        ProviderKind::Hosted => Arc::new(OpenAiEmbedder::new(settings, config.embedding_batch_size)?),
        ProviderKind::SelfHosted => {
            Arc::new(InstructEmbedder::new(settings, config.embedding_batch_size)?)
        }
        ProviderKind::Offline => Arc::new(CharacterNgramEmbedder::default()),
    };
    Ok(embedder)
}

pub fn build_chat_model(
    config: &PipelineConfig,
    settings: &ProviderSettings,
) -> Result<Arc<dyn ChatModel>, ConfigError> {
    let chat: Arc<dyn ChatModel> = match config.provider {
        ProviderKind::Hosted => Arc::new(OpenAiChat::new(settings)?),
        ProviderKind::SelfHosted => Arc::new(InstructChat::new(settings)?),
        ProviderKind::Offline => Arc::new(ExtractiveChat),
    };
    Ok(chat)
}

pub(crate) fn http_client(
    timeout: Duration,
    bearer_token: Option<&str>,
) -> Result<Client, ConfigError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(token) = bearer_token {
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ConfigError::Invalid("api key contains invalid characters".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
    }

    Ok(Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()?)
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim().trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Sends the request and turns auth failures and non-2xx statuses into errors.
pub(crate) async fn send_checked(
    request: RequestBuilder,
    backend: &str,
) -> Result<Response, ProviderError> {
    let response = request.send().await?;
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ProviderError::Unauthorized {
            backend: backend.to_string(),
            status: status.as_u16(),
        });
    }

    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        return Err(ProviderError::BackendResponse {
            backend: backend.to_string(),
            status: Some(status.as_u16()),
            details: format!("{status}: {body}"),
        });
    }

    Ok(response)
}

pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    backend: &str,
) -> Result<T, ProviderError> {
    let response = send_checked(request, backend).await?;
    Ok(response.json::<T>().await?)
}
