use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_SEPARATOR: &str = "\n";
pub const DEFAULT_TOP_K: usize = 4;

/// Which family of models backs both embeddings and chat completions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// OpenAI-compatible hosted API, billed per call.
    #[default]
    Hosted,
    /// Instruction-tuned models served from our own inference servers.
    SelfHosted,
    /// No network: trigram embeddings and extractive answers, for dry runs.
    Offline,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hosted" | "paid" => Ok(ProviderKind::Hosted),
            "self-hosted" | "self_hosted" | "free" => Ok(ProviderKind::SelfHosted),
            "offline" | "dry-run" => Ok(ProviderKind::Offline),
            other => Err(ConfigError::Invalid(format!(
                "unknown provider '{other}'; use hosted, self-hosted or offline"
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Hosted => f.write_str("hosted"),
            ProviderKind::SelfHosted => f.write_str("self-hosted"),
            ProviderKind::Offline => f.write_str("offline"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreKind {
    #[default]
    InMemory,
    Managed,
}

impl FromStr for VectorStoreKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in_memory" | "in-memory" | "memory" => Ok(VectorStoreKind::InMemory),
            "managed" => Ok(VectorStoreKind::Managed),
            other => Err(ConfigError::Invalid(format!(
                "unknown vector store '{other}'; use in_memory or managed"
            ))),
        }
    }
}

impl fmt::Display for VectorStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorStoreKind::InMemory => f.write_str("in_memory"),
            VectorStoreKind::Managed => f.write_str("managed"),
        }
    }
}

/// What to do with a PDF that cannot be parsed at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    Abort,
    #[default]
    SkipUnreadable,
}

impl FromStr for BatchPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(BatchPolicy::Abort),
            "skip" | "skip_unreadable" | "skip-unreadable" => Ok(BatchPolicy::SkipUnreadable),
            other => Err(ConfigError::Invalid(format!(
                "unknown batch policy '{other}'; use abort or skip"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub provider: ProviderKind,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separator: String,
    pub top_k: usize,
    pub vector_store: VectorStoreKind,
    pub index_name: String,
    pub batch_policy: BatchPolicy,
    /// Number of past turns rendered into the answer prompt.
    pub history_window: usize,
    pub rephrase_question: bool,
    pub reset_history_on_process: bool,
    pub embedding_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separator: DEFAULT_SEPARATOR.to_string(),
            top_k: DEFAULT_TOP_K,
            vector_store: VectorStoreKind::default(),
            index_name: "whisperchain".to_string(),
            batch_policy: BatchPolicy::default(),
            history_window: 6,
            rephrase_question: true,
            reset_history_on_process: false,
            embedding_batch_size: 64,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.separator.is_empty() {
            return Err(ConfigError::Invalid("separator must not be empty".to_string()));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be positive".to_string()));
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding_batch_size must be positive".to_string(),
            ));
        }
        if self.vector_store == VectorStoreKind::Managed && self.index_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "a managed vector store needs an index name".to_string(),
            ));
        }
        Ok(())
    }
}

/// Endpoints, credentials and model names for the external services.
#[derive(Clone)]
pub struct ProviderSettings {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_embedding_model: String,
    pub openai_chat_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub instruct_embedding_url: String,
    pub instruct_embedding_model: String,
    pub embed_instruction: String,
    pub query_instruction: String,
    pub instruct_chat_url: String,
    pub instruct_chat_model: String,
    pub instruct_api_key: Option<String>,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_embedding_model: "text-embedding-3-small".to_string(),
            openai_chat_model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 512,
            instruct_embedding_url: "http://127.0.0.1:8080".to_string(),
            instruct_embedding_model: "hkunlp/instructor-xl".to_string(),
            embed_instruction: "Represent the document for retrieval: ".to_string(),
            query_instruction: "Represent the question for retrieving supporting documents: "
                .to_string(),
            instruct_chat_url: "http://127.0.0.1:8081".to_string(),
            instruct_chat_model: "google/flan-t5-xxl".to_string(),
            instruct_api_key: None,
            qdrant_url: "http://127.0.0.1:6333".to_string(),
            qdrant_api_key: None,
            request_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("ProviderSettings")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_embedding_model", &self.openai_embedding_model)
            .field("openai_chat_model", &self.openai_chat_model)
            .field("instruct_embedding_url", &self.instruct_embedding_url)
            .field("instruct_chat_url", &self.instruct_chat_url)
            .field("instruct_api_key", &redact(&self.instruct_api_key))
            .field("qdrant_url", &self.qdrant_url)
            .field("qdrant_api_key", &redact(&self.qdrant_api_key))
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ProviderSettings {
    /// Checks only what the selected provider and store will actually touch.
    pub fn validate(&self, config: &PipelineConfig) -> Result<(), ConfigError> {
        match config.provider {
            ProviderKind::Hosted => {
                parse_endpoint("openai_base_url", &self.openai_base_url)?;
                if non_empty(&self.openai_api_key).is_none() {
                    return Err(ConfigError::MissingCredential("OPENAI_API_KEY"));
                }
            }
            ProviderKind::SelfHosted => {
                parse_endpoint("instruct_embedding_url", &self.instruct_embedding_url)?;
                parse_endpoint("instruct_chat_url", &self.instruct_chat_url)?;
            }
            ProviderKind::Offline => {}
        }

        if config.vector_store == VectorStoreKind::Managed {
            parse_endpoint("qdrant_url", &self.qdrant_url)?;
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid("request_timeout must be positive".to_string()));
        }
        self.retry.validate()
    }
}

pub(crate) fn parse_endpoint(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::Url { field, source })
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
