use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{backend} rejected the credentials (status {status})")]
    Unauthorized { backend: String, status: u16 },

    #[error("invalid response from {backend}: {details}")]
    BackendResponse {
        backend: String,
        status: Option<u16>,
        details: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{backend} request failed: {details}")]
    Request { backend: String, details: String },
}

impl ProviderError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::Unauthorized { .. })
    }

    /// Timeouts, connection failures, throttling and server errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(error) => {
                error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
            }
            ProviderError::BackendResponse {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn request(backend: &str, details: impl Into<String>) -> Self {
        ProviderError::Request {
            backend: backend.to_string(),
            details: details.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document {document} is unreadable: {reason}")]
    DocumentUnreadable { document: String, reason: String },

    #[error("no text could be extracted from the uploaded documents")]
    EmptyCorpus,

    #[error("provider credentials are invalid: {0}")]
    CredentialsInvalid(#[source] ProviderError),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index build failed: {0}")]
    Provider(#[source] ProviderError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<ProviderError> for IngestError {
    fn from(error: ProviderError) -> Self {
        if error.is_auth() {
            IngestError::CredentialsInvalid(error)
        } else {
            IngestError::Provider(error)
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no index is ready yet, process some documents first")]
    NoIndexReady,

    #[error("question is empty")]
    EmptyQuestion,

    #[error("retrieval or generation failed: {0}")]
    RetrievalOrGenerationFailed(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("url parse error for {field}: {source}")]
    Url {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::{IngestError, ProviderError};

    #[test]
    fn auth_failures_map_to_credentials_invalid() {
        let error = IngestError::from(ProviderError::Unauthorized {
            backend: "openai".to_string(),
            status: 401,
        });
        assert!(matches!(error, IngestError::CredentialsInvalid(_)));
    }

    #[test]
    fn throttling_and_server_errors_are_retryable() {
        let throttled = ProviderError::BackendResponse {
            backend: "openai".to_string(),
            status: Some(429),
            details: "slow down".to_string(),
        };
        let bad_request = ProviderError::BackendResponse {
            backend: "openai".to_string(),
            status: Some(400),
            details: "bad".to_string(),
        };
        let unavailable = ProviderError::BackendResponse {
            backend: "qdrant".to_string(),
            status: Some(503),
            details: "down".to_string(),
        };

        assert!(throttled.is_retryable());
        assert!(unavailable.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(!ProviderError::request("openai", "dimension mismatch").is_retryable());
    }
}
