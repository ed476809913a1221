use crate::config::{non_empty, parse_endpoint, ProviderSettings, VectorStoreKind};
use crate::error::{ConfigError, ProviderError};
use crate::models::{ScoredChunk, VectorRecord};
use crate::providers::{endpoint, http_client, send_checked, send_json};
use crate::retry::RetryPolicy;
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

const BACKEND: &str = "qdrant";
const UPSERT_BATCH: usize = 256;

/// Managed index in Qdrant.
///
/// Every build writes a fresh collection `{index_name}-{id}`. Only once all
/// points are stored is the alias `index_name` moved onto it, so a failed
/// build never touches the collection a live index is searching.
pub struct QdrantStore {
    endpoint: String,
    alias: String,
    collection: String,
    client: Client,
    retry: RetryPolicy,
    vector_size: Option<usize>,
}

impl QdrantStore {
    pub fn new(settings: &ProviderSettings, index_name: impl Into<String>) -> Result<Self, ConfigError> {
        parse_endpoint("qdrant_url", &settings.qdrant_url)?;
        let alias = index_name.into().trim().to_string();
        if alias.is_empty() {
            return Err(ConfigError::Invalid("qdrant collection name is empty".to_string()));
        }

        Ok(Self {
            endpoint: settings.qdrant_url.trim().trim_end_matches('/').to_string(),
            collection: format!("{alias}-{}", Uuid::new_v4().simple()),
            alias,
            client: http_client(settings.request_timeout, non_empty(&settings.qdrant_api_key))?,
            retry: settings.retry,
            vector_size: None,
        })
    }

    /// Physical collection this store writes to and searches.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn collection_url(&self, collection: &str, suffix: &str) -> String {
        endpoint(&self.endpoint, &format!("collections/{collection}{suffix}"))
    }

    async fn create_collection(&self, vector_size: usize) -> Result<(), ProviderError> {
        let url = self.collection_url(&self.collection, "");
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine",
            }
        });
        self.retry
            .run("qdrant.create_collection", || {
                send_checked(self.client.put(&url).json(&body), BACKEND)
            })
            .await?;
        Ok(())
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), ProviderError> {
        let url = self.collection_url(&self.collection, "/points?wait=true");
        for batch in records.chunks(UPSERT_BATCH) {
            let points = batch
                .iter()
                .map(|record| {
                    json!({
                        "id": record.id,
                        "vector": record.vector,
                        "payload": {
                            "chunk_index": record.id,
                            "text": record.text,
                        },
                    })
                })
                .collect::<Vec<_>>();
            let body = json!({ "points": points });

            self.retry
                .run("qdrant.upsert", || {
                    send_checked(self.client.put(&url).json(&body), BACKEND)
                })
                .await?;
        }
        Ok(())
    }

    /// Collection the alias points at right now, if any.
    async fn alias_target(&self) -> Result<Option<String>, ProviderError> {
        let url = endpoint(&self.endpoint, "aliases");
        let parsed: Value = self
            .retry
            .run("qdrant.list_aliases", || send_json(self.client.get(&url), BACKEND))
            .await?;

        Ok(parsed
            .pointer("/result/aliases")
            .and_then(Value::as_array)
            .and_then(|aliases| {
                aliases.iter().find(|entry| {
                    let name = entry.pointer("/alias_name").and_then(Value::as_str);
                    name == Some(self.alias.as_str())
                })
            })
            .and_then(|entry| entry.pointer("/collection_name"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Atomically repoints the alias at this store's collection and returns
    /// the collection it pointed at before.
    async fn promote(&self) -> Result<Option<String>, ProviderError> {
        let previous = self.alias_target().await?;

        let mut actions = Vec::new();
        match &previous {
            Some(_) => actions.push(json!({ "delete_alias": { "alias_name": self.alias } })),
            // a plain collection still holding the index name would block the alias
            None => self.drop_collection(&self.alias).await?,
        }
        actions.push(json!({
            "create_alias": {
                "collection_name": self.collection,
                "alias_name": self.alias,
            }
        }));

        let url = endpoint(&self.endpoint, "collections/aliases");
        let body = json!({ "actions": actions });
        self.retry
            .run("qdrant.update_aliases", || {
                send_checked(self.client.post(&url).json(&body), BACKEND)
            })
            .await?;
        Ok(previous)
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), ProviderError> {
        let url = self.collection_url(collection, "");
        let deleted = self
            .retry
            .run("qdrant.delete_collection", || {
                send_checked(self.client.delete(&url), BACKEND)
            })
            .await;
        match deleted {
            Ok(_) => Ok(()),
            Err(ProviderError::BackendResponse {
                status: Some(404), ..
            }) => Ok(()),
            Err(error) => Err(error),
        }
    }

    async fn discard(&self, collection: &str) {
        if let Err(error) = self.drop_collection(collection).await {
            warn!(collection, error = %error, "could not delete qdrant collection");
        }
    }

    async fn build(&self, vector_size: usize, records: &[VectorRecord]) -> Result<Option<String>, ProviderError> {
        self.create_collection(vector_size).await?;
        self.upsert(records).await?;
        self.promote().await
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    fn kind(&self) -> VectorStoreKind {
        VectorStoreKind::Managed
    }

    fn name(&self) -> Option<&str> {
        Some(&self.alias)
    }

    async fn replace_records(&mut self, records: &[VectorRecord]) -> Result<(), ProviderError> {
        let vector_size = match records.first() {
            Some(record) => record.vector.len(),
            None => return Err(ProviderError::request(BACKEND, "refusing to build an empty collection")),
        };

        if let Some(record) = records.iter().find(|record| record.vector.len() != vector_size) {
            return Err(ProviderError::request(
                BACKEND,
                format!(
                    "embedding dimension {} != {} for point {}",
                    record.vector.len(),
                    vector_size,
                    record.id
                ),
            ));
        }

        let previous = match self.build(vector_size, records).await {
            Ok(previous) => previous,
            Err(error) => {
                self.discard(&self.collection).await;
                return Err(error);
            }
        };
        if let Some(previous) = previous.filter(|previous| *previous != self.collection) {
            self.discard(&previous).await;
        }

        info!(
            alias = %self.alias,
            collection = %self.collection,
            points = records.len(),
            "qdrant collection rebuilt"
        );
        self.vector_size = Some(vector_size);
        Ok(())
    }

    async fn search_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, ProviderError> {
        if let Some(expected) = self.vector_size {
            if query_vector.len() != expected {
                return Err(ProviderError::request(
                    BACKEND,
                    format!("query vector dim {} is not {}", query_vector.len(), expected),
                ));
            }
        }

        let url = self.collection_url(&self.collection, "/points/search");
        let body = json!({
            "vector": query_vector,
            "limit": top_k,
            "with_payload": true,
        });
        let parsed: Value = self
            .retry
            .run("qdrant.search", || {
                send_json(self.client.post(&url).json(&body), BACKEND)
            })
            .await?;

        Ok(parse_search_hits(&parsed))
    }
}

fn parse_search_hits(parsed: &Value) -> Vec<ScoredChunk> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut result = Vec::with_capacity(hits.len());
    for hit in hits {
        let id = hit.pointer("/id").and_then(Value::as_u64).unwrap_or_default();
        let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
        let text = hit
            .pointer("/payload/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        result.push(ScoredChunk {
            id,
            score,
            text,
            source: BACKEND.to_string(),
        });
    }

    result.sort_by(|left, right| right.score.total_cmp(&left.score));
    result
}
