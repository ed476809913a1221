use crate::config::VectorStoreKind;
use crate::error::{ConfigError, ProviderError};
use crate::models::{ScoredChunk, VectorRecord};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn kind(&self) -> VectorStoreKind;

    fn name(&self) -> Option<&str> {
        None
    }

    /// Drops whatever the store held and writes `records` in its place.
    async fn replace_records(&mut self, records: &[VectorRecord]) -> Result<(), ProviderError>;

    /// The `top_k` records closest to `query_vector`, most similar first.
    async fn search_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, ProviderError>;
}

/// Hands out an empty store for every index build.
pub trait StoreFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn VectorIndex>, ConfigError>;
}
