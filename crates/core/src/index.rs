use crate::embeddings::Embedder;
use crate::error::{IngestError, ProviderError};
use crate::models::{Chunk, IndexInfo, ScoredChunk, VectorRecord};
use crate::traits::{StoreFactory, VectorIndex};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// A built index together with the embedder that produced its vectors.
pub struct KnowledgeBase {
    store: Box<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    info: IndexInfo,
}

impl KnowledgeBase {
    pub fn info(&self) -> &IndexInfo {
        &self.info
    }

    /// Embeds `question` with the build-time embedder and returns the closest chunks.
    pub async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, ProviderError> {
        let query_vector = self.embedder.embed_query(question).await?;
        if query_vector.len() != self.info.dimensions {
            return Err(ProviderError::request(
                &self.info.embedder.provider,
                format!(
                    "query vector dim {} does not match index dim {}",
                    query_vector.len(),
                    self.info.dimensions
                ),
            ));
        }

        let hits = self.store.search_vector(&query_vector, top_k).await?;
        debug!(hits = hits.len(), top_k, "retrieved chunks");
        Ok(hits)
    }
}

/// Embeds every chunk and writes the vectors into a freshly opened store.
pub async fn build_index(
    chunks: &[Chunk],
    embedder: Arc<dyn Embedder>,
    stores: &dyn StoreFactory,
) -> Result<KnowledgeBase, IngestError> {
    if chunks.is_empty() {
        return Err(IngestError::EmptyCorpus);
    }

    let profile = embedder.profile();
    let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
    let vectors = embedder.embed_documents(&texts).await?;

    if vectors.len() != chunks.len() {
        return Err(ProviderError::request(
            &profile.provider,
            format!(
                "embedding count {} doesn't match chunk count {}",
                vectors.len(),
                chunks.len()
            ),
        )
        .into());
    }

    let dimensions = vectors[0].len();
    if dimensions == 0 || vectors.iter().any(|vector| vector.len() != dimensions) {
        return Err(ProviderError::request(
            &profile.provider,
            "embeddings have inconsistent or zero dimensions",
        )
        .into());
    }

    let records = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| VectorRecord {
            id: chunk.index as u64,
            vector,
            text: chunk.text.clone(),
        })
        .collect::<Vec<_>>();

    let mut store = stores.open()?;
    store.replace_records(&records).await?;

    let info = IndexInfo {
        embedder: profile,
        store: store.kind(),
        index_name: store.name().map(str::to_string),
        dimensions,
        chunk_count: records.len(),
        built_at: Utc::now(),
    };
    info!(
        embedder = %info.embedder,
        store = %info.store,
        chunk_count = info.chunk_count,
        dimensions,
        "index built"
    );

    Ok(KnowledgeBase {
        store,
        embedder,
        info,
    })
}
