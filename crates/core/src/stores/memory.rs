use crate::config::VectorStoreKind;
use crate::error::ProviderError;
use crate::models::{ScoredChunk, VectorRecord};
use crate::traits::VectorIndex;
use async_trait::async_trait;

const SOURCE: &str = "in_memory";

/// Brute-force cosine search over records kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Vec<VectorRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryStore {
    fn kind(&self) -> VectorStoreKind {
        VectorStoreKind::InMemory
    }

    async fn replace_records(&mut self, records: &[VectorRecord]) -> Result<(), ProviderError> {
        self.records = records.to_vec();
        Ok(())
    }

    async fn search_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, ProviderError> {
        let mut hits = Vec::with_capacity(self.records.len());
        for record in &self.records {
            let score = cosine_similarity(query_vector, &record.vector).ok_or_else(|| {
                ProviderError::request(
                    SOURCE,
                    format!(
                        "query vector dim {} is not {}",
                        query_vector.len(),
                        record.vector.len()
                    ),
                )
            })?;
            hits.push(ScoredChunk {
                id: record.id,
                score,
                text: record.text.clone(),
                source: SOURCE.to_string(),
            });
        }

        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// `None` when the dimensions differ or a vector is empty.
fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x64 = f64::from(x);
        let y64 = f64::from(y);
        dot += x64 * y64;
        norm_a += x64 * x64;
        norm_b += y64 * y64;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        Some(0.0)
    } else {
        Some(dot / denom)
    }
}
