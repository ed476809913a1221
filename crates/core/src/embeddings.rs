use crate::error::ProviderError;
use crate::models::EmbedderProfile;
use async_trait::async_trait;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Text to vector conversion.
///
/// An index remembers the embedder it was built with and uses the same one
/// for queries, so vectors on both sides always come from one model.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn profile(&self) -> EmbedderProfile;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Offline embedder hashing the character trigrams of each word into fixed
/// buckets. Backs the `offline` provider; it has no notion of meaning.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

fn fnv1a(chars: &[char]) -> u64 {
    let mut buffer = [0_u8; 4];
    chars.iter().fold(FNV_OFFSET, |hash, ch| {
        ch.encode_utf8(&mut buffer)
            .bytes()
            .fold(hash, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME))
    })
}

impl CharacterNgramEmbedder {
    /// Unit-length vector; all zeros when `text` has no alphanumeric words.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let dimensions = self.dimensions.max(1);
        let mut vector = vec![0_f32; dimensions];

        let words = text
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|word| !word.is_empty());
        for word in words {
            // padding lets short words and word edges count as trigrams
            let padded = format!(" {} ", word.to_lowercase()).chars().collect::<Vec<_>>();
            for trigram in padded.windows(3) {
                let bucket = (fnv1a(trigram) % dimensions as u64) as usize;
                vector[bucket] += 1.0;
            }
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|value| *value /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn profile(&self) -> EmbedderProfile {
        EmbedderProfile {
            provider: "offline".to_string(),
            model: format!("char-trigram-{}", self.dimensions.max(1)),
        }
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed(text))
    }
}
