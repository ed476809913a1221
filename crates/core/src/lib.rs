pub mod chat;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod loader;
pub mod models;
pub mod providers;
pub mod retriever;
pub mod retry;
pub mod session;
pub mod stores;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_util;

pub use chat::{ChatModel, ExtractiveChat, PromptMessage, PromptRole};
pub use chunking::{split_text, ChunkingConfig};
pub use config::{BatchPolicy, PipelineConfig, ProviderKind, ProviderSettings, VectorStoreKind};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ConfigError, IngestError, ProviderError, QueryError};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use index::{build_index, KnowledgeBase};
pub use loader::{
    digest_bytes, discover_pdf_files, load_corpus, read_documents, LoadReport, SkippedDocument,
};
pub use models::{
    Chunk, ConversationHistory, ConversationTurn, DocumentCoverage, EmbedderProfile, IndexInfo,
    Role, ScoredChunk, UploadedDocument, VectorRecord,
};
pub use retriever::{Answer, ConversationalRetriever, RetrievalSettings};
pub use retry::RetryPolicy;
pub use session::{ProcessSummary, Services, Session};
pub use stores::{ConfiguredStores, InMemoryStore, QdrantStore};
pub use traits::{StoreFactory, VectorIndex};
