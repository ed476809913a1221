use crate::chat::ChatModel;
use crate::chunking::{split_text, ChunkingConfig};
use crate::config::{PipelineConfig, ProviderSettings};
use crate::embeddings::Embedder;
use crate::error::{ConfigError, IngestError, QueryError};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::index::{build_index, KnowledgeBase};
use crate::loader::{load_corpus, SkippedDocument};
use crate::models::{
    ConversationHistory, ConversationTurn, DocumentCoverage, IndexInfo, ScoredChunk,
    UploadedDocument,
};
use crate::providers::{build_chat_model, build_embedder};
use crate::retriever::{ConversationalRetriever, RetrievalSettings};
use crate::stores::ConfiguredStores;
use crate::traits::StoreFactory;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// The external collaborators a session talks to.
#[derive(Clone)]
pub struct Services {
    pub extractor: Arc<dyn PdfExtractor>,
    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatModel>,
    pub stores: Arc<dyn StoreFactory>,
}

impl Services {
    pub fn from_config(
        config: &PipelineConfig,
        settings: &ProviderSettings,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        settings.validate(config)?;
        Ok(Self {
            extractor: Arc::new(LopdfExtractor),
            embedder: build_embedder(config, settings)?,
            chat: build_chat_model(config, settings)?,
            stores: Arc::new(ConfiguredStores::from_config(config, settings)?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProcessSummary {
    pub coverage: Vec<DocumentCoverage>,
    pub skipped: Vec<SkippedDocument>,
    pub corpus_chars: usize,
    pub index: IndexInfo,
}

/// One user's documents and conversation.
///
/// A failed `process` keeps the previous index; a failed `ask` keeps the
/// history exactly as it was. Neither ends the session.
pub struct Session {
    id: Uuid,
    config: PipelineConfig,
    services: Services,
    knowledge: Option<KnowledgeBase>,
    history: ConversationHistory,
    last_sources: Vec<ScoredChunk>,
}

impl Session {
    pub fn new(config: PipelineConfig, services: Services) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            config,
            services,
            knowledge: None,
            history: ConversationHistory::default(),
            last_sources: Vec::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn history(&self) -> &[ConversationTurn] {
        self.history.turns()
    }

    pub fn index_info(&self) -> Option<&IndexInfo> {
        self.knowledge.as_ref().map(KnowledgeBase::info)
    }

    /// Chunks that backed the most recent answer.
    pub fn last_sources(&self) -> &[ScoredChunk] {
        &self.last_sources
    }

    pub fn reset_history(&mut self) {
        self.history.clear();
        self.last_sources.clear();
    }

    /// Swaps providers for future builds and answers. The live index keeps
    /// querying with the embedder it was built with.
    pub fn switch_services(&mut self, services: Services) {
        self.services = services;
    }

    pub async fn process(
        &mut self,
        documents: &[UploadedDocument],
    ) -> Result<ProcessSummary, IngestError> {
        let span = info_span!("process", session = %self.id, documents = documents.len());
        let (knowledge, summary) = self.build(documents).instrument(span).await?;

        if self.knowledge.is_some() {
            info!(session = %self.id, "replacing previous index");
        }
        self.knowledge = Some(knowledge);
        if self.config.reset_history_on_process {
            self.reset_history();
        }
        Ok(summary)
    }

    async fn build(
        &self,
        documents: &[UploadedDocument],
    ) -> Result<(KnowledgeBase, ProcessSummary), IngestError> {
        let report = load_corpus(
            documents,
            self.services.extractor.as_ref(),
            self.config.batch_policy,
        )?;
        for skipped in &report.skipped {
            warn!(document = %skipped.filename, reason = %skipped.reason, "document left out of the index");
        }

        let chunks = split_text(&report.corpus, &ChunkingConfig::from(&self.config))?;
        info!(chunk_count = chunks.len(), "corpus chunked");

        let knowledge = build_index(
            &chunks,
            Arc::clone(&self.services.embedder),
            self.services.stores.as_ref(),
        )
        .await?;

        let summary = ProcessSummary {
            coverage: report.coverage,
            skipped: report.skipped,
            corpus_chars: report.corpus.chars().count(),
            index: knowledge.info().clone(),
        };
        Ok((knowledge, summary))
    }

    /// Answers `question` and returns the whole transcript. The question and
    /// its answer are appended together, only once the answer exists.
    pub async fn ask(&mut self, question: &str) -> Result<&[ConversationTurn], QueryError> {
        if question.trim().is_empty() {
            return Err(QueryError::EmptyQuestion);
        }
        let knowledge = self.knowledge.as_ref().ok_or(QueryError::NoIndexReady)?;

        let retriever = ConversationalRetriever::new(
            Arc::clone(&self.services.chat),
            RetrievalSettings::from(&self.config),
        );
        let span = info_span!("ask", session = %self.id, turns = self.history.len());
        let answer = retriever
            .answer(knowledge, &self.history, question)
            .instrument(span)
            .await?;

        self.history
            .push_exchange(question.trim().to_string(), answer.text);
        self.last_sources = answer.sources;
        Ok(self.history.turns())
    }
}
