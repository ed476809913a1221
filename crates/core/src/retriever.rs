use crate::chat::{answer_prompt, condense_question_prompt, ChatModel};
use crate::config::PipelineConfig;
use crate::error::ProviderError;
use crate::index::KnowledgeBase;
use crate::models::{ConversationHistory, ConversationTurn, ScoredChunk};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub history_window: usize,
    pub rephrase_question: bool,
}

impl From<&PipelineConfig> for RetrievalSettings {
    fn from(value: &PipelineConfig) -> Self {
        Self {
            top_k: value.top_k,
            history_window: value.history_window,
            rephrase_question: value.rephrase_question,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// The question actually used for retrieval.
    pub search_question: String,
    pub sources: Vec<ScoredChunk>,
}

/// Retrieval plus generation for one question. Holds no conversation state:
/// the caller passes the history in and decides what to keep.
pub struct ConversationalRetriever {
    chat: Arc<dyn ChatModel>,
    settings: RetrievalSettings,
}

impl ConversationalRetriever {
    pub fn new(chat: Arc<dyn ChatModel>, settings: RetrievalSettings) -> Self {
        Self { chat, settings }
    }

    pub async fn answer(
        &self,
        knowledge: &KnowledgeBase,
        history: &ConversationHistory,
        question: &str,
    ) -> Result<Answer, ProviderError> {
        let history = history.recent(self.settings.history_window);
        let search_question = self.standalone_question(history, question).await?;
        let sources = knowledge
            .retrieve(&search_question, self.settings.top_k)
            .await?;

        let messages = answer_prompt(&sources, history, question);
        let text = self.chat.complete(&messages).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ProviderError::request(&self.chat.name(), "model returned an empty answer"));
        }

        Ok(Answer {
            text: text.to_string(),
            search_question,
            sources,
        })
    }

    async fn standalone_question(
        &self,
        history: &[ConversationTurn],
        question: &str,
    ) -> Result<String, ProviderError> {
        if !self.settings.rephrase_question || history.is_empty() {
            return Ok(question.trim().to_string());
        }

        let rewritten = self
            .chat
            .complete(&condense_question_prompt(history, question))
            .await?;
        let rewritten = rewritten.trim();
        debug!(original = question, rewritten, "condensed follow-up question");

        if rewritten.is_empty() {
            Ok(question.trim().to_string())
        } else {
            Ok(rewritten.to_string())
        }
    }
}
