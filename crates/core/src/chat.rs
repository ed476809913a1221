use crate::error::ProviderError;
use crate::models::{ConversationTurn, Role, ScoredChunk};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

impl From<Role> for PromptRole {
    fn from(value: Role) -> Self {
        match value {
            Role::User => PromptRole::User,
            Role::Assistant => PromptRole::Assistant,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> String;

    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, ProviderError>;
}

const ANSWER_INSTRUCTIONS: &str = "You answer questions about the user's PDF documents. \
Use only the context passages below. If the answer is not in the context, say that you don't know.";

const CONDENSE_INSTRUCTIONS: &str = "Given the conversation so far and a follow-up question, \
rephrase the follow-up into a standalone question. Reply with the question only.";

const CONTEXT_HEADER: &str = "\n\nContext:\n";
const PASSAGE_END: &str = "\n---\n";

pub fn render_context(chunks: &[ScoredChunk]) -> String {
    let mut out = String::new();
    for (position, chunk) in chunks.iter().enumerate() {
        out.push_str(&format!(
            "[{}] (score {:.3})\n{}{PASSAGE_END}",
            position + 1,
            chunk.score,
            chunk.text.trim()
        ));
    }
    out
}

fn render_transcript(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .map(|turn| format!("{}: {}", turn.role, turn.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Messages asking the model to fold the history into a standalone question.
pub fn condense_question_prompt(history: &[ConversationTurn], question: &str) -> Vec<PromptMessage> {
    vec![
        PromptMessage::system(CONDENSE_INSTRUCTIONS),
        PromptMessage::user(format!(
            "Conversation:\n{}\n\nFollow-up question: {}\nStandalone question:",
            render_transcript(history),
            question.trim()
        )),
    ]
}

/// System message with the retrieved context, the recent turns, then the question.
pub fn answer_prompt(
    chunks: &[ScoredChunk],
    history: &[ConversationTurn],
    question: &str,
) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage::system(format!(
        "{ANSWER_INSTRUCTIONS}{CONTEXT_HEADER}{}",
        render_context(chunks)
    )));
    messages.extend(history.iter().map(|turn| PromptMessage {
        role: turn.role.into(),
        content: turn.text.clone(),
    }));
    messages.push(PromptMessage::user(question.trim()));
    messages
}

/// Offline model for dry runs. Answers with the best-ranked passage of the
/// context verbatim and never rewrites follow-up questions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveChat;

const NO_PASSAGE: &str = "No passage of the documents matches the question.";

fn first_passage(system: &str) -> Option<&str> {
    let (_, context) = system.split_once(CONTEXT_HEADER)?;
    // skip the "[1] (score ..)" line
    let (_, rest) = context.split_once('\n')?;
    let passage = rest.split(PASSAGE_END).next()?.trim();
    (!passage.is_empty()).then_some(passage)
}

#[async_trait]
impl ChatModel for ExtractiveChat {
    fn name(&self) -> String {
        "offline/extractive".to_string()
    }

    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, ProviderError> {
        let Some(system) = messages.iter().find(|message| {
            message.role == PromptRole::System && message.content.contains(CONTEXT_HEADER)
        }) else {
            // an empty rewrite keeps the question as asked
            return Ok(String::new());
        };

        Ok(first_passage(&system.content)
            .unwrap_or(NO_PASSAGE)
            .to_string())
    }
}

/// Flattens chat messages for completion-style endpoints that take one string.
pub fn flatten_messages(messages: &[PromptMessage]) -> String {
    let mut prompt = String::new();
    for message in messages {
        let label = match message.role {
            PromptRole::System => "System",
            PromptRole::User => "User",
            PromptRole::Assistant => "Assistant",
        };
        prompt.push_str(label);
        prompt.push_str(": ");
        prompt.push_str(message.content.trim());
        prompt.push_str("\n\n");
    }
    prompt.push_str("Assistant:");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[tokio::test]
    async fn extractive_chat_quotes_the_top_passage() {
        let prompt = answer_prompt(
            &[chunk("Torque the bolts to 40 Nm.", 0.9), chunk("Unrelated.", 0.1)],
            &[],
            "What torque?",
        );

        let answer = ExtractiveChat.complete(&prompt).await.expect("offline answer");
        assert_eq!(answer, "Torque the bolts to 40 Nm.");

        let empty = ExtractiveChat
            .complete(&answer_prompt(&[], &[], "What torque?"))
            .await
            .expect("offline answer");
        assert_eq!(empty, NO_PASSAGE);
    }

    #[tokio::test]
    async fn extractive_chat_leaves_questions_alone() {
        let history = vec![ConversationTurn {
            role: Role::User,
            text: "What torque?".to_string(),
        }];
        let rewritten = ExtractiveChat
            .complete(&condense_question_prompt(&history, "And the bolts?"))
            .await
            .expect("offline answer");
        assert!(rewritten.is_empty());
    }

    fn chunk(text: &str, score: f64) -> ScoredChunk {
        ScoredChunk {
            id: 0,
            score,
            text: text.to_string(),
            source: "in_memory".to_string(),
        }
    }

    fn turn(role: Role, text: &str) -> ConversationTurn {
        ConversationTurn {
            role,
            text: text.to_string(),
        }
    }

    #[test]
    fn answer_prompt_orders_context_history_question() {
        let history = vec![turn(Role::User, "What is a pump?"), turn(Role::Assistant, "A machine.")];
        let messages = answer_prompt(&[chunk("pumps move fluid", 0.9)], &history, " And a valve? ");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, PromptRole::System);
        assert!(messages[0].content.contains("pumps move fluid"));
        assert_eq!(messages[1].role, PromptRole::User);
        assert_eq!(messages[2].role, PromptRole::Assistant);
        assert_eq!(messages[3], PromptMessage::user("And a valve?"));
    }

    #[test]
    fn condense_prompt_includes_transcript() {
        let history = vec![turn(Role::User, "Who wrote it?"), turn(Role::Assistant, "Ada.")];
        let messages = condense_question_prompt(&history, "When?");

        assert!(messages[1].content.contains("user: Who wrote it?"));
        assert!(messages[1].content.contains("assistant: Ada."));
        assert!(messages[1].content.contains("Follow-up question: When?"));
    }

    #[test]
    fn flattened_prompt_ends_with_assistant_cue() {
        let prompt = flatten_messages(&[PromptMessage::system("be brief"), PromptMessage::user("hi")]);
        assert_eq!(prompt, "System: be brief\n\nUser: hi\n\nAssistant:");
    }
}
