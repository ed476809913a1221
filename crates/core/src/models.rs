use crate::config::VectorStoreKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A PDF handed over by the user. Only lives until its text is extracted.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    /// Offset of the first character in the corpus, counted in chars.
    pub start: usize,
    pub text: String,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: u64,
    pub vector: Vec<f32>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: u64,
    pub score: f64,
    pub text: String,
    pub source: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

/// Append-only transcript. Turns are only ever added as a (user, assistant)
/// pair, so roles alternate and always start with the user. Deserializing
/// rejects any list that breaks that shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<ConversationTurn>", into = "Vec<ConversationTurn>")]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl TryFrom<Vec<ConversationTurn>> for ConversationHistory {
    type Error = String;

    fn try_from(turns: Vec<ConversationTurn>) -> Result<Self, Self::Error> {
        if turns.len() % 2 == 1 {
            return Err(format!("history has {} turns; expected whole exchanges", turns.len()));
        }
        for (position, turn) in turns.iter().enumerate() {
            let expected = if position % 2 == 0 {
                Role::User
            } else {
                Role::Assistant
            };
            if turn.role != expected {
                return Err(format!("turn {position} is {}, expected {expected}", turn.role));
            }
        }
        Ok(Self { turns })
    }
}

impl From<ConversationHistory> for Vec<ConversationTurn> {
    fn from(history: ConversationHistory) -> Self {
        history.turns
    }
}

impl ConversationHistory {
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// The last `window` turns, trimmed so the slice starts on a user turn.
    pub fn recent(&self, window: usize) -> &[ConversationTurn] {
        let mut start = self.turns.len().saturating_sub(window);
        if start % 2 == 1 {
            start += 1;
        }
        &self.turns[start.min(self.turns.len())..]
    }

    pub(crate) fn push_exchange(&mut self, question: String, answer: String) {
        self.turns.push(ConversationTurn {
            role: Role::User,
            text: question,
        });
        self.turns.push(ConversationTurn {
            role: Role::Assistant,
            text: answer,
        });
    }
}

/// How much text a single document contributed to the corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCoverage {
    pub filename: String,
    pub checksum: String,
    pub page_count: u32,
    pub pages_with_text: u32,
    pub extracted_chars: usize,
}

impl DocumentCoverage {
    pub fn pages_without_text(&self) -> u32 {
        self.page_count.saturating_sub(self.pages_with_text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbedderProfile {
    pub provider: String,
    pub model: String,
}

impl fmt::Display for EmbedderProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub embedder: EmbedderProfile,
    pub store: VectorStoreKind,
    pub index_name: Option<String>,
    pub dimensions: usize,
    pub chunk_count: usize,
    pub built_at: DateTime<Utc>,
}
