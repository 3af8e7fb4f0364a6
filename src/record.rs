//! Record and message types for conversation context

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry in an assembled message sequence, ready for a generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// One stored turn of a conversation.
///
/// Records are immutable once written; retrieval for a user returns them in
/// non-decreasing `created_at` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRecord {
    /// Unique record ID
    pub id: Uuid,

    /// User this turn belongs to; groups records into a conversation
    pub user_id: String,

    /// The text the user submitted
    pub prompt: String,

    /// The text generated in reply
    pub response: String,

    /// Embedding of the prompt, absent when embedding was not requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Timestamp assigned by the store at write time
    pub created_at: DateTime<Utc>,
}

impl ContextRecord {
    /// Create a new record stamped with the current time
    pub fn new(
        user_id: impl Into<String>,
        prompt: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            prompt: prompt.into(),
            response: response.into(),
            embedding: None,
            created_at: Utc::now(),
        }
    }

    /// Set the embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}
