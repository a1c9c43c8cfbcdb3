use serde::{Deserialize, Serialize};

/// Speaker role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message as sent over the wire
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
}

/// Errors surfaced by the chat-completion client.
/// None of these is retried automatically; recovery is re-triggering the action.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("temperature {0} is outside [0, 1]")]
    InvalidTemperature(f64),
    #[error("user message is empty")]
    EmptyMessage,
    #[error("chat API request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },
    #[error("chat API returned a malformed response")]
    MalformedResponse,
    #[error("chat API request timed out after {0} seconds")]
    Timeout(u64),
    #[error("chat API request could not be sent: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Core trait for chat-completion providers
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    /// Issue a single non-streaming completion over the given ordered message
    /// list and return the assistant's reply text.
    async fn complete(&self, messages: &[ChatMessage], temperature: f64) -> Result<String, ApiError>;
}

pub mod remote;
