use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::llm::{ApiError, ChatMessage, ChatProvider, Role};

/// One turn of a conversation as shown to the user
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

/// Append-only conversation history, ordered by submission.
/// The system instruction is never stored here; it is re-attached on every
/// outbound call.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn {
            role,
            content: content.into(),
            created_at: Utc::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// An interactive session: one system prompt, one sampling temperature,
/// optionally one attached extracted document, and the running history.
///
/// This replaces the per-variant copies of the same send loop: variants
/// differ only in the `ProfileConfig` they are built from.
pub struct ChatSession {
    system_prompt: String,
    temperature: f64,
    context: Option<String>,
    history: ConversationHistory,
}

impl ChatSession {
    pub fn new(system_prompt: impl Into<String>, temperature: f64) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            temperature,
            context: None,
            history: ConversationHistory::new(),
        }
    }

    pub fn for_profile(profile: &common::ProfileConfig) -> Self {
        Self::new(&profile.system_prompt, profile.temperature)
    }

    /// Attach extracted or uploaded text. It is injected as a second
    /// system-role message on every subsequent call.
    pub fn attach_context(&mut self, text: impl Into<String>) {
        self.context = Some(text.into());
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Explicit reset: drops the history, keeps prompt and attached context.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Build the outbound message list: system prompt first, then the
    /// attached context (if any) as a second system message, then the full
    /// prior history in order, then the new user message.
    fn assemble(&self, user_message: &str) -> Vec<ChatMessage> {
        let mut messages =
            Vec::with_capacity(2 + self.history.len() + self.context.iter().count());
        messages.push(ChatMessage::new(Role::System, &self.system_prompt));
        if let Some(ref context) = self.context {
            messages.push(ChatMessage::new(Role::System, context));
        }
        for turn in self.history.iter() {
            messages.push(ChatMessage::new(turn.role, &turn.content));
        }
        messages.push(ChatMessage::new(Role::User, user_message));
        messages
    }

    /// Send one user message and return the assistant's reply.
    ///
    /// Validation happens before any network call. On success the user turn
    /// and the assistant turn are appended to the history, in that order; on
    /// any failure the history is left untouched. Errors are never retried.
    pub async fn send(
        &mut self,
        provider: &dyn ChatProvider,
        user_message: &str,
    ) -> Result<String, ApiError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ApiError::InvalidTemperature(self.temperature));
        }
        if user_message.trim().is_empty() {
            return Err(ApiError::EmptyMessage);
        }

        let messages = self.assemble(user_message);
        debug!(
            turns = messages.len(),
            has_context = self.context.is_some(),
            "sending chat completion request"
        );

        let reply = provider.complete(&messages, self.temperature).await?;

        self.history.push(Role::User, user_message);
        self.history.push(Role::Assistant, &reply);

        Ok(reply)
    }
}
