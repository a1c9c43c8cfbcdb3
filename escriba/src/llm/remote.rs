use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ApiError, ChatMessage, ChatProvider};

/// Remote chat provider speaking the OpenAI-compatible HTTP API
pub struct RemoteChatClient {
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl RemoteChatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: chat_endpoint(&base_url.into()),
            api_key: api_key.into(),
            model: model.into(),
            timeout: Duration::from_secs(60),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout = Duration::from_secs(timeout_secs);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Resolve the chat-completions endpoint from a configured base URL.
/// Accepts either the API root (e.g. "https://host/v1") or the full
/// chat-completions URL.
fn chat_endpoint(base_url: &str) -> String {
    if base_url.ends_with("/chat/completions") {
        base_url.to_string()
    } else {
        format!("{}/chat/completions", base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl ChatProvider for RemoteChatClient {
    async fn complete(&self, messages: &[ChatMessage], temperature: f64) -> Result<String, ApiError> {
        let req_body = ChatRequest {
            messages,
            model: &self.model,
            stream: false,
            temperature,
        };

        // The timeout covers the whole exchange, body read included.
        let exchange = async {
            let response = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&req_body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::RequestFailed {
                    status: status.as_u16(),
                    body,
                });
            }

            let resp_body: ChatResponse = response.json().await.map_err(|e| {
                if e.is_decode() {
                    ApiError::MalformedResponse
                } else {
                    ApiError::Transport(e)
                }
            })?;

            let choice = resp_body
                .choices
                .into_iter()
                .next()
                .ok_or(ApiError::MalformedResponse)?;

            Ok(choice.message.content)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ApiError::Timeout(self.timeout.as_secs()))?
    }
}

// Wire format of the remote chat-completion API
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    model: &'a str,
    stream: bool,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::chat_endpoint;

    #[test]
    fn endpoint_appended_to_api_root() {
        assert_eq!(
            chat_endpoint("https://api.example.com/v1"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            chat_endpoint("https://api.example.com/v1/"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn full_endpoint_kept_as_is() {
        assert_eq!(
            chat_endpoint("http://localhost:11434/v1/chat/completions"),
            "http://localhost:11434/v1/chat/completions"
        );
    }
}
