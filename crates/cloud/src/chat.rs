//! Client for an OpenAI-compatible `/v1/chat/completions` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crowdwatch_core::chat::{system_prompt, AnalyticsContext, ChatMessage, ChatRole, EMPTY_REPLY};

pub const DEFAULT_CHAT_URL: &str = "https://api.kolosal.ai";
pub const DEFAULT_CHAT_MODEL: &str = "meta-llama/llama-4-maverick-17b-128e-instruct";
pub const MAX_TOKENS: u32 = 1000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("AI service not configured")]
    Unconfigured,

    #[error("AI service error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("AI service request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Token accounting reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub message: String,
    pub usage: ChatUsage,
    pub model: Option<String>,
}

/// Seam the assistant sessions and `/api/ai-chat` call through.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    /// Complete `messages` (user/assistant history), prepending a system
    /// prompt built from `context`.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        context: Option<&AnalyticsContext>,
    ) -> Result<ChatReply, ChatError>;

    fn is_configured(&self) -> bool {
        true
    }
}

pub struct ChatApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl ChatApi {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(
        &self,
        messages: &[ChatMessage],
        context: Option<&AnalyticsContext>,
    ) -> CompletionRequest<'_> {
        let mut full = Vec::with_capacity(messages.len() + 1);
        full.push(ChatMessage {
            role: ChatRole::System,
            content: system_prompt(context),
        });
        // Caller-supplied system turns are dropped.
        full.extend(
            messages
                .iter()
                .filter(|m| m.role != ChatRole::System)
                .cloned(),
        );
        CompletionRequest {
            model: &self.model,
            messages: full,
            max_tokens: MAX_TOKENS,
        }
    }
}

#[async_trait]
impl ChatCompleter for ChatApi {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        context: Option<&AnalyticsContext>,
    ) -> Result<ChatReply, ChatError> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(ChatError::Unconfigured);
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(key)
            .json(&self.request_body(messages, context))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::error!(status = status.as_u16(), body = %body, "Chat completion failed");
            return Err(ChatError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = response.json().await?;
        Ok(completion.into_reply())
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

impl CompletionResponse {
    fn into_reply(self) -> ChatReply {
        let message = self
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| EMPTY_REPLY.to_string());
        let usage = self
            .usage
            .map(|u| ChatUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();
        ChatReply {
            message,
            usage,
            model: self.model,
        }
    }
}
