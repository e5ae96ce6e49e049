//! Hosted language model services
//!
//! One OpenAI-compatible chat completion client backs both the intent
//! classifier and the question-answering service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ANSWER_PREAMBLE: &str = "You are a concise voice assistant running next to the user's \
Android phone. Answer in one to three short sentences that read naturally when spoken aloud. \
Do not use markdown, lists or code blocks.";

/// Answers a free-form question
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn answer(&self, query: &str) -> Result<String>;
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// OpenAI-compatible chat completion client
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl ChatClient {
    /// Create a client for `base_url` (e.g. `https://api.openai.com/v1`)
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        if config.api_key.is_none() {
            tracing::warn!(base_url = %config.base_url, "no API key configured for language model");
        }
        Self::new(config.base_url.clone(), config.api_key.clone())
    }

    /// Run one completion and return the first choice's text
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, a non-success status or an
    /// empty response
    pub async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
    ) -> Result<String> {
        let request = ChatCompletionRequest {
            model,
            messages,
            temperature,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Llm(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("API error: {status} - {body}")));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("failed to parse response: {e}")))?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Llm("response contained no content".to_string()))
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

/// Answers questions through the chat completion endpoint
#[derive(Debug, Clone)]
pub struct LlmAnswerer {
    client: ChatClient,
    model: String,
}

impl LlmAnswerer {
    #[must_use]
    pub fn new(client: ChatClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

/// System prompt carrying the current local date and time
fn answer_preamble(now: chrono::DateTime<chrono::Local>) -> String {
    format!(
        "{ANSWER_PREAMBLE}\nCurrent date and time: {}.",
        now.format("%A, %d %B %Y, %H:%M")
    )
}

#[async_trait]
impl AnswerService for LlmAnswerer {
    async fn answer(&self, query: &str) -> Result<String> {
        let messages = vec![
            ChatMessage::system(answer_preamble(chrono::Local::now())),
            ChatMessage::user(query),
        ];

        let answer = self.client.complete(&self.model, messages, 0.7).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(Error::Llm("empty answer".to_string()));
        }

        tracing::debug!(query, answer, "answered");
        Ok(answer.to_string())
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
