//! Language-model connectivity probe.
//!
//! Sends one short prompt to an OpenAI-compatible chat-completions endpoint
//! to prove that the configured credentials and network path work.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::config::OpenAiConfig;

/// Prompt sent by the connectivity probe.
pub const PROBE_PROMPT: &str = "Hello! This is a test.";

/// Completion length cap for the probe request.
const PROBE_MAX_TOKENS: u32 = 50;

/// Errors that can occur while probing the language model.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// No API key is configured.
    #[error("no API key configured")]
    MissingApiKey,
    /// The HTTP request could not be sent or completed.
    #[error("request failed: {0}")]
    RequestFailed(String),
    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {body}")]
    Provider {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body, as text.
        body: String,
    },
    /// The response body was not the expected shape.
    #[error("unexpected response: {0}")]
    Parse(String),
}

/// A chat model that can answer a single user message.
pub trait LanguageModel: Send + Sync {
    /// Sends `prompt` as a single user message and returns the reply text.
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProbeError>> + Send + 'a>>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Client for any OpenAI-compatible chat-completions API.
pub struct OpenAiModel {
    config: OpenAiConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [CompletionMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Serialize)]
struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiModel {
    /// Creates a client from the resolved configuration.
    ///
    /// A missing API key is not an error here; [`LanguageModel::complete`]
    /// reports it when the probe runs.
    #[must_use]
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

impl LanguageModel for OpenAiModel {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProbeError>> + Send + 'a>> {
        Box::pin(async move {
            let api_key = self
                .config
                .api_key
                .as_deref()
                .ok_or(ProbeError::MissingApiKey)?;

            let body = CompletionRequest {
                model: &self.config.model,
                messages: [CompletionMessage {
                    role: "user",
                    content: prompt,
                }],
                max_tokens: PROBE_MAX_TOKENS,
            };

            let resp = self
                .client
                .post(&self.config.endpoint)
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| ProbeError::RequestFailed(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ProbeError::Provider {
                    status: status.as_u16(),
                    body,
                });
            }

            let parsed: CompletionResponse = resp
                .json()
                .await
                .map_err(|e| ProbeError::Parse(e.to_string()))?;

            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .ok_or_else(|| ProbeError::Parse("empty choices array".to_string()))
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}
