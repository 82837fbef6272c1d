//! Boundary to the external language model.
//!
//! The model is a black box behind [`LanguageModel`]: a prompt goes in, an
//! answer or a [`CollaboratorError`] comes out. [`OpenAiChat`] talks to any
//! OpenAI-compatible chat completion endpoint.

use crate::assistant::prompt::Prompt;
use log::debug;
use reqwest::blocking::Client;
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Failure of the language model collaborator.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("language model API key is not configured (set OPENAI_API_KEY)")]
    NotConfigured,
    #[error("request to the language model failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("language model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed language model response: {0}")]
    MalformedResponse(String),
}

/// Anything that can answer a [`Prompt`].
pub trait LanguageModel {
    fn complete(&self, prompt: &Prompt) -> Result<String, CollaboratorError>;
}

impl<M: LanguageModel + ?Sized> LanguageModel for Box<M> {
    fn complete(&self, prompt: &Prompt) -> Result<String, CollaboratorError> {
        (**self).complete(prompt)
    }
}

/// Connection and sampling settings of [`OpenAiChat`].
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// Blocking client for OpenAI-compatible chat completions.
pub struct OpenAiChat {
    client: Client,
    config: ChatConfig,
}

impl OpenAiChat {
    pub fn new(config: ChatConfig) -> Result<Self, CollaboratorError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, prompt: &Prompt) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.system_preamble.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.user_message(),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

impl LanguageModel for OpenAiChat {
    fn complete(&self, prompt: &Prompt) -> Result<String, CollaboratorError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(CollaboratorError::NotConfigured)?;

        debug!(
            "sending {} context chars to {}",
            prompt.context.chars().count(),
            self.config.model
        );
        let response = self
            .client
            .post(self.chat_completions_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", api_key))
            .json(&self.request_body(prompt))
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_completion(&body)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

/// Content of the first choice of a chat completion body.
fn parse_completion(body: &str) -> Result<String, CollaboratorError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CollaboratorError::MalformedResponse(e.to_string()))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| CollaboratorError::MalformedResponse("no choices in response".to_string()))
}
