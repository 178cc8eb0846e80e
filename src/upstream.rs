//! Minimal chat-completions client for paragraph generation.
//!
//! Request shape: `{model, messages: [{role, content}], temperature, max_tokens}`.
//! Response: `choices[0].message.content`, or an `error` field on failure.
//! Every failure is folded into `GenerationError`; nothing is retried here.
//!
//! NOTE: We never log the bearer token, only sizes and short previews.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::config::GenerationCfg;
use crate::util::preview;

/// Display is the message shown to the user in place of the paragraph.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
  #[error("{0}")]
  Transport(String),

  #[error("The AI service did not answer in time.")]
  Timeout,

  #[error("{message}")]
  Status { status: u16, message: String },

  #[error("AI response was not valid JSON: {0}")]
  MalformedBody(String),

  #[error("AI did not return text.")]
  MissingText,
}

/// Anything that turns a (system, user) prompt pair into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
  async fn complete(&self, system: &str, user: &str) -> Result<String, GenerationError>;
}

#[derive(Clone)]
pub struct ChatCompletionsClient {
  pub client: reqwest::Client,
  /// When absent, requests go out unauthenticated (expected to pass through the proxy).
  pub api_key: Option<String>,
  pub base_url: String,
  pub model: String,
  pub temperature: f32,
  pub max_tokens: u32,
}

impl ChatCompletionsClient {
  pub fn new(cfg: &GenerationCfg, api_key: Option<String>) -> Result<Self, GenerationError> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = cfg.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }
    let client = builder.build().map_err(|e| GenerationError::Transport(e.to_string()))?;
    Ok(Self {
      client,
      api_key,
      base_url: cfg.base_url.trim_end_matches('/').to_string(),
      model: cfg.model.clone(),
      temperature: cfg.temperature,
      max_tokens: cfg.max_tokens,
    })
  }

  fn endpoint(&self) -> String {
    format!("{}/chat/completions", self.base_url)
  }
}

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model, prompt_len = user.len()))]
  async fn complete(&self, system: &str, user: &str) -> Result<String, GenerationError> {
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature: self.temperature,
      max_tokens: Some(self.max_tokens),
    };

    let mut call = self.client.post(self.endpoint())
      .header(USER_AGENT, "onestep-backend/0.1")
      .header(CONTENT_TYPE, "application/json");
    if let Some(key) = &self.api_key {
      call = call.header(AUTHORIZATION, format!("Bearer {}", key));
    }

    let start = std::time::Instant::now();
    let res = call.json(&req).send().await.map_err(transport_error)?;
    let status = res.status();
    let body = res.text().await.map_err(transport_error)?;
    let elapsed = start.elapsed();

    match parse_completion(status, &body) {
      Ok(text) => {
        info!(?elapsed, %status, text_len = text.len(), preview = %preview(&text, 40), "Paragraph text received");
        Ok(text)
      }
      Err(e) => {
        error!(?elapsed, %status, error = %e, "Paragraph generation failed");
        Err(e)
      }
    }
  }
}

fn transport_error(e: reqwest::Error) -> GenerationError {
  if e.is_timeout() {
    GenerationError::Timeout
  } else {
    GenerationError::Transport(e.to_string())
  }
}

/// Turn an upstream status + raw body into the paragraph text or a `GenerationError`.
pub fn parse_completion(status: StatusCode, body: &str) -> Result<String, GenerationError> {
  if !status.is_success() {
    let message = extract_error_message(body)
      .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
      .unwrap_or_else(|| "AI request failed.".to_string());
    return Err(GenerationError::Status { status: status.as_u16(), message });
  }

  let parsed: ChatCompletionResponse = serde_json::from_str(body)
    .map_err(|e| GenerationError::MalformedBody(e.to_string()))?;
  if let Some(usage) = &parsed.usage {
    info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "Upstream usage");
  }
  parsed.choices
    .into_iter()
    .next()
    .and_then(|c| c.message.content)
    .map(|t| t.trim().to_string())
    .filter(|t| !t.is_empty())
    .ok_or(GenerationError::MissingText)
}

/// `error` may be a bare string or an object carrying `message`.
fn extract_error_message(body: &str) -> Option<String> {
  let v: serde_json::Value = serde_json::from_str(body).ok()?;
  match v.get("error")? {
    serde_json::Value::String(s) => Some(s.clone()),
    serde_json::Value::Object(o) => o.get("message").and_then(|m| m.as_str()).map(str::to_string),
    _ => None,
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  #[serde(default)] choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { #[serde(default)] content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}
