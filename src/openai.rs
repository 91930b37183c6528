//! Minimal OpenAI client for question generation and answer feedback.
//!
//! We only call chat.completions and request either plain text or a JSON object.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::config::Prompts;
use crate::domain::GeneratedQuestion;
use crate::util::{fill_template, trunc_for_log};
use crate::validation::{parse_generated_questions, SchemaError};

const CLIENT_USER_AGENT: &str = "recall-backend/0.1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum LlmError {
  #[error("OpenAI disabled (no OPENAI_API_KEY)")]
  Disabled,

  #[error("request failed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("OpenAI HTTP {status}: {message}")]
  Status { status: u16, message: String },

  #[error("empty completion")]
  EmptyCompletion,

  #[error(transparent)]
  Schema(#[from] SchemaError),
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  ///
  ///   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
  ///   OPENAI_FAST_MODEL   : default "gpt-4o-mini" (feedback)
  ///   OPENAI_STRONG_MODEL : default "gpt-4o" (generation)
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    match Self::new(api_key, base_url, fast_model, strong_model) {
      Ok(oa) => Some(oa),
      Err(e) => {
        error!(target: "recall_backend", error = %e, "Failed to build HTTP client for OpenAI");
        None
      }
    }
  }

  pub fn new(
    api_key: String,
    base_url: String,
    fast_model: String,
    strong_model: String,
  ) -> Result<Self, LlmError> {
    let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    let base_url = base_url.trim_end_matches('/').to_string();
    Ok(Self { client, api_key, base_url, fast_model, strong_model })
  }

  /// One chat completion; returns the first choice's content.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
    json: bool,
  ) -> Result<String, LlmError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: json.then(|| ResponseFormat { r#type: "json_object".into() }),
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, CLIENT_USER_AGENT)
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      return Err(LlmError::Status { status, message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .unwrap_or_default().trim().to_string();
    info!(elapsed = ?start.elapsed(), response_len = text.len(), "Model response received");

    if text.is_empty() {
      return Err(LlmError::EmptyCompletion);
    }
    Ok(text)
  }

  // --- High-level helpers (domain-specialized) ---

  /// Generate comprehension questions from free text. Output is schema-validated;
  /// any deviation is an error.
  #[instrument(level = "info", skip(self, prompts, text), fields(text_len = text.len(), model = %self.strong_model))]
  pub async fn generate_questions(
    &self,
    prompts: &Prompts,
    text: &str,
  ) -> Result<Vec<GeneratedQuestion>, LlmError> {
    let user = fill_template(&prompts.generation_user_template, &[("text", text)]);
    let raw = self.chat(&self.strong_model, &prompts.generation_system, &user, 0.0, true).await?;

    match parse_generated_questions(&raw) {
      Ok(items) => {
        info!(count = items.len(), with_code = items.iter().filter(|q| q.has_code).count(), "Questions generated");
        Ok(items)
      }
      Err(e) => {
        warn!(error = %e, preview = %trunc_for_log(&raw, 120), "Generation output failed schema validation");
        Err(e.into())
      }
    }
  }

  /// Compare a learner's answer to the reference answer and return feedback text.
  #[instrument(level = "info", skip(self, prompts, question, reference, user_answer),
               fields(question_len = question.len(), answer_len = user_answer.len(), %has_code, model = %self.fast_model))]
  pub async fn grade_answer(
    &self,
    prompts: &Prompts,
    question: &str,
    reference: &str,
    has_code: bool,
    user_answer: &str,
  ) -> Result<String, LlmError> {
    let has_code = if has_code { "yes" } else { "no" };
    let user = fill_template(
      &prompts.feedback_user_template,
      &[
        ("question",    question),
        ("answer",      reference),
        ("has_code",    has_code),
        ("user_answer", user_answer),
      ],
    );
    self.chat(&self.fast_model, &prompts.feedback_system, &user, 0.2, false).await
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
