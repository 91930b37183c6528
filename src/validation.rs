//! Validation for untrusted input: LLM output and request fields.
//!
//! LLM output is never trusted before it passes `parse_generated_questions`.
//! Any deviation from the expected shape is an error; nothing is repaired.

use serde::Deserialize;
use thiserror::Error;

use crate::domain::GeneratedQuestion;

const MAX_EMAIL_LEN: usize = 100;
const MIN_PASSWORD_BYTES: usize = 8;
// bcrypt ignores everything past 72 bytes
const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
  #[error("invalid JSON: {0}")]
  InvalidJson(String),

  #[error("response does not match expected schema: {0}")]
  Shape(String),

  #[error("response contains no questions")]
  Empty,

  #[error("item {index}: {reason}")]
  Item { index: usize, reason: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuestionsEnvelope {
  Wrapped { questions: Vec<GeneratedQuestion> },
  Bare(Vec<GeneratedQuestion>),
}

/// Parse and validate the generation output.
///
/// Accepts `{"questions": [...]}` or a bare array. Each item needs non-blank
/// `question` and `answer` strings; `hasCode` defaults to false.
pub fn parse_generated_questions(raw: &str) -> Result<Vec<GeneratedQuestion>, SchemaError> {
  let value: serde_json::Value =
    serde_json::from_str(raw.trim()).map_err(|e| SchemaError::InvalidJson(e.to_string()))?;
  let envelope: QuestionsEnvelope =
    serde_json::from_value(value).map_err(|e| SchemaError::Shape(e.to_string()))?;
  let items = match envelope {
    QuestionsEnvelope::Wrapped { questions } => questions,
    QuestionsEnvelope::Bare(items) => items,
  };

  if items.is_empty() {
    return Err(SchemaError::Empty);
  }

  items
    .into_iter()
    .enumerate()
    .map(|(index, item)| {
      if item.question.trim().is_empty() {
        return Err(SchemaError::Item { index, reason: "question is blank".into() });
      }
      if item.answer.trim().is_empty() {
        return Err(SchemaError::Item { index, reason: "answer is blank".into() });
      }
      Ok(GeneratedQuestion {
        question: item.question.trim().to_string(),
        answer: item.answer.trim().to_string(),
        has_code: item.has_code,
      })
    })
    .collect()
}

/// Normalize and check an email address. Returns the lowercase form.
pub fn normalize_email(email: &str) -> Result<String, String> {
  let email = email.trim().to_lowercase();
  if email.is_empty() {
    return Err("Email is required".into());
  }
  if email.len() > MAX_EMAIL_LEN {
    return Err(format!("Email must be at most {} characters", MAX_EMAIL_LEN));
  }
  let (local, domain) = email.split_once('@').ok_or_else(|| "Email is invalid".to_string())?;
  let domain_ok = domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.');
  if local.is_empty() || !domain_ok || domain.contains('@') || email.chars().any(char::is_whitespace) {
    return Err("Email is invalid".into());
  }
  Ok(email)
}

pub fn check_password(password: &str) -> Result<(), String> {
  if password.len() < MIN_PASSWORD_BYTES {
    return Err(format!("Password must be at least {} bytes", MIN_PASSWORD_BYTES));
  }
  if password.len() > MAX_PASSWORD_BYTES {
    return Err(format!("Password must be at most {} bytes", MAX_PASSWORD_BYTES));
  }
  Ok(())
}

/// Require non-blank text within `max_chars`; `field` names it in the message.
pub fn check_text<'a>(field: &str, text: &'a str, max_chars: usize) -> Result<&'a str, String> {
  let text = text.trim();
  if text.is_empty() {
    return Err(format!("{} is required", field));
  }
  if text.chars().count() > max_chars {
    return Err(format!("{} must be at most {} characters", field, max_chars));
  }
  Ok(text)
}
