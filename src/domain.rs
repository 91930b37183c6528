//! Domain models: users, generated questions, persisted questions and answers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Registered account. The password hash never leaves the server.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct User {
  pub id: Uuid,
  pub email: String,
  pub password_hash: String,
  pub created_at: DateTime<Utc>,
}

/// One item of validated LLM output, before it is persisted.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct GeneratedQuestion {
  pub question: String,
  pub answer: String,
  #[serde(rename = "hasCode", default)]
  pub has_code: bool,
}

/// Persisted question. This full record (including server-only fields) is what
/// gets mirrored into the per-user cache entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Question {
  pub id: Uuid,
  pub question: String,
  pub official_answer: String,
  pub has_code: bool,
  pub number_of_seen: i32,
  pub user_id: Uuid,
  pub created_at: DateTime<Utc>,
}

/// A submitted answer together with the feedback generated for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Answer {
  pub id: Uuid,
  pub question_id: Uuid,
  pub user_id: Uuid,
  pub text: String,
  pub feedback: String,
  pub created_at: DateTime<Utc>,
}

/// Input for recording an answer.
#[derive(Clone, Debug)]
pub struct NewAnswer {
  pub question_id: Uuid,
  pub user_id: Uuid,
  pub text: String,
  pub feedback: String,
}
