//! API error type. Every handler returns `Result<_, AppError>`; the
//! `IntoResponse` impl picks the status code and renders `{"message": ...}`.
//! Server-side failures are logged here and answered with a generic message.

use axum::{
  extract::rejection::JsonRejection,
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::auth::AuthError;
use crate::cache::CacheError;
use crate::openai::LlmError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
  #[error("{0}")]
  BadRequest(String),

  #[error("{0}")]
  NotFound(String),

  #[error("{0}")]
  Conflict(String),

  #[error(transparent)]
  Auth(#[from] AuthError),

  #[error("LLM failure: {0}")]
  Llm(#[from] LlmError),

  #[error("store failure: {0}")]
  Store(StoreError),

  #[error("cache failure: {0}")]
  Cache(#[from] CacheError),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<StoreError> for AppError {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::Conflict(msg) => AppError::Conflict(msg),
      StoreError::NotFound(msg) => AppError::NotFound(msg),
      other => AppError::Store(other),
    }
  }
}

impl From<JsonRejection> for AppError {
  fn from(rejection: JsonRejection) -> Self {
    AppError::BadRequest(rejection.body_text())
  }
}

#[derive(Serialize)]
struct ErrorBody {
  message: String,
}

impl AppError {
  pub fn status(&self) -> StatusCode {
    match self {
      AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Conflict(_) => StatusCode::CONFLICT,
      AppError::Auth(AuthError::MissingSecret | AuthError::Hashing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Llm(_) | AppError::Store(_) | AppError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Message shown to the client.
  fn public_message(&self) -> String {
    match self {
      AppError::Auth(AuthError::Hashing(_)) => "Internal server error".into(),
      AppError::Llm(LlmError::Schema(_)) => "Model response did not match the expected format".into(),
      AppError::Llm(_) => "Language model request failed".into(),
      AppError::Store(_) | AppError::Cache(_) => "Internal server error".into(),
      other => other.to_string(),
    }
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(target: "recall_backend", error = %self, "Request failed");
    }
    (status, Json(ErrorBody { message: self.public_message() })).into_response()
  }
}
