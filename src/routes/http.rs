//! HTTP endpoint handlers for health and the recall cycle. These are thin
//! wrappers that forward to `crate::recall`. Each handler is instrumented and
//! logs ids and sizes, never raw text.

use std::sync::Arc;

use axum::{
  extract::{rejection::JsonRejection, Path, State},
  http::StatusCode,
  response::IntoResponse,
  Extension, Json,
};
use tracing::{info, instrument};

use crate::auth::AuthUser;
use crate::error::AppResult;
use crate::protocol::*;
use crate::recall;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let store = state.store.ping().await.is_ok();
  let cache = state.cache.ping().await.is_ok();
  let ok = store && cache;
  let status = if ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
  (status, Json(HealthOut { ok, store, cache }))
}

#[instrument(level = "info", skip_all, fields(user_id = %user.id))]
pub async fn http_post_generate(
  State(state): State<Arc<AppState>>,
  Extension(user): Extension<AuthUser>,
  payload: Result<Json<GenerateIn>, JsonRejection>,
) -> AppResult<Json<QuestionsOut>> {
  let Json(body) = payload?;
  let questions = recall::generate_questions(&state, user.id, &body.text).await?;
  info!(target: "recall", user_id = %user.id, count = questions.len(), "HTTP generate served");
  Ok(Json(QuestionsOut { questions: questions.iter().map(question_out).collect() }))
}

#[instrument(level = "info", skip_all, fields(user_id = %user.id))]
pub async fn http_get_questions(
  State(state): State<Arc<AppState>>,
  Extension(user): Extension<AuthUser>,
) -> AppResult<Json<QuestionsOut>> {
  let questions = recall::list_questions(&state, user.id).await?;
  Ok(Json(QuestionsOut { questions: questions.iter().map(question_out).collect() }))
}

#[instrument(level = "info", skip_all, fields(user_id = %user.id))]
pub async fn http_post_feedback(
  State(state): State<Arc<AppState>>,
  Extension(user): Extension<AuthUser>,
  payload: Result<Json<FeedbackIn>, JsonRejection>,
) -> AppResult<(StatusCode, Json<FeedbackOut>)> {
  let Json(body) = payload?;
  let answer = recall::submit_answer(&state, user.id, &body.question_id, &body.user_answer).await?;
  info!(target: "recall", user_id = %user.id, question_id = %answer.question_id, "HTTP feedback served");
  Ok((StatusCode::CREATED, Json(feedback_out(&answer))))
}

#[instrument(level = "info", skip(state, user), fields(user_id = %user.id))]
pub async fn http_get_answers(
  State(state): State<Arc<AppState>>,
  Extension(user): Extension<AuthUser>,
  Path(question_id): Path<String>,
) -> AppResult<Json<AnswersOut>> {
  let answers = recall::answer_history(&state, user.id, &question_id).await?;
  Ok(Json(AnswersOut { answers: answers.iter().map(answer_out).collect() }))
}
