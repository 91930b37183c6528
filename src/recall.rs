//! Active recall core: generate questions from text, list them, and grade
//! answers with LLM feedback.
//!
//! Listing mirrors the user's full question records into the cache under
//! `"<userId>questions"`. Feedback reads the question back from that entry and
//! never falls back to the database. Generation leaves the entry alone, so a
//! cache filled before a generation does not show the new questions until the
//! next listing.

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::cache::{get_json, set_json};
use crate::domain::{Answer, NewAnswer, Question};
use crate::error::{AppError, AppResult};
use crate::openai::{LlmError, OpenAI};
use crate::state::AppState;
use crate::validation::check_text;

pub fn questions_cache_key(user_id: Uuid) -> String {
  format!("{}questions", user_id)
}

fn llm(state: &AppState) -> AppResult<&OpenAI> {
  state.openai.as_ref().ok_or(AppError::Llm(LlmError::Disabled))
}

#[instrument(level = "info", skip(state, text), fields(%user_id, text_len = text.len()))]
pub async fn generate_questions(state: &AppState, user_id: Uuid, text: &str) -> AppResult<Vec<Question>> {
  let text = check_text("Text", text, state.limits.max_input_chars).map_err(AppError::BadRequest)?;
  let oa = llm(state)?;

  let items = oa.generate_questions(&state.prompts, text).await?;
  let questions = state.store.insert_questions(user_id, &items).await?;
  info!(target: "recall", %user_id, count = questions.len(), "Questions generated and stored");
  Ok(questions)
}

#[instrument(level = "info", skip(state), fields(%user_id))]
pub async fn list_questions(state: &AppState, user_id: Uuid) -> AppResult<Vec<Question>> {
  let questions = state.store.list_questions(user_id).await?;
  // A token can outlive its account; don't leave an entry nothing will remove.
  if questions.is_empty() && state.store.find_user(user_id).await?.is_none() {
    warn!(target: "recall", %user_id, "Listing for a deleted account");
    return Err(AppError::NotFound("User not found".into()));
  }
  set_json(state.cache.as_ref(), &questions_cache_key(user_id), &questions).await?;
  info!(target: "recall", %user_id, count = questions.len(), "Questions listed and cached");
  Ok(questions)
}

/// Look the question up in the user's cached list.
async fn cached_question(state: &AppState, user_id: Uuid, question_id: Uuid) -> AppResult<Question> {
  let key = questions_cache_key(user_id);
  let cached: Option<Vec<Question>> = get_json(state.cache.as_ref(), &key).await?;
  let Some(questions) = cached else {
    warn!(target: "recall", %user_id, %question_id, "No cached question list for user");
    return Err(AppError::NotFound("Question not found; load your questions first".into()));
  };
  questions
    .into_iter()
    .find(|q| q.id == question_id)
    .ok_or_else(|| AppError::NotFound("Question not found".into()))
}

#[instrument(level = "info", skip(state, question_id, user_answer), fields(%user_id, answer_len = user_answer.len()))]
pub async fn submit_answer(state: &AppState, user_id: Uuid, question_id: &str, user_answer: &str) -> AppResult<Answer> {
  let question_id = Uuid::parse_str(question_id.trim())
    .map_err(|_| AppError::BadRequest("questionId must be a valid id".into()))?;
  let user_answer =
    check_text("userAnswer", user_answer, state.limits.max_answer_chars).map_err(AppError::BadRequest)?;

  let question = cached_question(state, user_id, question_id).await?;
  let oa = llm(state)?;
  let feedback = oa
    .grade_answer(&state.prompts, &question.question, &question.official_answer, question.has_code, user_answer)
    .await?;

  let answer = state
    .store
    .record_answer(NewAnswer { question_id, user_id, text: user_answer.to_string(), feedback })
    .await?;
  info!(target: "recall", %user_id, %question_id, answer_id = %answer.id, "Answer graded and stored");
  Ok(answer)
}

#[instrument(level = "info", skip(state, question_id), fields(%user_id))]
pub async fn answer_history(state: &AppState, user_id: Uuid, question_id: &str) -> AppResult<Vec<Answer>> {
  let question_id = Uuid::parse_str(question_id.trim())
    .map_err(|_| AppError::BadRequest("question id must be a valid id".into()))?;
  Ok(state.store.list_answers(user_id, question_id).await?)
}
