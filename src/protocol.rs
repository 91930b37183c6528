//! Public HTTP request/response structs (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.
//! Field names on the wire are camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Answer, Question, User};

/// Question as the client sees it: canonical answer, owner and view count stay on the server.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOut {
    pub id: Uuid,
    pub question: String,
    pub has_code: bool,
}

pub fn question_out(q: &Question) -> QuestionOut {
    QuestionOut { id: q.id, question: q.question.clone(), has_code: q.has_code }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOut {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

pub fn user_out(u: &User) -> UserOut {
    UserOut { id: u.id, email: u.email.clone(), created_at: u.created_at }
}

//
// Auth
//

#[derive(Deserialize)]
pub struct CredentialsIn {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthOut {
    pub message: String,
    pub user: UserOut,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageOut {
    pub message: String,
}

//
// Recall
//

#[derive(Deserialize)]
pub struct GenerateIn {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionsOut {
    pub questions: Vec<QuestionOut>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackIn {
    #[serde(default)]
    pub question_id: String,
    #[serde(default)]
    pub user_answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackOut {
    pub answer_id: Uuid,
    pub question_id: Uuid,
    pub feedback: String,
    pub created_at: DateTime<Utc>,
}

pub fn feedback_out(a: &Answer) -> FeedbackOut {
    FeedbackOut { answer_id: a.id, question_id: a.question_id, feedback: a.feedback.clone(), created_at: a.created_at }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOut {
    pub id: Uuid,
    pub question_id: Uuid,
    pub text: String,
    pub feedback: String,
    pub created_at: DateTime<Utc>,
}

pub fn answer_out(a: &Answer) -> AnswerOut {
    AnswerOut {
        id: a.id,
        question_id: a.question_id,
        text: a.text.clone(),
        feedback: a.feedback.clone(),
        created_at: a.created_at,
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswersOut {
    pub answers: Vec<AnswerOut>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthOut {
    pub ok: bool,
    pub store: bool,
    pub cache: bool,
}
