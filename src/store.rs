//! Relational persistence for users, questions and answers.
//!
//! `PgStore` talks to PostgreSQL through a sqlx pool. `MemoryStore` keeps the
//! same rows in process and enforces the same rules (unique email, foreign keys,
//! cascading deletes); it backs local runs without DATABASE_URL and the tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::{Answer, GeneratedQuestion, NewAnswer, Question, User};

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("{0}")]
  Conflict(String),

  #[error("{0}")]
  NotFound(String),

  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
  async fn ping(&self) -> StoreResult<()>;

  /// Fails with `Conflict` when the email is taken.
  async fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User>;
  async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
  async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
  /// Removes the user and, by cascade, their questions and answers.
  async fn delete_user(&self, id: Uuid) -> StoreResult<bool>;

  /// Inserts all items for the user or none of them.
  async fn insert_questions(&self, user_id: Uuid, items: &[GeneratedQuestion]) -> StoreResult<Vec<Question>>;
  /// Oldest first.
  async fn list_questions(&self, user_id: Uuid) -> StoreResult<Vec<Question>>;

  /// Persists the answer and bumps the question's view count.
  /// Fails with `NotFound` if the question or user does not exist.
  async fn record_answer(&self, answer: NewAnswer) -> StoreResult<Answer>;
  /// Newest first.
  async fn list_answers(&self, user_id: Uuid, question_id: Uuid) -> StoreResult<Vec<Answer>>;
}

const SCHEMA: &[&str] = &[
  r#"CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    email VARCHAR(100) UNIQUE NOT NULL,
    password_hash VARCHAR(300) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
  )"#,
  r#"CREATE TABLE IF NOT EXISTS questions (
    id UUID PRIMARY KEY,
    question TEXT NOT NULL,
    official_answer TEXT NOT NULL,
    has_code BOOLEAN NOT NULL DEFAULT FALSE,
    number_of_seen INTEGER NOT NULL DEFAULT 0,
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
  )"#,
  r#"CREATE TABLE IF NOT EXISTS answers (
    id UUID PRIMARY KEY,
    text TEXT NOT NULL,
    feedback TEXT NOT NULL,
    question_id UUID NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
  )"#,
  "CREATE INDEX IF NOT EXISTS idx_questions_user_id ON questions(user_id)",
  "CREATE INDEX IF NOT EXISTS idx_answers_question_id ON answers(question_id)",
];

const QUESTION_COLUMNS: &str = "id, question, official_answer, has_code, number_of_seen, user_id, created_at";
const ANSWER_COLUMNS: &str = "id, question_id, user_id, text, feedback, created_at";

/// PostgreSQL-backed store.
#[derive(Clone, Debug)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
    let pool = PgPoolOptions::new()
      .max_connections(max_connections)
      .acquire_timeout(Duration::from_secs(30))
      .idle_timeout(Duration::from_secs(600))
      .connect(database_url)
      .await?;
    info!(target: "recall_backend", max_connections, "Connection pool established with database");
    Ok(Self { pool })
  }

  /// Create tables and indexes if they are missing. Safe to run on every start.
  pub async fn ensure_schema(&self) -> StoreResult<()> {
    for stmt in SCHEMA {
      sqlx::query(stmt).execute(&self.pool).await?;
    }
    info!(target: "recall_backend", "Database schema ready");
    Ok(())
  }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
  matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
  matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

#[async_trait]
impl Store for PgStore {
  async fn ping(&self) -> StoreResult<()> {
    sqlx::query("SELECT 1").execute(&self.pool).await?;
    Ok(())
  }

  #[instrument(level = "debug", skip(self, email, password_hash))]
  async fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
    let res = sqlx::query_as::<_, User>(
      "INSERT INTO users (id, email, password_hash) VALUES ($1, $2, $3)
       RETURNING id, email, password_hash, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .fetch_one(&self.pool)
    .await;

    match res {
      Ok(user) => Ok(user),
      Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict("Email is already registered".into())),
      Err(e) => Err(e.into()),
    }
  }

  async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT id, email, password_hash, created_at FROM users WHERE id = $1")
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(user)
  }

  async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT id, email, password_hash, created_at FROM users WHERE email = $1")
      .bind(email)
      .fetch_optional(&self.pool)
      .await?;
    Ok(user)
  }

  #[instrument(level = "debug", skip(self))]
  async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
    let res = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&self.pool).await?;
    Ok(res.rows_affected() > 0)
  }

  #[instrument(level = "debug", skip(self, items), fields(count = items.len()))]
  async fn insert_questions(&self, user_id: Uuid, items: &[GeneratedQuestion]) -> StoreResult<Vec<Question>> {
    if items.is_empty() {
      return Ok(Vec::new());
    }

    // One multi-row INSERT: all rows land or none do. Timestamps step by a
    // microsecond so listing order matches generation order.
    let base = Utc::now();
    let rows: Vec<(Uuid, &GeneratedQuestion, DateTime<Utc>)> = items
      .iter()
      .enumerate()
      .map(|(i, item)| (Uuid::new_v4(), item, base + chrono::Duration::microseconds(i as i64)))
      .collect();

    let mut qb: QueryBuilder<Postgres> =
      QueryBuilder::new("INSERT INTO questions (id, question, official_answer, has_code, user_id, created_at) ");
    qb.push_values(&rows, |mut row, (id, item, created_at)| {
      row
        .push_bind(*id)
        .push_bind(item.question.clone())
        .push_bind(item.answer.clone())
        .push_bind(item.has_code)
        .push_bind(user_id)
        .push_bind(*created_at);
    });
    qb.push(" RETURNING ");
    qb.push(QUESTION_COLUMNS);

    let res = qb.build_query_as::<Question>().fetch_all(&self.pool).await;
    match res {
      Ok(mut inserted) => {
        inserted.sort_by_key(|q| q.created_at);
        debug!(target: "recall", %user_id, inserted = inserted.len(), "questions inserted");
        Ok(inserted)
      }
      Err(e) if is_foreign_key_violation(&e) => Err(StoreError::NotFound("User not found".into())),
      Err(e) => Err(e.into()),
    }
  }

  async fn list_questions(&self, user_id: Uuid) -> StoreResult<Vec<Question>> {
    let rows = sqlx::query_as::<_, Question>(&format!(
      "SELECT {} FROM questions WHERE user_id = $1 ORDER BY created_at ASC, id ASC",
      QUESTION_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(rows)
  }

  #[instrument(level = "debug", skip(self, answer), fields(question_id = %answer.question_id, user_id = %answer.user_id))]
  async fn record_answer(&self, answer: NewAnswer) -> StoreResult<Answer> {
    let mut tx = self.pool.begin().await?;

    let inserted = sqlx::query_as::<_, Answer>(&format!(
      "INSERT INTO answers (id, question_id, user_id, text, feedback) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
      ANSWER_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(answer.question_id)
    .bind(answer.user_id)
    .bind(&answer.text)
    .bind(&answer.feedback)
    .fetch_one(&mut *tx)
    .await;

    let row = match inserted {
      Ok(row) => row,
      Err(e) if is_foreign_key_violation(&e) => {
        return Err(StoreError::NotFound("Question or user not found".into()));
      }
      Err(e) => return Err(e.into()),
    };

    sqlx::query("UPDATE questions SET number_of_seen = number_of_seen + 1 WHERE id = $1")
      .bind(answer.question_id)
      .execute(&mut *tx)
      .await?;

    tx.commit().await?;
    Ok(row)
  }

  async fn list_answers(&self, user_id: Uuid, question_id: Uuid) -> StoreResult<Vec<Answer>> {
    let rows = sqlx::query_as::<_, Answer>(&format!(
      "SELECT {} FROM answers WHERE user_id = $1 AND question_id = $2 ORDER BY created_at DESC, id DESC",
      ANSWER_COLUMNS
    ))
    .bind(user_id)
    .bind(question_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(rows)
  }
}

#[derive(Default)]
struct Tables {
  users: HashMap<Uuid, User>,
  // Vec keeps insertion order, which doubles as creation order.
  questions: Vec<Question>,
  answers: Vec<Answer>,
}

/// In-process store with the same constraints as the SQL schema.
#[derive(Default)]
pub struct MemoryStore {
  tables: RwLock<Tables>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn ping(&self) -> StoreResult<()> {
    Ok(())
  }

  async fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
    let mut t = self.tables.write().await;
    if t.users.values().any(|u| u.email == email) {
      return Err(StoreError::Conflict("Email is already registered".into()));
    }
    let user = User {
      id: Uuid::new_v4(),
      email: email.to_string(),
      password_hash: password_hash.to_string(),
      created_at: Utc::now(),
    };
    t.users.insert(user.id, user.clone());
    Ok(user)
  }

  async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
    Ok(self.tables.read().await.users.get(&id).cloned())
  }

  async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
    Ok(self.tables.read().await.users.values().find(|u| u.email == email).cloned())
  }

  async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
    let mut t = self.tables.write().await;
    if t.users.remove(&id).is_none() {
      return Ok(false);
    }
    t.questions.retain(|q| q.user_id != id);
    let remaining: Vec<Uuid> = t.questions.iter().map(|q| q.id).collect();
    t.answers.retain(|a| a.user_id != id && remaining.contains(&a.question_id));
    Ok(true)
  }

  async fn insert_questions(&self, user_id: Uuid, items: &[GeneratedQuestion]) -> StoreResult<Vec<Question>> {
    let mut t = self.tables.write().await;
    if !t.users.contains_key(&user_id) {
      return Err(StoreError::NotFound("User not found".into()));
    }
    let base = Utc::now();
    let rows: Vec<Question> = items
      .iter()
      .enumerate()
      .map(|(i, item)| Question {
        id: Uuid::new_v4(),
        question: item.question.clone(),
        official_answer: item.answer.clone(),
        has_code: item.has_code,
        number_of_seen: 0,
        user_id,
        created_at: base + chrono::Duration::microseconds(i as i64),
      })
      .collect();
    t.questions.extend(rows.iter().cloned());
    Ok(rows)
  }

  async fn list_questions(&self, user_id: Uuid) -> StoreResult<Vec<Question>> {
    let t = self.tables.read().await;
    Ok(t.questions.iter().filter(|q| q.user_id == user_id).cloned().collect())
  }

  async fn record_answer(&self, answer: NewAnswer) -> StoreResult<Answer> {
    let mut t = self.tables.write().await;
    if !t.users.contains_key(&answer.user_id) {
      return Err(StoreError::NotFound("Question or user not found".into()));
    }
    let question = t
      .questions
      .iter_mut()
      .find(|q| q.id == answer.question_id)
      .ok_or_else(|| StoreError::NotFound("Question or user not found".into()))?;
    question.number_of_seen += 1;

    let row = Answer {
      id: Uuid::new_v4(),
      question_id: answer.question_id,
      user_id: answer.user_id,
      text: answer.text,
      feedback: answer.feedback,
      created_at: Utc::now(),
    };
    t.answers.push(row.clone());
    Ok(row)
  }

  async fn list_answers(&self, user_id: Uuid, question_id: Uuid) -> StoreResult<Vec<Answer>> {
    let t = self.tables.read().await;
    Ok(t
      .answers
      .iter()
      .rev()
      .filter(|a| a.user_id == user_id && a.question_id == question_id)
      .cloned()
      .collect())
  }
}
