//! Runtime configuration: environment settings (optionally from `.env`) and
//! prompt templates loaded from TOML.
//!
//! See `AppConfig` for the env variables and `Prompts` for the TOML schema.

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::util::parse_flag;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_JWT_TTL_SECS: i64 = 86_400;
const DEFAULT_BCRYPT_COST: u32 = 10;
const DEFAULT_MAX_INPUT_CHARS: usize = 20_000;
const DEFAULT_MAX_ANSWER_CHARS: usize = 5_000;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompts used by the OpenAI client. Any field may be overridden in TOML.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub generation_system: String,
  pub generation_user_template: String,
  pub feedback_system: String,
  pub feedback_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      generation_system: r#"You will be given a text. Use it exactly as it is to generate a set of comprehension questions for active recall.

Rules:
- Focus only on the most useful and important information.
- Questions must not be too hard or too simple.
- Output must be a valid JSON object (no comments, no trailing commas) of the form:
  {"questions": [{"question": string, "answer": string, "hasCode": boolean}]}
- "hasCode" is true when answering requires writing or reading code.
- Do not include explanations, notes, or extra text.
- Return ONLY the JSON object, nothing else."#.into(),
      generation_user_template: "{text}".into(),
      feedback_system: "You are a patient tutor grading a learner's answer to a comprehension question. Compare the learner's answer with the reference answer. Say what is correct, what is missing or wrong, and how to improve. Be concise (at most 5 sentences) and address the learner directly. If the question involves code, comment on the code's correctness too.".into(),
      feedback_user_template: "Question: {question}\nReference answer: {answer}\nInvolves code: {has_code}\nLearner's answer: {user_answer}".into(),
    }
  }
}

/// Attempt to load prompt overrides from PROMPTS_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_prompt_config_from_env() -> Option<PromptConfig> {
  let path = std::env::var("PROMPTS_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<PromptConfig>(&s) {
      Ok(cfg) => {
        info!(target: "recall_backend", %path, "Loaded prompt config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "recall_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "recall_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

/// Settings for issuing and checking access tokens.
#[derive(Clone, Debug)]
pub struct AuthSettings {
  /// None means JWT_SECRET is missing; protected routes then answer 500.
  pub jwt_secret: Option<String>,
  pub jwt_ttl_secs: i64,
  pub cookie_secure: bool,
  pub bcrypt_cost: u32,
}

/// Request size limits.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
  pub max_input_chars: usize,
  pub max_answer_chars: usize,
}

impl Default for Limits {
  fn default() -> Self {
    Self { max_input_chars: DEFAULT_MAX_INPUT_CHARS, max_answer_chars: DEFAULT_MAX_ANSWER_CHARS }
  }
}

/// Everything read from the environment at startup. `.env` is loaded by `main`
/// before this runs.
///
/// Env variables:
///   PORT                 : u16 (default 3000)
///   DATABASE_URL         : postgres URL; else built from DB_USER/DB_PASSWORD/DB_HOST/DB_PORT/DB_NAME
///   DB_MAX_CONNECTIONS   : pool size (default 10)
///   REDIS_URL            : e.g. "redis://127.0.0.1:6380"; unset = in-process cache
///   JWT_SECRET           : HS256 secret for access tokens
///   JWT_TTL_SECS         : token + cookie lifetime (default 86400)
///   COOKIE_SECURE        : mark the cookie Secure (default false)
///   BCRYPT_COST          : bcrypt work factor (default 10)
///   MAX_INPUT_CHARS      : max text length for generation (default 20000)
///   MAX_ANSWER_CHARS     : max answer length for feedback (default 5000)
///   CORS_ALLOW_ORIGINS   : comma-separated origins allowed with credentials; unset = any origin
///   PROMPTS_CONFIG_PATH  : TOML file with prompt overrides
#[derive(Clone, Debug)]
pub struct AppConfig {
  pub port: u16,
  pub database_url: Option<String>,
  pub db_max_connections: u32,
  pub redis_url: Option<String>,
  /// Empty means any origin, without credentials.
  pub cors_origins: Vec<String>,
  pub auth: AuthSettings,
  pub limits: Limits,
  pub prompts: Prompts,
}

impl AppConfig {
  pub fn from_env() -> Self {
    let auth = AuthSettings {
      jwt_secret: env_string("JWT_SECRET"),
      jwt_ttl_secs: env_parse("JWT_TTL_SECS").unwrap_or(DEFAULT_JWT_TTL_SECS),
      cookie_secure: std::env::var("COOKIE_SECURE").map(|v| parse_flag(&v)).unwrap_or(false),
      bcrypt_cost: env_parse("BCRYPT_COST").unwrap_or(DEFAULT_BCRYPT_COST),
    };
    if auth.jwt_secret.is_none() {
      warn!(target: "auth", "JWT_SECRET not set; authenticated routes will fail with 500");
    }

    let limits = Limits {
      max_input_chars: env_parse("MAX_INPUT_CHARS").unwrap_or(DEFAULT_MAX_INPUT_CHARS),
      max_answer_chars: env_parse("MAX_ANSWER_CHARS").unwrap_or(DEFAULT_MAX_ANSWER_CHARS),
    };

    let prompts = load_prompt_config_from_env().map(|c| c.prompts).unwrap_or_default();

    Self {
      port: env_parse("PORT").unwrap_or(DEFAULT_PORT),
      database_url: database_url_from_env(),
      db_max_connections: env_parse("DB_MAX_CONNECTIONS").unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
      redis_url: env_string("REDIS_URL"),
      cors_origins: env_string("CORS_ALLOW_ORIGINS").map(|v| split_origins(&v)).unwrap_or_default(),
      auth,
      limits,
      prompts,
    }
  }
}

fn env_string(key: &str) -> Option<String> {
  std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn split_origins(raw: &str) -> Vec<String> {
  raw.split(',').map(|o| o.trim().trim_end_matches('/')).filter(|o| !o.is_empty()).map(String::from).collect()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
  let raw = env_string(key)?;
  match raw.trim().parse::<T>() {
    Ok(v) => Some(v),
    Err(_) => {
      warn!(target: "recall_backend", %key, value = %raw, "Ignoring unparsable env value");
      None
    }
  }
}

/// DATABASE_URL wins; otherwise the discrete DB_* variables are assembled when DB_NAME is set.
fn database_url_from_env() -> Option<String> {
  if let Some(url) = env_string("DATABASE_URL") {
    return Some(url);
  }
  let name = env_string("DB_NAME")?;
  Some(build_database_url(
    &env_string("DB_USER").unwrap_or_else(|| "postgres".into()),
    env_string("DB_PASSWORD").as_deref(),
    &env_string("DB_HOST").unwrap_or_else(|| "localhost".into()),
    env_parse("DB_PORT").unwrap_or(5432),
    &name,
  ))
}

pub fn build_database_url(user: &str, password: Option<&str>, host: &str, port: u16, name: &str) -> String {
  match password {
    Some(pw) => format!("postgres://{}:{}@{}:{}/{}", user, pw, host, port, name),
    None => format!("postgres://{}@{}:{}/{}", user, host, port, name),
  }
}
