//! Authentication: bcrypt password hashing, HS256 access tokens carried in the
//! `accessToken` cookie, and the middleware guarding protected routes.

use std::sync::Arc;

use axum::{
  extract::{Request, State},
  middleware::Next,
  response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::AuthSettings;
use crate::error::AppError;
use crate::state::AppState;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
  #[error("No secret key found")]
  MissingSecret,

  #[error("Access token missing")]
  MissingToken,

  #[error("Invalid or expired access token")]
  InvalidToken,

  #[error("Invalid email or password")]
  InvalidCredentials,

  #[error("password hashing failed: {0}")]
  Hashing(String),
}

/// Claims carried by the access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
  pub sub: String,
  pub email: String,
  pub iat: i64,
  pub exp: i64,
}

/// The caller, as established by `require_auth`. Handlers take it as
/// `Extension<AuthUser>`.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
  pub id: Uuid,
  pub email: String,
}

/// Hash on a blocking thread; bcrypt is deliberately slow.
pub async fn hash_password(password: String, cost: u32) -> Result<String, AuthError> {
  tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
    .await
    .map_err(|e| AuthError::Hashing(e.to_string()))?
    .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Returns Ok(false) on mismatch; Err only if the stored hash is unusable.
pub async fn verify_password(password: String, hash: String) -> Result<bool, AuthError> {
  tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
    .await
    .map_err(|e| AuthError::Hashing(e.to_string()))?
    .map_err(|e| AuthError::Hashing(e.to_string()))
}

pub fn issue_token(settings: &AuthSettings, user_id: Uuid, email: &str) -> Result<String, AuthError> {
  let secret = settings.jwt_secret.as_deref().ok_or(AuthError::MissingSecret)?;
  let now = Utc::now().timestamp();
  let claims = Claims { sub: user_id.to_string(), email: email.to_string(), iat: now, exp: now + settings.jwt_ttl_secs };
  encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).map_err(|e| {
    error!(target: "auth", error = %e, "Failed to sign access token");
    AuthError::InvalidToken
  })
}

pub fn verify_token(settings: &AuthSettings, token: &str) -> Result<AuthUser, AuthError> {
  let secret = settings.jwt_secret.as_deref().ok_or(AuthError::MissingSecret)?;
  let mut validation = Validation::default();
  validation.leeway = 0;
  let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation).map_err(|e| {
    debug!(target: "auth", error = %e, "Access token rejected");
    AuthError::InvalidToken
  })?;
  let id = Uuid::parse_str(&data.claims.sub).map_err(|_| AuthError::InvalidToken)?;
  Ok(AuthUser { id, email: data.claims.email })
}

/// Session cookie holding the access token.
pub fn session_cookie(settings: &AuthSettings, token: String) -> Cookie<'static> {
  Cookie::build((ACCESS_TOKEN_COOKIE, token))
    .http_only(true)
    .secure(settings.cookie_secure)
    .same_site(SameSite::Lax)
    .path("/")
    .max_age(time::Duration::seconds(settings.jwt_ttl_secs))
    .build()
}

/// Cookie value used to clear the session; path must match `session_cookie`.
pub fn removal_cookie() -> Cookie<'static> {
  Cookie::build((ACCESS_TOKEN_COOKIE, "")).path("/").build()
}

/// Middleware for protected routes: checks the access token cookie and
/// attaches `AuthUser` to the request.
pub async fn require_auth(
  State(state): State<Arc<AppState>>,
  jar: CookieJar,
  mut request: Request,
  next: Next,
) -> Result<Response, AppError> {
  if state.auth.jwt_secret.is_none() {
    error!(target: "auth", "JWT_SECRET missing; refusing authenticated request");
    return Err(AuthError::MissingSecret.into());
  }
  let token = jar
    .get(ACCESS_TOKEN_COOKIE)
    .map(|c| c.value().to_string())
    .filter(|t| !t.is_empty())
    .ok_or(AuthError::MissingToken)?;

  let user = verify_token(&state.auth, &token).map_err(|e| {
    warn!(target: "auth", path = %request.uri().path(), "Rejected access token");
    e
  })?;
  debug!(target: "auth", user_id = %user.id, "Authenticated request");
  request.extensions_mut().insert(user);
  Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn settings(secret: Option<&str>, ttl: i64) -> AuthSettings {
    AuthSettings { jwt_secret: secret.map(str::to_string), jwt_ttl_secs: ttl, cookie_secure: false, bcrypt_cost: 4 }
  }

  #[tokio::test]
  async fn password_hash_verifies_only_the_original() {
    let hash = hash_password("correct horse".into(), 4).await.unwrap();
    assert_ne!(hash, "correct horse");
    assert!(verify_password("correct horse".into(), hash.clone()).await.unwrap());
    assert!(!verify_password("wrong horse".into(), hash).await.unwrap());
  }

  #[tokio::test]
  async fn garbage_hash_is_an_error() {
    assert!(verify_password("pw".into(), "not-a-bcrypt-hash".into()).await.is_err());
  }

  #[test]
  fn token_round_trip() {
    let s = settings(Some("secret"), 3600);
    let id = Uuid::new_v4();
    let token = issue_token(&s, id, "a@example.com").unwrap();
    let user = verify_token(&s, &token).unwrap();
    assert_eq!(user, AuthUser { id, email: "a@example.com".into() });
  }

  #[test]
  fn token_signed_with_other_secret_is_rejected() {
    let token = issue_token(&settings(Some("one"), 3600), Uuid::new_v4(), "a@example.com").unwrap();
    assert_eq!(verify_token(&settings(Some("two"), 3600), &token).unwrap_err(), AuthError::InvalidToken);
  }

  #[test]
  fn expired_token_is_rejected() {
    let s = settings(Some("secret"), -120);
    let token = issue_token(&s, Uuid::new_v4(), "a@example.com").unwrap();
    assert_eq!(verify_token(&s, &token).unwrap_err(), AuthError::InvalidToken);
  }

  #[test]
  fn missing_secret_is_reported() {
    let s = settings(None, 3600);
    assert_eq!(issue_token(&s, Uuid::new_v4(), "a@example.com").unwrap_err(), AuthError::MissingSecret);
    assert_eq!(verify_token(&s, "x.y.z").unwrap_err(), AuthError::MissingSecret);
  }

  #[test]
  fn session_cookie_flags() {
    let cookie = session_cookie(&settings(Some("s"), 600), "tok".into());
    let rendered = cookie.to_string();
    assert!(rendered.starts_with("accessToken=tok"));
    assert!(rendered.contains("HttpOnly"));
    assert!(rendered.contains("SameSite=Lax"));
    assert!(rendered.contains("Path=/"));
    assert!(rendered.contains("Max-Age=600"));
    assert!(!rendered.contains("Secure"));
  }

  #[test]
  fn session_cookie_is_secure_when_configured() {
    let mut s = settings(Some("s"), 600);
    s.cookie_secure = true;
    let rendered = session_cookie(&s, "tok".into()).to_string();
    assert!(rendered.contains("Secure"));
    assert!(rendered.contains("HttpOnly"));
  }
}
