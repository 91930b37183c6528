//! Account endpoints: register, login, logout, whoami and account deletion.

use std::sync::Arc;

use axum::{
  extract::{rejection::JsonRejection, State},
  http::StatusCode,
  Extension, Json,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, instrument, warn};

use crate::auth::{
  hash_password, issue_token, removal_cookie, session_cookie, verify_password, AuthError, AuthUser,
};
use crate::error::{AppError, AppResult};
use crate::protocol::*;
use crate::recall::questions_cache_key;
use crate::state::AppState;
use crate::validation::{check_password, normalize_email};

#[instrument(level = "info", skip_all)]
pub async fn http_post_register(
  State(state): State<Arc<AppState>>,
  jar: CookieJar,
  payload: Result<Json<CredentialsIn>, JsonRejection>,
) -> AppResult<(StatusCode, CookieJar, Json<AuthOut>)> {
  let Json(body) = payload?;
  // Refuse before creating an account we could not sign a token for.
  if state.auth.jwt_secret.is_none() {
    return Err(AuthError::MissingSecret.into());
  }
  let email = normalize_email(&body.email).map_err(AppError::BadRequest)?;
  check_password(&body.password).map_err(AppError::BadRequest)?;

  let hash = hash_password(body.password, state.auth.bcrypt_cost).await?;
  let user = state.store.create_user(&email, &hash).await?;
  let token = issue_token(&state.auth, user.id, &user.email)?;
  info!(target: "auth", user_id = %user.id, "User registered");

  Ok((
    StatusCode::CREATED,
    jar.add(session_cookie(&state.auth, token)),
    Json(AuthOut { message: "User registered successfully.".into(), user: user_out(&user) }),
  ))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_login(
  State(state): State<Arc<AppState>>,
  jar: CookieJar,
  payload: Result<Json<CredentialsIn>, JsonRejection>,
) -> AppResult<(CookieJar, Json<AuthOut>)> {
  let Json(body) = payload?;
  let email = normalize_email(&body.email).map_err(|_| AuthError::InvalidCredentials)?;

  let Some(user) = state.store.find_user_by_email(&email).await? else {
    warn!(target: "auth", "Login for unknown email");
    return Err(AuthError::InvalidCredentials.into());
  };
  if !verify_password(body.password, user.password_hash.clone()).await? {
    warn!(target: "auth", user_id = %user.id, "Login with wrong password");
    return Err(AuthError::InvalidCredentials.into());
  }

  let token = issue_token(&state.auth, user.id, &user.email)?;
  info!(target: "auth", user_id = %user.id, "User logged in");
  Ok((
    jar.add(session_cookie(&state.auth, token)),
    Json(AuthOut { message: "Logged in successfully.".into(), user: user_out(&user) }),
  ))
}

#[instrument(level = "info", skip_all, fields(user_id = %user.id))]
pub async fn http_post_logout(Extension(user): Extension<AuthUser>, jar: CookieJar) -> (CookieJar, Json<MessageOut>) {
  info!(target: "auth", user_id = %user.id, "User logged out");
  (jar.remove(removal_cookie()), Json(MessageOut { message: "Logged out.".into() }))
}

#[instrument(level = "info", skip_all, fields(user_id = %user.id))]
pub async fn http_get_me(
  State(state): State<Arc<AppState>>,
  Extension(user): Extension<AuthUser>,
) -> AppResult<Json<UserOut>> {
  let found = state
    .store
    .find_user(user.id)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".into()))?;
  Ok(Json(user_out(&found)))
}

/// Deletes the account; questions and answers go with it.
/// The cached question list is dropped first, so a cache failure leaves the
/// account intact and the request can be retried.
#[instrument(level = "info", skip_all, fields(user_id = %user.id))]
pub async fn http_delete_me(
  State(state): State<Arc<AppState>>,
  Extension(user): Extension<AuthUser>,
  jar: CookieJar,
) -> AppResult<(StatusCode, CookieJar)> {
  state.cache.del(&questions_cache_key(user.id)).await?;
  if !state.store.delete_user(user.id).await? {
    return Err(AppError::NotFound("User not found".into()));
  }
  info!(target: "auth", user_id = %user.id, "User deleted");
  Ok((StatusCode::NO_CONTENT, jar.remove(removal_cookie())))
}
