//! Registration, login and session management under `/auth`.

use axum::{
  extract::State,
  response::Response,
  routing::{get, post, put},
  Router,
};
use serde_json::json;

use super::extract::ValidJson;
use super::users::update_profile;
use super::{response, ActiveUser, ApiError, AppState, AuthUser};
use crate::auth::{hash_password, issue_session, verify_password, IssuedSession};
use crate::models::user::{
  default_preferences, ChangePassword, Login, ProfileUpdate, Register, COLLECTION,
};
use crate::models::{timestamp, Role};
use crate::types::Document;

const INVALID_LOGIN: &str = "Invalid email or password";
const DUPLICATE_EMAIL: &str = "User already exists with this email";

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/register", post(register))
    .route("/login", post(login))
    .route("/me", get(me).put(update_me))
    .route("/change-password", put(change_password))
    .route("/logout", post(logout))
    .route("/refresh", post(refresh))
}

/// Argon2 is deliberately slow, so it runs off the async workers.
async fn hash_blocking(password: String) -> Result<String, ApiError> {
  let hash = tokio::task::spawn_blocking(move || hash_password(&password))
    .await
    .map_err(anyhow::Error::from)?
    .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
  Ok(hash)
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, ApiError> {
  let ok = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
    .await
    .map_err(anyhow::Error::from)?;
  Ok(ok)
}

async fn new_session(state: &AppState, user_id: uuid::Uuid) -> Result<IssuedSession, ApiError> {
  let ttl = state.config.auth.token_ttl_hours;
  Ok(issue_session(state.store.as_ref(), user_id, ttl).await?)
}

fn session_body(user: Document, issued: IssuedSession) -> serde_json::Value {
  json!({
    "user": user.into_record(),
    "token": issued.token,
    "expiresAt": timestamp::format(issued.session.expires_at),
  })
}

/// POST /auth/register
async fn register(
  State(state): State<AppState>,
  ValidJson(body): ValidJson<Register>,
) -> Result<Response, ApiError> {
  body
    .check(state.config.auth.min_password_length)
    .map_err(ApiError::Validation)?;

  let email = body.email.trim().to_lowercase();
  if state.store.credential_by_email(&email).await?.is_some() {
    return Err(ApiError::Conflict(DUPLICATE_EMAIL.into()));
  }

  let role = if state.config.auth.is_admin_email(&email) {
    Role::Admin
  } else {
    body.role.unwrap_or_default()
  };
  let password_hash = hash_blocking(body.password).await?;

  let now = timestamp::now();
  let user = state
    .store
    .insert(
      COLLECTION,
      json!({
        "email": email,
        "name": body.name,
        "title": body.title,
        "department": body.department,
        "phone": body.phone,
        "role": role,
        "isActive": true,
        "preferences": default_preferences(),
        "lastLogin": null,
        "createdAt": now,
        "updatedAt": now,
      }),
    )
    .await?;

  if let Err(e) = state
    .store
    .create_credential(user.id, &email, &password_hash)
    .await
  {
    state.store.delete(COLLECTION, user.id).await?;
    // A concurrent registration won the UNIQUE constraint on email.
    if state.store.credential_by_email(&email).await?.is_some() {
      return Err(ApiError::Conflict(DUPLICATE_EMAIL.into()));
    }
    return Err(e.into());
  }

  let issued = new_session(&state, user.id).await?;
  tracing::info!(user_id = %user.id, %role, "user registered");
  response::created("User registered successfully", session_body(user, issued))
}

/// POST /auth/login
async fn login(
  State(state): State<AppState>,
  ValidJson(body): ValidJson<Login>,
) -> Result<Response, ApiError> {
  let email = body.email.trim().to_lowercase();
  let credential = state
    .store
    .credential_by_email(&email)
    .await?
    .ok_or_else(|| ApiError::unauthorized(INVALID_LOGIN))?;

  if !verify_blocking(body.password, credential.password_hash).await? {
    tracing::warn!(%email, "failed login attempt");
    return Err(ApiError::unauthorized(INVALID_LOGIN));
  }

  let user = state
    .store
    .get(COLLECTION, credential.user_id)
    .await?
    .ok_or_else(|| ApiError::unauthorized(INVALID_LOGIN))?;
  if user.bool_field("isActive") == Some(false) {
    return Err(ApiError::forbidden("Account disabled"));
  }

  let user = state
    .store
    .update(COLLECTION, user.id, json!({"lastLogin": timestamp::now()}))
    .await?
    .ok_or_else(|| ApiError::unauthorized(INVALID_LOGIN))?;
  let issued = new_session(&state, user.id).await?;
  tracing::info!(user_id = %user.id, "user logged in");
  response::ok("Login successful", session_body(user, issued))
}

/// GET /auth/me
async fn me(user: ActiveUser) -> Result<Response, ApiError> {
  let ActiveUser(AuthUser { doc, .. }) = user;
  response::ok("User profile retrieved successfully", doc.into_record())
}

/// PUT /auth/me
async fn update_me(
  State(state): State<AppState>,
  user: ActiveUser,
  ValidJson(body): ValidJson<ProfileUpdate>,
) -> Result<Response, ApiError> {
  let updated = update_profile(&state, &user.doc, body).await?;
  tracing::info!(user_id = %user.id, "profile updated");
  response::ok("Profile updated successfully", updated.into_record())
}

/// PUT /auth/change-password
async fn change_password(
  State(state): State<AppState>,
  user: ActiveUser,
  ValidJson(body): ValidJson<ChangePassword>,
) -> Result<Response, ApiError> {
  body
    .check(state.config.auth.min_password_length)
    .map_err(ApiError::Validation)?;

  let credential = state
    .store
    .credential(user.id)
    .await?
    .ok_or_else(|| ApiError::unauthorized("Current password is incorrect"))?;
  if !verify_blocking(body.current_password, credential.password_hash).await? {
    return Err(ApiError::unauthorized("Current password is incorrect"));
  }

  let password_hash = hash_blocking(body.new_password).await?;
  state.store.update_password(user.id, &password_hash).await?;

  // All sessions go, including the caller's; it continues on a fresh token.
  let sessions = state.store.delete_user_sessions(user.id).await?;
  let issued = new_session(&state, user.id).await?;
  tracing::info!(user_id = %user.id, revoked = sessions, "password changed");
  response::ok(
    "Password changed successfully",
    json!({
      "token": issued.token,
      "expiresAt": timestamp::format(issued.session.expires_at),
    }),
  )
}

/// POST /auth/logout
async fn logout(State(state): State<AppState>, user: AuthUser) -> Result<Response, ApiError> {
  state.store.delete_session(user.session_id).await?;
  tracing::info!(user_id = %user.id, "user logged out");
  response::ok("Logged out successfully", json!(null))
}

/// POST /auth/refresh
async fn refresh(State(state): State<AppState>, user: ActiveUser) -> Result<Response, ApiError> {
  state.store.delete_session(user.session_id).await?;
  let issued = new_session(&state, user.id).await?;
  tracing::debug!(user_id = %user.id, "session refreshed");
  response::ok(
    "Token refreshed successfully",
    json!({
      "token": issued.token,
      "expiresAt": timestamp::format(issued.session.expires_at),
    }),
  )
}
