//! Caller identity extractors.
//!
//! `AuthUser` resolves the bearer token to a session and the session to a
//! user document. Handlers pick the extractor matching how strict the route
//! is: [`ActiveUser`] for most routes, [`MaybeUser`] where anonymous callers
//! are allowed.

use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use std::ops::Deref;
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::auth::{bearer_token, hash_session_token};
use crate::models::{user, Role};
use crate::types::Document;

#[derive(Debug, Clone)]
pub struct AuthUser {
  pub id: Uuid,
  pub session_id: Uuid,
  pub email: String,
  pub name: String,
  pub role: Role,
  pub is_active: bool,
  pub doc: Document,
}

impl AuthUser {
  /// The user id as stored in `createdBy`, `studentId` and friends.
  pub fn uid(&self) -> String {
    self.id.to_string()
  }

  pub fn is_admin(&self) -> bool {
    self.role == Role::Admin
  }

  pub fn is_staff(&self) -> bool {
    self.role.is_staff()
  }

  pub fn require_role(&self, roles: &[Role]) -> Result<(), ApiError> {
    if roles.contains(&self.role) {
      Ok(())
    } else {
      Err(ApiError::forbidden("Insufficient permissions"))
    }
  }

  pub fn require_staff(&self) -> Result<(), ApiError> {
    self.require_role(&[Role::Admin, Role::Counsellor])
  }

  pub fn require_admin(&self) -> Result<(), ApiError> {
    self.require_role(&[Role::Admin])
  }

  /// Admins, or the user whose id is stored in `owner`.
  pub fn owns_or_admin(&self, owner: Option<&str>) -> bool {
    self.is_admin() || owner == Some(self.uid().as_str())
  }
}

async fn authenticate(parts: &Parts, state: &AppState) -> Result<AuthUser, ApiError> {
  let token = parts
    .headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(bearer_token)
    .ok_or_else(|| ApiError::unauthorized("No token provided"))?;

  let session = state
    .store
    .find_session(&hash_session_token(token))
    .await?
    .ok_or_else(|| ApiError::unauthorized("Invalid token"))?;

  if session.is_expired() {
    state.store.delete_session(session.id).await?;
    return Err(ApiError::unauthorized("Token expired"));
  }

  let doc = state
    .store
    .get(user::COLLECTION, session.user_id)
    .await?
    .ok_or_else(|| ApiError::unauthorized("Invalid token"))?;

  let role = doc
    .str_field("role")
    .and_then(Role::parse)
    .unwrap_or_default();

  Ok(AuthUser {
    id: doc.id,
    session_id: session.id,
    email: doc.str_field("email").unwrap_or_default().to_string(),
    name: doc.str_field("name").unwrap_or_default().to_string(),
    role,
    is_active: doc.bool_field("isActive").unwrap_or(true),
    doc,
  })
}

impl FromRequestParts<AppState> for AuthUser {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
    authenticate(parts, state).await
  }
}

/// An authenticated caller whose account has not been deactivated.
#[derive(Debug, Clone)]
pub struct ActiveUser(pub AuthUser);

impl Deref for ActiveUser {
  type Target = AuthUser;

  fn deref(&self) -> &AuthUser {
    &self.0
  }
}

impl FromRequestParts<AppState> for ActiveUser {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
    let user = authenticate(parts, state).await?;
    if !user.is_active {
      return Err(ApiError::forbidden("Account disabled"));
    }
    Ok(Self(user))
  }
}

/// Optional authentication. A missing, unknown or expired token, or a
/// disabled account, yields an anonymous caller. Store failures still fail
/// the request.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthUser>);

impl MaybeUser {
  pub fn uid(&self) -> Option<String> {
    self.0.as_ref().map(AuthUser::uid)
  }

  pub fn is_staff(&self) -> bool {
    self.0.as_ref().is_some_and(AuthUser::is_staff)
  }
}

impl FromRequestParts<AppState> for MaybeUser {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
    match authenticate(parts, state).await {
      Ok(user) if user.is_active => Ok(Self(Some(user))),
      Ok(_) | Err(ApiError::Unauthorized(_)) => Ok(Self(None)),
      Err(e) => Err(e),
    }
  }
}
