use axum::{
  extract::{Path, State},
  response::Response,
  routing::{get, patch},
  Router,
};
use chrono::{Datelike, TimeZone, Utc};
use serde_json::{json, Value};

use super::extract::{ValidJson, ValidQuery};
use super::{listing, load, records, response, ActiveUser, ApiError, AppState, ListParams};
use crate::models::user::{ProfileUpdate, RoleChange, UserQuery, UserSort, COLLECTION};
use crate::models::{timestamp, Role};
use crate::types::{Document, FieldFilter, OrderDirection};

const NOT_FOUND: &str = "User not found";

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/", get(list_users))
    .route("/stats/overview", get(user_stats))
    .route("/{id}", get(get_user).put(update_user).delete(delete_user))
    .route("/{id}/deactivate", patch(deactivate_user))
    .route("/{id}/activate", patch(activate_user))
    .route("/{id}/role", patch(change_role))
}

/// Applies a profile update to a loaded user document. Shared with `PUT /auth/me`.
pub(crate) async fn update_profile(
  state: &AppState,
  doc: &Document,
  body: ProfileUpdate,
) -> Result<Document, ApiError> {
  let current = doc.data.get("preferences").cloned().unwrap_or(Value::Null);
  let mut patch = body.into_patch(&current);
  patch["updatedAt"] = json!(timestamp::now());
  state
    .store
    .update(COLLECTION, doc.id, patch)
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))
}

/// Admins acting on their own account would lock themselves out.
fn reject_self(user: &ActiveUser, doc: &Document, message: &str) -> Result<(), ApiError> {
  if doc.id == user.id {
    return Err(ApiError::bad_request(message));
  }
  Ok(())
}

/// GET /users
async fn list_users(
  State(state): State<AppState>,
  user: ActiveUser,
  ValidQuery(q): ValidQuery<UserQuery>,
) -> Result<Response, ApiError> {
  user.require_admin()?;

  let mut filters = Vec::new();
  if let Some(role) = q.role {
    filters.push(FieldFilter::eq("role", role.as_str()));
  }
  if let Some(active) = q.is_active {
    filters.push(FieldFilter::eq("isActive", active));
  }

  let items = records(&state, COLLECTION, &filters)
    .await?
    .into_iter()
    .map(|mut item| {
      if let Some(map) = item.as_object_mut() {
        map.remove("preferences");
      }
      item
    })
    .collect();
  super::list_response(
    "Users retrieved successfully",
    items,
    ListParams {
      search: q.search.as_deref(),
      search_fields: &["name", "email", "title", "department"],
      sort_by: q.sort_by.unwrap_or(UserSort::CreatedAt).as_str(),
      order: q.sort_order.unwrap_or(OrderDirection::Desc),
      page: q.page,
      limit: q.limit,
    },
  )
}

/// GET /users/{id}
async fn get_user(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
) -> Result<Response, ApiError> {
  let doc = load(&state, COLLECTION, &id, NOT_FOUND).await?;
  if !user.is_admin() && doc.id != user.id {
    return Err(ApiError::access_denied());
  }
  response::ok("User retrieved successfully", doc.into_record())
}

/// PUT /users/{id}
async fn update_user(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
  ValidJson(body): ValidJson<ProfileUpdate>,
) -> Result<Response, ApiError> {
  let doc = load(&state, COLLECTION, &id, NOT_FOUND).await?;
  if !user.is_admin() && doc.id != user.id {
    return Err(ApiError::access_denied());
  }
  let updated = update_profile(&state, &doc, body).await?;
  tracing::info!(target_user = %doc.id, user_id = %user.id, "user profile updated");
  response::ok("User updated successfully", updated.into_record())
}

async fn set_active(
  state: &AppState,
  doc: &Document,
  active: bool,
) -> Result<Document, ApiError> {
  let patch = json!({"isActive": active, "updatedAt": timestamp::now()});
  state
    .store
    .update(COLLECTION, doc.id, patch)
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))
}

/// PATCH /users/{id}/deactivate
async fn deactivate_user(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
) -> Result<Response, ApiError> {
  user.require_admin()?;
  let doc = load(&state, COLLECTION, &id, NOT_FOUND).await?;
  reject_self(&user, &doc, "Cannot deactivate your own account")?;

  let updated = set_active(&state, &doc, false).await?;
  let revoked = state.store.delete_user_sessions(doc.id).await?;
  tracing::info!(target_user = %doc.id, revoked, user_id = %user.id, "user deactivated");
  response::ok("User deactivated successfully", updated.into_record())
}

/// PATCH /users/{id}/activate
async fn activate_user(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
) -> Result<Response, ApiError> {
  user.require_admin()?;
  let doc = load(&state, COLLECTION, &id, NOT_FOUND).await?;
  let updated = set_active(&state, &doc, true).await?;
  tracing::info!(target_user = %doc.id, user_id = %user.id, "user activated");
  response::ok("User activated successfully", updated.into_record())
}

/// PATCH /users/{id}/role
async fn change_role(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
  ValidJson(body): ValidJson<RoleChange>,
) -> Result<Response, ApiError> {
  user.require_admin()?;
  let doc = load(&state, COLLECTION, &id, NOT_FOUND).await?;
  reject_self(&user, &doc, "Cannot change your own role")?;

  let patch = json!({"role": body.role, "updatedAt": timestamp::now()});
  let updated = state
    .store
    .update(COLLECTION, doc.id, patch)
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
  tracing::info!(target_user = %doc.id, role = %body.role, user_id = %user.id, "user role changed");
  response::ok("User role updated successfully", updated.into_record())
}

/// DELETE /users/{id}
async fn delete_user(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
) -> Result<Response, ApiError> {
  user.require_admin()?;
  let doc = load(&state, COLLECTION, &id, NOT_FOUND).await?;
  reject_self(&user, &doc, "Cannot delete your own account")?;

  state.store.delete_user_sessions(doc.id).await?;
  state.store.delete_credential(doc.id).await?;
  state.store.delete(COLLECTION, doc.id).await?;
  tracing::info!(target_user = %doc.id, user_id = %user.id, "user deleted");
  super::deleted("User deleted successfully", doc.id)
}

/// GET /users/stats/overview
async fn user_stats(State(state): State<AppState>, user: ActiveUser) -> Result<Response, ApiError> {
  user.require_admin()?;
  let items = records(&state, COLLECTION, &[]).await?;

  let now = Utc::now();
  let month_start = Utc
    .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
    .single()
    .unwrap_or(now);
  let cutoff = timestamp::format(month_start);
  let new_this_month = items
    .iter()
    .filter_map(|item| listing::lookup(item, "createdAt"))
    .filter_map(Value::as_str)
    .filter(|ts| *ts >= cutoff.as_str())
    .count();

  let active = listing::count_where(&items, "isActive", &json!(true));
  let stats = json!({
    "total": items.len(),
    "active": active,
    "inactive": items.len() - active,
    "byRole": listing::count_by(&items, "role", Role::NAMES),
    "newThisMonth": new_this_month,
    "withRecentActivity": listing::count_since(&items, "lastLogin", 7, now),
  });
  response::ok("User statistics retrieved successfully", stats)
}
