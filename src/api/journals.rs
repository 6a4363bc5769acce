use axum::{
  extract::{Path, State},
  response::Response,
  routing::{get, patch},
  Router,
};
use chrono::Utc;
use serde_json::json;

use super::extract::{ValidJson, ValidQuery};
use super::{listing, load, records, response, ActiveUser, ApiError, AppState, ListParams};
use crate::models::journal::{
  FlagJournal, Journal, JournalQuery, JournalSort, JournalStatus, JournalUpdate, Mood, NewJournal,
  ReviewJournal, COLLECTION,
};
use crate::models::{timestamp, DateWindow, Priority, Role};
use crate::types::{Document, FieldFilter, OrderDirection};
use crate::validation::FieldError;

const NOT_FOUND: &str = "Journal not found";
const DEFAULT_FLAG_REASON: &str = "Flagged for review";

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/", get(list_journals).post(create_journal))
    .route("/stats/overview", get(journal_stats))
    .route(
      "/{id}",
      get(get_journal).put(update_journal).delete(delete_journal),
    )
    .route("/{id}/flag", patch(flag_journal))
    .route("/{id}/review", patch(review_journal))
}

fn scope(user: &ActiveUser, filters: &mut Vec<FieldFilter>) {
  if user.role == Role::Student {
    filters.push(FieldFilter::eq("studentId", user.uid()));
  }
}

async fn load_readable(
  state: &AppState,
  user: &ActiveUser,
  id: &str,
) -> Result<Document, ApiError> {
  let doc = load(state, COLLECTION, id, NOT_FOUND).await?;
  if !user.is_staff() && doc.str_field("studentId") != Some(user.uid().as_str()) {
    return Err(ApiError::access_denied());
  }
  Ok(doc)
}

async fn load_owned(state: &AppState, user: &ActiveUser, id: &str) -> Result<Document, ApiError> {
  let doc = load(state, COLLECTION, id, NOT_FOUND).await?;
  if !user.owns_or_admin(doc.str_field("createdBy")) {
    return Err(ApiError::access_denied());
  }
  Ok(doc)
}

/// GET /journals
async fn list_journals(
  State(state): State<AppState>,
  user: ActiveUser,
  ValidQuery(q): ValidQuery<JournalQuery>,
) -> Result<Response, ApiError> {
  let mut filters = Vec::new();
  if let Some(student_id) = &q.student_id {
    filters.push(FieldFilter::eq("studentId", student_id.as_str()));
  }
  if let Some(status) = q.status {
    filters.push(FieldFilter::eq("status", status.as_str()));
  }
  if let Some(priority) = q.priority {
    filters.push(FieldFilter::eq("priority", priority.as_str()));
  }
  if let Some(mood) = q.mood {
    filters.push(FieldFilter::eq("mood", mood.as_str()));
  }
  if let Some(flagged) = q.is_flagged {
    filters.push(FieldFilter::eq("isFlagged", flagged));
  }
  filters.extend(super::date_range("createdAt", q.date_from, q.date_to));
  scope(&user, &mut filters);

  let items = records(&state, COLLECTION, &filters).await?;
  super::list_response(
    "Journals retrieved successfully",
    items,
    ListParams {
      search: q.search.as_deref(),
      search_fields: &["title", "content", "tags"],
      sort_by: q.sort_by.unwrap_or(JournalSort::CreatedAt).as_str(),
      order: q.sort_order.unwrap_or(OrderDirection::Desc),
      page: q.page,
      limit: q.limit,
    },
  )
}

/// GET /journals/{id}
async fn get_journal(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
) -> Result<Response, ApiError> {
  let doc = load_readable(&state, &user, &id).await?;
  response::ok("Journal retrieved successfully", doc.into_record())
}

/// POST /journals
async fn create_journal(
  State(state): State<AppState>,
  user: ActiveUser,
  ValidJson(body): ValidJson<NewJournal>,
) -> Result<Response, ApiError> {
  let (student_id, student_name) = if user.is_staff() {
    let student_id = body.student_id.ok_or_else(|| {
      ApiError::Validation(vec![FieldError::new(
        "studentId",
        "\"studentId\" is required",
      )])
    })?;
    (student_id, body.student_name.unwrap_or_default())
  } else {
    (user.uid(), user.name.clone())
  };

  let now = timestamp::now();
  let journal = Journal {
    student_id,
    student_name,
    title: body.title,
    content: body.content,
    mood: body.mood,
    tags: body.tags.unwrap_or_default(),
    is_flagged: false,
    priority: body.priority.unwrap_or_default(),
    status: JournalStatus::Pending,
    created_by: user.uid(),
    created_at: now.clone(),
    updated_at: now,
  };

  let doc = state
    .store
    .insert(COLLECTION, serde_json::to_value(&journal)?)
    .await?;
  tracing::info!(journal_id = %doc.id, user_id = %user.id, "journal created");
  response::created("Journal created successfully", doc.into_record())
}

/// PUT /journals/{id}
async fn update_journal(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
  ValidJson(body): ValidJson<JournalUpdate>,
) -> Result<Response, ApiError> {
  let doc = load_owned(&state, &user, &id).await?;
  let mut patch = serde_json::to_value(&body)?;
  patch["updatedAt"] = json!(timestamp::now());
  let updated = state
    .store
    .update(COLLECTION, doc.id, patch)
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
  tracing::info!(journal_id = %doc.id, user_id = %user.id, "journal updated");
  response::ok("Journal updated successfully", updated.into_record())
}

/// DELETE /journals/{id}
async fn delete_journal(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
) -> Result<Response, ApiError> {
  let doc = load_owned(&state, &user, &id).await?;
  state.store.delete(COLLECTION, doc.id).await?;
  tracing::info!(journal_id = %doc.id, user_id = %user.id, "journal deleted");
  super::deleted("Journal deleted successfully", doc.id)
}

/// PATCH /journals/{id}/flag
async fn flag_journal(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
  ValidJson(body): ValidJson<FlagJournal>,
) -> Result<Response, ApiError> {
  user.require_staff()?;
  let doc = load(&state, COLLECTION, &id, NOT_FOUND).await?;

  let patch = json!({
    "isFlagged": true,
    "flagReason": body.flag_reason.as_deref().unwrap_or(DEFAULT_FLAG_REASON),
    "priority": body.priority.unwrap_or_default(),
    "status": JournalStatus::Flagged,
    "flaggedBy": user.uid(),
    "flaggedAt": timestamp::now(),
    "updatedAt": timestamp::now(),
  });
  let updated = state
    .store
    .update(COLLECTION, doc.id, patch)
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
  tracing::info!(journal_id = %doc.id, user_id = %user.id, "journal flagged");
  response::ok("Journal flagged successfully", updated.into_record())
}

/// PATCH /journals/{id}/review
async fn review_journal(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
  ValidJson(body): ValidJson<ReviewJournal>,
) -> Result<Response, ApiError> {
  user.require_staff()?;
  let doc = load(&state, COLLECTION, &id, NOT_FOUND).await?;

  let now = timestamp::now();
  let mut patch = json!({
    "status": body.status.unwrap_or(JournalStatus::Reviewed),
    "isFlagged": false,
    "reviewedBy": user.uid(),
    "reviewedAt": now,
    "updatedAt": now,
  });
  if let Some(notes) = body.counsellor_notes {
    patch["counsellorNotes"] = json!(notes);
  }
  let updated = state
    .store
    .update(COLLECTION, doc.id, patch)
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
  tracing::info!(journal_id = %doc.id, user_id = %user.id, "journal reviewed");
  response::ok("Journal reviewed successfully", updated.into_record())
}

/// GET /journals/stats/overview
async fn journal_stats(
  State(state): State<AppState>,
  user: ActiveUser,
  ValidQuery(window): ValidQuery<DateWindow>,
) -> Result<Response, ApiError> {
  let mut filters = super::date_range("createdAt", window.date_from, window.date_to);
  scope(&user, &mut filters);
  let items = records(&state, COLLECTION, &filters).await?;

  let status = |s: JournalStatus| listing::count_where(&items, "status", &json!(s.as_str()));
  let stats = json!({
    "total": items.len(),
    "flagged": listing::count_where(&items, "isFlagged", &json!(true)),
    "reviewed": status(JournalStatus::Reviewed),
    "pending": status(JournalStatus::Pending),
    "byMood": listing::count_by(&items, "mood", Mood::NAMES),
    "byPriority": listing::count_by(&items, "priority", Priority::NAMES),
    "thisWeek": listing::count_since(&items, "createdAt", 7, Utc::now()),
  });
  response::ok("Journal statistics retrieved successfully", stats)
}
