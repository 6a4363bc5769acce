use axum::{
  extract::{Path, State},
  response::Response,
  routing::{get, patch, post},
  Router,
};
use chrono::Utc;
use serde_json::json;

use super::extract::{ValidJson, ValidQuery};
use super::{
  listing, load, records, response, ActiveUser, ApiError, AppState, ListParams, MaybeUser,
};
use crate::models::question::{
  Answer, Category, FlagQuestion, NewQuestion, Question, QuestionQuery, QuestionSort,
  QuestionStatus, QuestionUpdate, Vote, VoteType, COLLECTION,
};
use crate::models::{timestamp, DateWindow, Priority};
use crate::types::{Document, FieldFilter, OrderDirection};

const NOT_FOUND: &str = "Question not found";

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/", get(list_questions).post(create_question))
    .route("/stats/overview", get(question_stats))
    .route(
      "/{id}",
      get(get_question)
        .put(update_question)
        .delete(delete_question),
    )
    .route("/{id}/answer", post(answer_question))
    .route("/{id}/flag", patch(flag_question))
    .route("/{id}/vote", post(vote_question))
}

/// Questions are editable by admins and the student who asked.
async fn load_owned(state: &AppState, user: &ActiveUser, id: &str) -> Result<Document, ApiError> {
  let doc = load(state, COLLECTION, id, NOT_FOUND).await?;
  if !user.owns_or_admin(doc.str_field("studentId")) {
    return Err(ApiError::access_denied());
  }
  Ok(doc)
}

/// GET /qna
async fn list_questions(
  State(state): State<AppState>,
  ValidQuery(q): ValidQuery<QuestionQuery>,
) -> Result<Response, ApiError> {
  let mut filters = Vec::new();
  if let Some(category) = q.category {
    filters.push(FieldFilter::eq("category", category.as_str()));
  }
  if let Some(status) = q.status {
    filters.push(FieldFilter::eq("status", status.as_str()));
  }
  if let Some(priority) = q.priority {
    filters.push(FieldFilter::eq("priority", priority.as_str()));
  }
  if let Some(answered_by) = &q.answered_by {
    filters.push(FieldFilter::eq("answeredBy", answered_by.as_str()));
  }
  filters.extend(super::date_range("createdAt", q.date_from, q.date_to));

  let items = records(&state, COLLECTION, &filters).await?;
  super::list_response(
    "Questions retrieved successfully",
    items,
    ListParams {
      search: q.search.as_deref(),
      search_fields: &["question", "response"],
      sort_by: q.sort_by.unwrap_or(QuestionSort::CreatedAt).as_str(),
      order: q.sort_order.unwrap_or(OrderDirection::Desc),
      page: q.page,
      limit: q.limit,
    },
  )
}

/// GET /qna/{id}
async fn get_question(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<Response, ApiError> {
  let id = super::parse_id(&id, NOT_FOUND)?;
  let doc = super::bump(&state, COLLECTION, id, "views")
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
  response::ok("Question retrieved successfully", doc.into_record())
}

/// POST /qna
async fn create_question(
  State(state): State<AppState>,
  caller: MaybeUser,
  ValidJson(body): ValidJson<NewQuestion>,
) -> Result<Response, ApiError> {
  let now = timestamp::now();
  let question = Question {
    question: body.question,
    category: body.category,
    priority: body.priority.unwrap_or_default(),
    status: QuestionStatus::Pending,
    is_anonymous: body.is_anonymous.unwrap_or(true),
    student_id: caller.uid(),
    tags: body.tags.unwrap_or_default(),
    upvotes: 0,
    downvotes: 0,
    views: 0,
    created_at: now.clone(),
    updated_at: now,
  };

  let doc = state
    .store
    .insert(COLLECTION, serde_json::to_value(&question)?)
    .await?;
  tracing::info!(question_id = %doc.id, anonymous = caller.0.is_none(), "question submitted");
  response::created("Question submitted successfully", doc.into_record())
}

/// PUT /qna/{id}
async fn update_question(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
  ValidJson(body): ValidJson<QuestionUpdate>,
) -> Result<Response, ApiError> {
  let doc = load_owned(&state, &user, &id).await?;
  let mut patch = serde_json::to_value(&body)?;
  patch["updatedAt"] = json!(timestamp::now());
  let updated = state
    .store
    .update(COLLECTION, doc.id, patch)
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
  tracing::info!(question_id = %doc.id, user_id = %user.id, "question updated");
  response::ok("Question updated successfully", updated.into_record())
}

/// DELETE /qna/{id}
async fn delete_question(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
) -> Result<Response, ApiError> {
  let doc = load_owned(&state, &user, &id).await?;
  state.store.delete(COLLECTION, doc.id).await?;
  tracing::info!(question_id = %doc.id, user_id = %user.id, "question deleted");
  super::deleted("Question deleted successfully", doc.id)
}

/// POST /qna/{id}/answer
async fn answer_question(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
  ValidJson(body): ValidJson<Answer>,
) -> Result<Response, ApiError> {
  user.require_staff()?;
  let doc = load(&state, COLLECTION, &id, NOT_FOUND).await?;

  let now = timestamp::now();
  let mut patch = json!({
    "response": body.response,
    "status": QuestionStatus::Answered,
    "answeredBy": user.uid(),
    "answeredAt": now,
    "isPublic": body.is_public,
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
  tracing::info!(question_id = %doc.id, user_id = %user.id, "question answered");
  response::ok("Question answered successfully", updated.into_record())
}

/// PATCH /qna/{id}/flag
async fn flag_question(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
  ValidJson(body): ValidJson<FlagQuestion>,
) -> Result<Response, ApiError> {
  user.require_staff()?;
  let doc = load(&state, COLLECTION, &id, NOT_FOUND).await?;

  let mut patch = json!({
    "status": QuestionStatus::Flagged,
    "updatedAt": timestamp::now(),
  });
  if let Some(reason) = body.reason {
    patch["flagReason"] = json!(reason);
  }
  let updated = state
    .store
    .update(COLLECTION, doc.id, patch)
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
  tracing::info!(question_id = %doc.id, user_id = %user.id, "question flagged");
  response::ok("Question flagged successfully", updated.into_record())
}

/// POST /qna/{id}/vote
async fn vote_question(
  State(state): State<AppState>,
  Path(id): Path<String>,
  ValidJson(body): ValidJson<Vote>,
) -> Result<Response, ApiError> {
  let vote = VoteType::parse(&body.vote_type)
    .ok_or_else(|| ApiError::bad_request("Invalid vote type"))?;
  let id = super::parse_id(&id, NOT_FOUND)?;
  let doc = super::bump(&state, COLLECTION, id, vote.field())
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
  tracing::debug!(question_id = %id, vote = %vote, "vote recorded");
  response::ok("Vote recorded successfully", doc.into_record())
}

/// GET /qna/stats/overview
async fn question_stats(
  State(state): State<AppState>,
  _user: ActiveUser,
  ValidQuery(window): ValidQuery<DateWindow>,
) -> Result<Response, ApiError> {
  let filters = super::date_range("createdAt", window.date_from, window.date_to);
  let items = records(&state, COLLECTION, &filters).await?;

  let status = |s: QuestionStatus| listing::count_where(&items, "status", &json!(s.as_str()));
  let stats = json!({
    "total": items.len(),
    "pending": status(QuestionStatus::Pending),
    "answered": status(QuestionStatus::Answered),
    "flagged": status(QuestionStatus::Flagged),
    "byCategory": listing::count_by(&items, "category", Category::NAMES),
    "byPriority": listing::count_by(&items, "priority", Priority::NAMES),
    "totalViews": listing::sum_field(&items, "views"),
    "totalUpvotes": listing::sum_field(&items, "upvotes"),
    "thisWeek": listing::count_since(&items, "createdAt", 7, Utc::now()),
  });
  response::ok("Question statistics retrieved successfully", stats)
}
