use axum::{
  extract::{Path, State},
  response::Response,
  routing::{get, patch},
  Router,
};
use chrono::Utc;
use serde_json::{json, Value};

use super::extract::{ValidJson, ValidQuery};
use super::{listing, load, records, response, ActiveUser, ApiError, AppState, ListParams};
use crate::models::appointment::{
  Appointment, AppointmentQuery, AppointmentSort, AppointmentStatus, AppointmentUpdate,
  NewAppointment, StatusChange, COLLECTION,
};
use crate::models::{timestamp, user, DateWindow, Priority, Role};
use crate::types::{Document, FieldFilter};
use crate::validation::FieldError;

const NOT_FOUND: &str = "Appointment not found";
const DEFAULT_DURATION: u32 = 60;

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/", get(list_appointments).post(create_appointment))
    .route("/stats/overview", get(appointment_stats))
    .route(
      "/{id}",
      get(get_appointment)
        .put(update_appointment)
        .delete(delete_appointment),
    )
    .route("/{id}/status", patch(update_status))
}

/// Non-admins only ever see appointments they take part in.
fn scope(user: &ActiveUser, filters: &mut Vec<FieldFilter>) {
  match user.role {
    Role::Admin => {}
    Role::Counsellor => filters.push(FieldFilter::eq("counsellorId", user.uid())),
    Role::Student => filters.push(FieldFilter::eq("studentId", user.uid())),
  }
}

fn can_access(user: &ActiveUser, doc: &Document) -> bool {
  let uid = user.uid();
  user.is_admin()
    || doc.str_field("counsellorId") == Some(uid.as_str())
    || doc.str_field("studentId") == Some(uid.as_str())
}

async fn load_accessible(
  state: &AppState,
  user: &ActiveUser,
  id: &str,
) -> Result<Document, ApiError> {
  let doc = load(state, COLLECTION, id, NOT_FOUND).await?;
  if !can_access(user, &doc) {
    return Err(ApiError::access_denied());
  }
  Ok(doc)
}

/// GET /appointments
async fn list_appointments(
  State(state): State<AppState>,
  user: ActiveUser,
  ValidQuery(q): ValidQuery<AppointmentQuery>,
) -> Result<Response, ApiError> {
  let mut filters = Vec::new();
  if let Some(status) = q.status {
    filters.push(FieldFilter::eq("status", status.as_str()));
  }
  if let Some(priority) = q.priority {
    filters.push(FieldFilter::eq("priority", priority.as_str()));
  }
  if let Some(counsellor_id) = &q.counsellor_id {
    filters.push(FieldFilter::eq("counsellorId", counsellor_id.as_str()));
  }
  if let Some(student_id) = &q.student_id {
    filters.push(FieldFilter::eq("studentId", student_id.as_str()));
  }
  filters.extend(super::date_range("date", q.date_from, q.date_to));
  scope(&user, &mut filters);

  let items = records(&state, COLLECTION, &filters).await?;
  super::list_response(
    "Appointments retrieved successfully",
    items,
    ListParams {
      search: None,
      search_fields: &[],
      sort_by: q.sort_by.unwrap_or(AppointmentSort::Date).as_str(),
      order: q.sort_order.unwrap_or_default(),
      page: q.page,
      limit: q.limit,
    },
  )
}

/// GET /appointments/{id}
async fn get_appointment(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
) -> Result<Response, ApiError> {
  let doc = load_accessible(&state, &user, &id).await?;
  response::ok("Appointment retrieved successfully", doc.into_record())
}

/// Display name of a staff account, or a validation error naming `counsellorId`.
async fn counsellor_name(state: &AppState, counsellor_id: &str) -> Result<String, ApiError> {
  let invalid = || {
    ApiError::Validation(vec![FieldError::new(
      "counsellorId",
      "\"counsellorId\" must reference a counsellor",
    )
    .with_value(counsellor_id)])
  };
  let id = counsellor_id.parse().map_err(|_| invalid())?;
  let doc = state
    .store
    .get(user::COLLECTION, id)
    .await?
    .ok_or_else(invalid)?;
  let is_staff = doc
    .str_field("role")
    .and_then(Role::parse)
    .unwrap_or_default()
    .is_staff();
  if !is_staff {
    return Err(invalid());
  }
  Ok(doc.str_field("name").unwrap_or_default().to_string())
}

fn required(field: &str) -> FieldError {
  FieldError::new(field, format!("\"{}\" is required", field))
}

/// POST /appointments
async fn create_appointment(
  State(state): State<AppState>,
  user: ActiveUser,
  ValidJson(body): ValidJson<NewAppointment>,
) -> Result<Response, ApiError> {
  if body.status.is_some() && !user.is_staff() {
    return Err(ApiError::forbidden("Insufficient permissions"));
  }
  let (student_id, student_name, counsellor_id, counsellor_name) = if user.is_staff() {
    let mut missing = Vec::new();
    if body.student_id.is_none() {
      missing.push(required("studentId"));
    }
    if body.student_name.is_none() {
      missing.push(required("studentName"));
    }
    if !missing.is_empty() {
      return Err(ApiError::Validation(missing));
    }
    (
      body.student_id.unwrap_or_default(),
      body.student_name.unwrap_or_default(),
      user.uid(),
      user.name.clone(),
    )
  } else {
    let counsellor_id = body
      .counsellor_id
      .ok_or_else(|| ApiError::Validation(vec![required("counsellorId")]))?;
    let counsellor_name = match body.counsellor_name {
      Some(name) => name,
      None => counsellor_name(&state, &counsellor_id).await?,
    };
    (user.uid(), user.name.clone(), counsellor_id, counsellor_name)
  };

  let now = timestamp::now();
  let appointment = Appointment {
    student_id,
    student_name,
    counsellor_id,
    counsellor_name,
    date: body.date,
    time: body.time,
    duration: body.duration.unwrap_or(DEFAULT_DURATION),
    reason: body.reason,
    status: body.status.unwrap_or_default(),
    priority: body.priority.unwrap_or_default(),
    notes: body.notes,
    location: body.location,
    meeting_link: body.meeting_link,
    created_by: user.uid(),
    updated_by: user.uid(),
    created_at: now.clone(),
    updated_at: now,
  };

  let doc = state
    .store
    .insert(COLLECTION, serde_json::to_value(&appointment)?)
    .await?;
  tracing::info!(appointment_id = %doc.id, user_id = %user.id, "appointment created");
  response::created("Appointment created successfully", doc.into_record())
}

fn stamp(patch: &mut Value, user: &ActiveUser) {
  patch["updatedBy"] = json!(user.uid());
  patch["updatedAt"] = json!(timestamp::now());
}

/// PUT /appointments/{id}
async fn update_appointment(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
  ValidJson(body): ValidJson<AppointmentUpdate>,
) -> Result<Response, ApiError> {
  let doc = load_accessible(&state, &user, &id).await?;
  if body.status.is_some() && !user.is_staff() {
    return Err(ApiError::forbidden("Insufficient permissions"));
  }

  let mut patch = serde_json::to_value(&body)?;
  stamp(&mut patch, &user);
  let updated = state
    .store
    .update(COLLECTION, doc.id, patch)
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
  tracing::info!(appointment_id = %doc.id, user_id = %user.id, "appointment updated");
  response::ok("Appointment updated successfully", updated.into_record())
}

/// DELETE /appointments/{id}
async fn delete_appointment(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
) -> Result<Response, ApiError> {
  let doc = load_accessible(&state, &user, &id).await?;
  state.store.delete(COLLECTION, doc.id).await?;
  tracing::info!(appointment_id = %doc.id, user_id = %user.id, "appointment deleted");
  super::deleted("Appointment deleted successfully", doc.id)
}

/// PATCH /appointments/{id}/status
async fn update_status(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
  ValidJson(body): ValidJson<StatusChange>,
) -> Result<Response, ApiError> {
  user.require_staff()?;
  let doc = load_accessible(&state, &user, &id).await?;

  let mut patch = json!({ "status": body.status });
  if let Some(notes) = body.notes {
    patch["notes"] = json!(notes);
  }
  stamp(&mut patch, &user);
  let updated = state
    .store
    .update(COLLECTION, doc.id, patch)
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
  tracing::info!(
    appointment_id = %doc.id,
    status = %body.status,
    user_id = %user.id,
    "appointment status changed"
  );
  response::ok(
    "Appointment status updated successfully",
    updated.into_record(),
  )
}

/// GET /appointments/stats/overview
async fn appointment_stats(
  State(state): State<AppState>,
  user: ActiveUser,
  ValidQuery(window): ValidQuery<DateWindow>,
) -> Result<Response, ApiError> {
  let mut filters = super::date_range("date", window.date_from, window.date_to);
  scope(&user, &mut filters);
  let items = records(&state, COLLECTION, &filters).await?;

  let status = |s: AppointmentStatus| listing::count_where(&items, "status", &json!(s.as_str()));
  let stats = json!({
    "total": items.len(),
    "pending": status(AppointmentStatus::Pending),
    "approved": status(AppointmentStatus::Approved),
    "completed": status(AppointmentStatus::Completed),
    "cancelled": status(AppointmentStatus::Cancelled),
    "byStatus": listing::count_by(&items, "status", AppointmentStatus::NAMES),
    "byPriority": listing::count_by(&items, "priority", Priority::NAMES),
    "thisWeek": listing::count_since(&items, "createdAt", 7, Utc::now()),
  });
  response::ok("Appointment statistics retrieved successfully", stats)
}
