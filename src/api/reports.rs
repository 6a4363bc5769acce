//! Generated reports and the counsellor dashboard.
//!
//! Reports are snapshots: the section data is computed once at generation
//! time from the other collections and stored with the report.

use axum::{
  extract::{Path, State},
  response::Response,
  routing::{get, post},
  Router,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};

use super::extract::{ValidJson, ValidQuery};
use super::{listing, load, records, response, ActiveUser, ApiError, AppState, ListParams};
use crate::models::appointment::{self, AppointmentStatus};
use crate::models::journal::{self, JournalStatus, Mood};
use crate::models::question::{self, Category, QuestionStatus};
use crate::models::report::{
  GenerateReport, ReportFilters, ReportQuery, ReportSort, ReportType, COLLECTION,
};
use crate::models::resource::{self, ResourceCategory, ResourceType};
use crate::models::{timestamp, DateWindow, Priority};
use crate::types::{Document, FieldFilter, OrderDirection};

const NOT_FOUND: &str = "Report not found";
const DASHBOARD_DAYS: i64 = 30;

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/", get(list_reports))
    .route("/generate", post(generate_report))
    .route("/stats/dashboard", get(dashboard))
    .route("/{id}", get(get_report).delete(delete_report))
}

/// GET /reports
async fn list_reports(
  State(state): State<AppState>,
  user: ActiveUser,
  ValidQuery(q): ValidQuery<ReportQuery>,
) -> Result<Response, ApiError> {
  let mut filters = Vec::new();
  if let Some(kind) = q.kind {
    filters.push(FieldFilter::eq("type", kind.as_str()));
  }
  if let Some(generated_by) = &q.generated_by {
    filters.push(FieldFilter::eq("generatedBy", generated_by.as_str()));
  }
  if !user.is_admin() {
    filters.push(FieldFilter::eq("isPublic", true));
  } else if let Some(public) = q.is_public {
    filters.push(FieldFilter::eq("isPublic", public));
  }
  filters.extend(super::date_range("generatedAt", q.date_from, q.date_to));

  let items = records(&state, COLLECTION, &filters).await?;
  super::list_response(
    "Reports retrieved successfully",
    items,
    ListParams {
      search: None,
      search_fields: &[],
      sort_by: q.sort_by.unwrap_or(ReportSort::GeneratedAt).as_str(),
      order: q.sort_order.unwrap_or(OrderDirection::Desc),
      page: q.page,
      limit: q.limit,
    },
  )
}

fn can_read(user: &ActiveUser, doc: &Document) -> bool {
  doc.bool_field("isPublic") == Some(true) || user.owns_or_admin(doc.str_field("generatedBy"))
}

/// GET /reports/{id}
async fn get_report(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
) -> Result<Response, ApiError> {
  let doc = load(&state, COLLECTION, &id, NOT_FOUND).await?;
  if !can_read(&user, &doc) {
    return Err(ApiError::access_denied());
  }
  response::ok("Report retrieved successfully", doc.into_record())
}

/// DELETE /reports/{id}
async fn delete_report(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
) -> Result<Response, ApiError> {
  let doc = load(&state, COLLECTION, &id, NOT_FOUND).await?;
  if !user.owns_or_admin(doc.str_field("generatedBy")) {
    return Err(ApiError::access_denied());
  }
  state.store.delete(COLLECTION, doc.id).await?;
  tracing::info!(report_id = %doc.id, user_id = %user.id, "report deleted");
  super::deleted("Report deleted successfully", doc.id)
}

/// Which sections a report type covers.
fn sections(kind: ReportType) -> &'static [Section] {
  match kind {
    ReportType::Appointment => &[Section::Appointments],
    ReportType::Journal => &[Section::Journals],
    ReportType::Qa => &[Section::Qa],
    _ => &[
      Section::Appointments,
      Section::Journals,
      Section::Qa,
      Section::Resources,
    ],
  }
}

#[derive(Debug, Clone, Copy)]
enum Section {
  Appointments,
  Journals,
  Qa,
  Resources,
}

impl Section {
  fn key(self) -> &'static str {
    match self {
      Self::Appointments => "appointments",
      Self::Journals => "journals",
      Self::Qa => "qa",
      Self::Resources => "resources",
    }
  }

  fn collection(self) -> &'static str {
    match self {
      Self::Appointments => appointment::COLLECTION,
      Self::Journals => journal::COLLECTION,
      Self::Qa => question::COLLECTION,
      Self::Resources => resource::COLLECTION,
    }
  }

  /// Store filter contributed by the report's `filters` object. Each section
  /// narrows on its own key only; `status` and `priority` are recorded on the
  /// report but never applied, since their values differ per collection.
  fn narrow(self, filters: &ReportFilters) -> Option<FieldFilter> {
    let (field, value) = match self {
      Self::Appointments => ("counsellorId", filters.counsellor_id.as_deref()),
      Self::Journals => ("studentId", filters.student_id.as_deref()),
      Self::Qa | Self::Resources => ("category", filters.category.as_deref()),
    };
    value.map(|value| FieldFilter::eq(field, value))
  }

  fn summarize(self, items: &[Value], now: DateTime<Utc>) -> Value {
    let mut summary = match self {
      Self::Appointments => appointments_breakdown(items),
      Self::Journals => journals_breakdown(items),
      Self::Qa => qa_breakdown(items),
      Self::Resources => resources_breakdown(items),
    };
    summary["trends"] = json!(listing::trends(items, "createdAt", now));
    summary
  }
}

fn appointments_breakdown(items: &[Value]) -> Value {
  let status = |s: AppointmentStatus| listing::count_where(items, "status", &json!(s.as_str()));
  json!({
    "total": items.len(),
    "pending": status(AppointmentStatus::Pending),
    "approved": status(AppointmentStatus::Approved),
    "completed": status(AppointmentStatus::Completed),
    "cancelled": status(AppointmentStatus::Cancelled),
    "byStatus": listing::count_by(items, "status", AppointmentStatus::NAMES),
    "byPriority": listing::count_by(items, "priority", Priority::NAMES),
    "uniqueStudents": listing::distinct_count(items, "studentId"),
  })
}

fn journals_breakdown(items: &[Value]) -> Value {
  json!({
    "total": items.len(),
    "flagged": listing::count_where(items, "isFlagged", &json!(true)),
    "reviewed": listing::count_where(items, "status", &json!(JournalStatus::Reviewed.as_str())),
    "byStatus": listing::count_by(items, "status", JournalStatus::NAMES),
    "byMood": listing::count_by(items, "mood", Mood::NAMES),
    "byPriority": listing::count_by(items, "priority", Priority::NAMES),
  })
}

fn qa_breakdown(items: &[Value]) -> Value {
  let status = |s: QuestionStatus| listing::count_where(items, "status", &json!(s.as_str()));
  json!({
    "total": items.len(),
    "pending": status(QuestionStatus::Pending),
    "answered": status(QuestionStatus::Answered),
    "byCategory": listing::count_by(items, "category", Category::NAMES),
    "byPriority": listing::count_by(items, "priority", Priority::NAMES),
    "totalViews": listing::sum_field(items, "views"),
    "totalUpvotes": listing::sum_field(items, "upvotes"),
  })
}

fn resources_breakdown(items: &[Value]) -> Value {
  json!({
    "total": items.len(),
    "byCategory": listing::count_by(items, "category", ResourceCategory::NAMES),
    "byType": listing::count_by(items, "type", ResourceType::NAMES),
    "totalDownloads": listing::sum_field(items, "downloads"),
    "totalViews": listing::sum_field(items, "views"),
  })
}

/// POST /reports/generate
async fn generate_report(
  State(state): State<AppState>,
  user: ActiveUser,
  ValidJson(body): ValidJson<GenerateReport>,
) -> Result<Response, ApiError> {
  user.require_staff()?;

  let (start, end) = body.date_range.bounds();
  let mut data = Map::new();
  for section in sections(body.kind) {
    let mut filters = vec![
      FieldFilter::gte("createdAt", start.as_str()),
      FieldFilter::lte("createdAt", end.as_str()),
    ];
    filters.extend(section.narrow(&body.filters));
    let items = records(&state, section.collection(), &filters).await?;
    data.insert(
      section.key().to_string(),
      section.summarize(&items, body.date_range.end),
    );
  }

  let now = timestamp::now();
  let report = json!({
    "title": body.title,
    "type": body.kind,
    "dateRange": body.date_range,
    "filters": body.filters,
    "format": body.format,
    "includeCharts": body.include_charts,
    "isPublic": body.is_public,
    "data": data,
    "generatedBy": user.uid(),
    "generatedAt": now,
    "createdAt": now,
  });
  let doc = state.store.insert(COLLECTION, report).await?;
  tracing::info!(
    report_id = %doc.id,
    kind = %body.kind,
    user_id = %user.id,
    "report generated"
  );
  response::created("Report generated successfully", doc.into_record())
}

/// GET /reports/stats/dashboard
async fn dashboard(
  State(state): State<AppState>,
  user: ActiveUser,
  ValidQuery(window): ValidQuery<DateWindow>,
) -> Result<Response, ApiError> {
  user.require_staff()?;

  let now = Utc::now();
  let from = window
    .date_from
    .unwrap_or_else(|| now - Duration::days(DASHBOARD_DAYS));
  let to = window.date_to.unwrap_or(now);
  let range = super::date_range("createdAt", Some(from), Some(to));

  let mut appointment_filters = range.clone();
  if !user.is_admin() {
    appointment_filters.push(FieldFilter::eq("counsellorId", user.uid()));
  }
  let appointments = records(&state, appointment::COLLECTION, &appointment_filters).await?;
  let journals = records(&state, journal::COLLECTION, &range).await?;
  let questions = records(&state, question::COLLECTION, &range).await?;
  let resources = records(&state, resource::COLLECTION, &range).await?;

  let stats = json!({
    "overview": {
      "pendingAppointments": listing::count_where(
        &appointments,
        "status",
        &json!(AppointmentStatus::Pending.as_str()),
      ),
      "newQuestions": listing::count_where(
        &questions,
        "status",
        &json!(QuestionStatus::Pending.as_str()),
      ),
      "flaggedJournals": listing::count_where(&journals, "isFlagged", &json!(true)),
      "activeStudents": listing::distinct_count(&appointments, "studentId"),
    },
    "appointments": appointments_breakdown(&appointments),
    "journals": journals_breakdown(&journals),
    "qa": qa_breakdown(&questions),
    "resources": resources_breakdown(&resources),
    "trends": {
      "appointments": listing::trends(&appointments, "createdAt", to),
      "journals": listing::trends(&journals, "createdAt", to),
      "questions": listing::trends(&questions, "createdAt", to),
      "resources": listing::trends(&resources, "createdAt", to),
    },
    "dateRange": {
      "start": timestamp::format(from),
      "end": timestamp::format(to),
    },
  });
  response::ok("Dashboard statistics retrieved successfully", stats)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sections_by_type() {
    assert_eq!(sections(ReportType::Qa).len(), 1);
    assert_eq!(sections(ReportType::Appointment)[0].key(), "appointments");
    assert_eq!(sections(ReportType::Monthly).len(), 4);
    assert_eq!(sections(ReportType::Comprehensive).len(), 4);
  }

  #[test]
  fn test_narrow_uses_matching_filter() {
    let filters = ReportFilters {
      counsellor_id: Some("c-1".into()),
      student_id: Some("s-1".into()),
      category: Some("wellness".into()),
      status: Some("answered".into()),
      priority: Some(Priority::High),
    };
    let appointments = Section::Appointments.narrow(&filters).unwrap();
    assert_eq!(appointments.field, "counsellorId");
    assert_eq!(Section::Journals.narrow(&filters).unwrap().field, "studentId");
    assert_eq!(Section::Resources.narrow(&filters).unwrap().field, "category");

    let status_only = ReportFilters {
      status: Some("answered".into()),
      priority: Some(Priority::High),
      ..Default::default()
    };
    assert!(Section::Appointments.narrow(&status_only).is_none());
    assert!(Section::Qa.narrow(&status_only).is_none());
  }

  #[test]
  fn test_summary_carries_trends() {
    let now = timestamp::parse("2024-06-30T12:00:00Z").unwrap();
    let items = vec![json!({"createdAt": "2024-06-30T08:00:00.000Z", "isFlagged": true})];
    let summary = Section::Journals.summarize(&items, now);
    assert_eq!(summary["total"], json!(1));
    assert_eq!(summary["flagged"], json!(1));
    assert_eq!(
      summary["trends"].as_array().unwrap().len(),
      listing::TREND_DAYS as usize
    );
  }
}
