use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{check_paging, timestamp, Priority};
use crate::types::OrderDirection;
use crate::validation::{FieldError, Validate, Validator};

pub const COLLECTION: &str = "appointments";

string_enum! {
  AppointmentStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Rescheduled => "rescheduled",
    Completed => "completed",
    Cancelled => "cancelled",
  }
}

impl Default for AppointmentStatus {
  fn default() -> Self {
    Self::Pending
  }
}

string_enum! {
  AppointmentSort {
    Date => "date",
    CreatedAt => "createdAt",
    Priority => "priority",
    Status => "status",
  }
}

/// Body of `POST /appointments`. Staff callers book for a student; students
/// book with a named counsellor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewAppointment {
  pub student_id: Option<String>,
  pub student_name: Option<String>,
  pub counsellor_id: Option<String>,
  pub counsellor_name: Option<String>,
  #[serde(with = "timestamp")]
  pub date: DateTime<Utc>,
  pub time: String,
  pub duration: Option<u32>,
  pub reason: String,
  pub status: Option<AppointmentStatus>,
  pub priority: Option<Priority>,
  pub notes: Option<String>,
  pub location: Option<String>,
  pub meeting_link: Option<String>,
}

impl Validate for NewAppointment {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    let mut v = Validator::new();
    v.opt_length("studentName", self.student_name.as_deref(), 2, 100)
      .opt_length("counsellorName", self.counsellor_name.as_deref(), 2, 100)
      .time_of_day("time", Some(&self.time))
      .opt_range("duration", self.duration, 15, 120)
      .length("reason", &self.reason, 10, 500)
      .opt_length("notes", self.notes.as_deref(), 0, 1000)
      .opt_length("location", self.location.as_deref(), 0, 200)
      .uri("meetingLink", self.meeting_link.as_deref());
    v.finish()
  }
}

/// Stored shape of an appointment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
  pub student_id: String,
  pub student_name: String,
  pub counsellor_id: String,
  pub counsellor_name: String,
  #[serde(with = "timestamp")]
  pub date: DateTime<Utc>,
  pub time: String,
  pub duration: u32,
  pub reason: String,
  pub status: AppointmentStatus,
  pub priority: Priority,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub meeting_link: Option<String>,
  pub created_by: String,
  pub updated_by: String,
  pub created_at: String,
  pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AppointmentUpdate {
  #[serde(
    default,
    with = "timestamp::option",
    skip_serializing_if = "Option::is_none"
  )]
  pub date: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub time: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<AppointmentStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub meeting_link: Option<String>,
}

impl Validate for AppointmentUpdate {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    let mut v = Validator::new();
    v.time_of_day("time", self.time.as_deref())
      .opt_range("duration", self.duration, 15, 120)
      .opt_length("reason", self.reason.as_deref(), 10, 500)
      .opt_length("notes", self.notes.as_deref(), 0, 1000)
      .opt_length("location", self.location.as_deref(), 0, 200)
      .uri("meetingLink", self.meeting_link.as_deref());
    v.finish()
  }
}

/// Body of `PATCH /appointments/{id}/status`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StatusChange {
  pub status: AppointmentStatus,
  pub notes: Option<String>,
}

impl Validate for StatusChange {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    Validator::new()
      .opt_length("notes", self.notes.as_deref(), 0, 1000)
      .finish()
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AppointmentQuery {
  pub status: Option<AppointmentStatus>,
  pub priority: Option<Priority>,
  pub counsellor_id: Option<String>,
  pub student_id: Option<String>,
  #[serde(default, with = "timestamp::option")]
  pub date_from: Option<DateTime<Utc>>,
  #[serde(default, with = "timestamp::option")]
  pub date_to: Option<DateTime<Utc>>,
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub sort_by: Option<AppointmentSort>,
  pub sort_order: Option<OrderDirection>,
}

impl Validate for AppointmentQuery {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    let mut v = Validator::new();
    check_paging(&mut v, self.page, self.limit);
    v.finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn body() -> serde_json::Value {
    json!({
      "studentId": "s-1",
      "studentName": "Jamie Doe",
      "date": "2024-06-01",
      "time": "14:30",
      "reason": "Exam stress and trouble sleeping"
    })
  }

  #[test]
  fn test_new_appointment_accepts_minimal_body() {
    let apt: NewAppointment = serde_json::from_value(body()).unwrap();
    assert!(apt.validate().is_ok());
    assert_eq!(timestamp::format(apt.date), "2024-06-01T00:00:00.000Z");
  }

  #[test]
  fn test_new_appointment_rejects_bad_fields() {
    let mut raw = body();
    raw["time"] = json!("25:00");
    raw["duration"] = json!(5);
    raw["reason"] = json!("short");
    let apt: NewAppointment = serde_json::from_value(raw).unwrap();
    let fields: Vec<_> = apt
      .validate()
      .unwrap_err()
      .into_iter()
      .map(|e| e.field)
      .collect();
    assert_eq!(fields, vec!["time", "duration", "reason"]);
  }

  #[test]
  fn test_unknown_status_is_rejected_by_serde() {
    let mut raw = body();
    raw["status"] = json!("maybe");
    assert!(serde_json::from_value::<NewAppointment>(raw).is_err());
  }

  #[test]
  fn test_update_serializes_only_present_fields() {
    let update: AppointmentUpdate =
      serde_json::from_value(json!({"status": "approved", "notes": "Room 4"})).unwrap();
    assert_eq!(
      serde_json::to_value(&update).unwrap(),
      json!({"status": "approved", "notes": "Room 4"})
    );
  }
}
