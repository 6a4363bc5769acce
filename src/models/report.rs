use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{check_paging, timestamp, Priority};
use crate::types::OrderDirection;
use crate::validation::{FieldError, Validate, Validator};

pub const COLLECTION: &str = "reports";

string_enum! {
  ReportType {
    Monthly => "monthly",
    Weekly => "weekly",
    Daily => "daily",
    Custom => "custom",
    Appointment => "appointment",
    Journal => "journal",
    Qa => "qa",
    Comprehensive => "comprehensive",
  }
}

string_enum! {
  ReportFormat {
    Pdf => "pdf",
    Excel => "excel",
    Csv => "csv",
    Json => "json",
  }
}

impl Default for ReportFormat {
  fn default() -> Self {
    Self::Pdf
  }
}

string_enum! {
  ReportSort {
    CreatedAt => "createdAt",
    GeneratedAt => "generatedAt",
    Title => "title",
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateRange {
  #[serde(with = "timestamp")]
  pub start: DateTime<Utc>,
  #[serde(with = "timestamp")]
  pub end: DateTime<Utc>,
}

impl DateRange {
  /// Bounds as stored strings, for range filters on `createdAt`.
  pub fn bounds(&self) -> (String, String) {
    (timestamp::format(self.start), timestamp::format(self.end))
  }
}

/// Optional narrowing applied to the section matching the report type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReportFilters {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub counsellor_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub student_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
}

/// Body of `POST /reports/generate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GenerateReport {
  pub title: String,
  #[serde(rename = "type")]
  pub kind: ReportType,
  pub date_range: DateRange,
  #[serde(default)]
  pub filters: ReportFilters,
  #[serde(default)]
  pub format: ReportFormat,
  #[serde(default = "default_true")]
  pub include_charts: bool,
  #[serde(default)]
  pub is_public: bool,
}

fn default_true() -> bool {
  true
}

impl Validate for GenerateReport {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    let mut v = Validator::new();
    v.length("title", &self.title, 5, 200);
    if self.date_range.end < self.date_range.start {
      v.push(
        FieldError::new(
          "dateRange.end",
          "\"dateRange.end\" must be greater than or equal to \"dateRange.start\"",
        )
        .with_value(timestamp::format(self.date_range.end)),
      );
    }
    v.finish()
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReportQuery {
  #[serde(rename = "type")]
  pub kind: Option<ReportType>,
  pub generated_by: Option<String>,
  pub is_public: Option<bool>,
  #[serde(default, with = "timestamp::option")]
  pub date_from: Option<DateTime<Utc>>,
  #[serde(default, with = "timestamp::option")]
  pub date_to: Option<DateTime<Utc>>,
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub sort_by: Option<ReportSort>,
  pub sort_order: Option<OrderDirection>,
}

impl Validate for ReportQuery {
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

  #[test]
  fn test_generate_defaults() {
    let body: GenerateReport = serde_json::from_value(json!({
      "title": "June summary",
      "type": "monthly",
      "dateRange": {"start": "2024-06-01", "end": "2024-06-30"}
    }))
    .unwrap();
    assert_eq!(body.format, ReportFormat::Pdf);
    assert!(body.include_charts);
    assert!(!body.is_public);
    assert!(body.validate().is_ok());
    assert_eq!(
      body.date_range.bounds().0,
      "2024-06-01T00:00:00.000Z".to_string()
    );
  }

  #[test]
  fn test_generate_rejects_inverted_range() {
    let body: GenerateReport = serde_json::from_value(json!({
      "title": "Backwards",
      "type": "custom",
      "dateRange": {"start": "2024-06-30", "end": "2024-06-01"}
    }))
    .unwrap();
    let errors = body.validate().unwrap_err();
    assert_eq!(errors[0].field, "dateRange.end");
  }

  #[test]
  fn test_generate_rejects_unknown_format() {
    let raw = json!({
      "title": "June summary",
      "type": "monthly",
      "format": "docx",
      "dateRange": {"start": "2024-06-01", "end": "2024-06-30"}
    });
    assert!(serde_json::from_value::<GenerateReport>(raw).is_err());
  }
}
