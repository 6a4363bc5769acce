use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{check_paging, timestamp, Priority};
use crate::types::OrderDirection;
use crate::validation::{FieldError, Validate, Validator};

pub const COLLECTION: &str = "journals";

string_enum! {
  Mood {
    VeryPositive => "very-positive",
    Positive => "positive",
    Neutral => "neutral",
    Negative => "negative",
    VeryNegative => "very-negative",
  }
}

string_enum! {
  JournalStatus {
    Pending => "pending",
    Reviewed => "reviewed",
    Flagged => "flagged",
    Archived => "archived",
  }
}

string_enum! {
  JournalSort {
    CreatedAt => "createdAt",
    UpdatedAt => "updatedAt",
    Priority => "priority",
    Mood => "mood",
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewJournal {
  pub student_id: Option<String>,
  pub student_name: Option<String>,
  pub title: String,
  pub content: String,
  pub mood: Option<Mood>,
  pub tags: Option<Vec<String>>,
  pub priority: Option<Priority>,
}

fn check_tags(v: &mut Validator, tags: Option<&[String]>) {
  v.items("tags", tags, 10, 50);
}

impl Validate for NewJournal {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    let mut v = Validator::new();
    v.opt_length("studentName", self.student_name.as_deref(), 2, 100)
      .length("title", &self.title, 5, 200)
      .length("content", &self.content, 10, 5000);
    check_tags(&mut v, self.tags.as_deref());
    v.finish()
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Journal {
  pub student_id: String,
  pub student_name: String,
  pub title: String,
  pub content: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub mood: Option<Mood>,
  pub tags: Vec<String>,
  pub is_flagged: bool,
  pub priority: Priority,
  pub status: JournalStatus,
  pub created_by: String,
  pub created_at: String,
  pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JournalUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub mood: Option<Mood>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tags: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_flagged: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub flag_reason: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<JournalStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub counsellor_notes: Option<String>,
}

impl Validate for JournalUpdate {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    let mut v = Validator::new();
    v.opt_length("title", self.title.as_deref(), 5, 200)
      .opt_length("content", self.content.as_deref(), 10, 5000)
      .opt_length("flagReason", self.flag_reason.as_deref(), 0, 200)
      .opt_length("counsellorNotes", self.counsellor_notes.as_deref(), 0, 1000);
    check_tags(&mut v, self.tags.as_deref());
    v.finish()
  }
}

/// Body of `PATCH /journals/{id}/flag`; both fields fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FlagJournal {
  pub flag_reason: Option<String>,
  pub priority: Option<Priority>,
}

impl Validate for FlagJournal {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    Validator::new()
      .opt_length("flagReason", self.flag_reason.as_deref(), 0, 200)
      .finish()
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReviewJournal {
  pub counsellor_notes: Option<String>,
  pub status: Option<JournalStatus>,
}

impl Validate for ReviewJournal {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    Validator::new()
      .opt_length("counsellorNotes", self.counsellor_notes.as_deref(), 0, 1000)
      .finish()
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JournalQuery {
  pub student_id: Option<String>,
  pub status: Option<JournalStatus>,
  pub priority: Option<Priority>,
  pub mood: Option<Mood>,
  pub is_flagged: Option<bool>,
  #[serde(default, with = "timestamp::option")]
  pub date_from: Option<DateTime<Utc>>,
  #[serde(default, with = "timestamp::option")]
  pub date_to: Option<DateTime<Utc>>,
  pub search: Option<String>,
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub sort_by: Option<JournalSort>,
  pub sort_order: Option<OrderDirection>,
}

impl Validate for JournalQuery {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    let mut v = Validator::new();
    v.opt_length("search", self.search.as_deref(), 0, 100);
    check_paging(&mut v, self.page, self.limit);
    v.finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_new_journal_tag_limits() {
    let tags: Vec<String> = (0..11).map(|i| format!("tag{}", i)).collect();
    let journal: NewJournal = serde_json::from_value(json!({
      "title": "Week one",
      "content": "Started the new term today.",
      "mood": "very-positive",
      "tags": tags
    }))
    .unwrap();
    let errors = journal.validate().unwrap_err();
    assert_eq!(errors[0].field, "tags");
  }

  #[test]
  fn test_flag_body_may_be_empty() {
    let flag: FlagJournal = serde_json::from_value(json!({})).unwrap();
    assert!(flag.flag_reason.is_none());
    assert!(flag.validate().is_ok());
  }
}
