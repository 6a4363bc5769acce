use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{check_paging, timestamp, Priority};
use crate::types::OrderDirection;
use crate::validation::{FieldError, Validate, Validator};

pub const COLLECTION: &str = "qna";

string_enum! {
  Category {
    AcademicStress => "academic-stress",
    SocialEmotional => "social-emotional",
    Wellness => "wellness",
    CareerGuidance => "career-guidance",
    Relationships => "relationships",
    MentalHealth => "mental-health",
    General => "general",
  }
}

string_enum! {
  QuestionStatus {
    Pending => "pending",
    Answered => "answered",
    Flagged => "flagged",
    Archived => "archived",
  }
}

string_enum! {
  QuestionSort {
    CreatedAt => "createdAt",
    UpdatedAt => "updatedAt",
    Priority => "priority",
    Upvotes => "upvotes",
    Views => "views",
  }
}

string_enum! {
  VoteType {
    Upvote => "upvote",
    Downvote => "downvote",
  }
}

impl VoteType {
  /// Counter field the vote increments.
  pub fn field(&self) -> &'static str {
    match self {
      Self::Upvote => "upvotes",
      Self::Downvote => "downvotes",
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewQuestion {
  pub question: String,
  pub category: Category,
  pub priority: Option<Priority>,
  pub is_anonymous: Option<bool>,
  pub tags: Option<Vec<String>>,
}

impl Validate for NewQuestion {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    Validator::new()
      .length("question", &self.question, 10, 1000)
      .items("tags", self.tags.as_deref(), 5, 50)
      .finish()
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub question: String,
  pub category: Category,
  pub priority: Priority,
  pub status: QuestionStatus,
  pub is_anonymous: bool,
  pub student_id: Option<String>,
  pub tags: Vec<String>,
  pub upvotes: u64,
  pub downvotes: u64,
  pub views: u64,
  pub created_at: String,
  pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuestionUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub question: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<Category>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<QuestionStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub response: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tags: Option<Vec<String>>,
}

impl Validate for QuestionUpdate {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    Validator::new()
      .opt_length("question", self.question.as_deref(), 10, 1000)
      .opt_length("response", self.response.as_deref(), 0, 2000)
      .items("tags", self.tags.as_deref(), 5, 50)
      .finish()
  }
}

/// Body of `POST /qna/{id}/answer`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Answer {
  pub response: String,
  #[serde(default = "default_true")]
  pub is_public: bool,
  pub counsellor_notes: Option<String>,
}

fn default_true() -> bool {
  true
}

impl Validate for Answer {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    Validator::new()
      .length("response", &self.response, 10, 2000)
      .opt_length("counsellorNotes", self.counsellor_notes.as_deref(), 0, 500)
      .finish()
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FlagQuestion {
  pub reason: Option<String>,
}

impl Validate for FlagQuestion {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    Validator::new()
      .opt_length("reason", self.reason.as_deref(), 0, 200)
      .finish()
  }
}

/// `voteType` stays a string so an unknown value maps to "Invalid vote type"
/// instead of a generic schema error.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Vote {
  pub vote_type: String,
}

impl Validate for Vote {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    Ok(())
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuestionQuery {
  pub category: Option<Category>,
  pub status: Option<QuestionStatus>,
  pub priority: Option<Priority>,
  pub answered_by: Option<String>,
  #[serde(default, with = "timestamp::option")]
  pub date_from: Option<DateTime<Utc>>,
  #[serde(default, with = "timestamp::option")]
  pub date_to: Option<DateTime<Utc>>,
  pub search: Option<String>,
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub sort_by: Option<QuestionSort>,
  pub sort_order: Option<OrderDirection>,
}

impl Validate for QuestionQuery {
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
  fn test_answer_defaults_to_public() {
    let answer: Answer =
      serde_json::from_value(json!({"response": "Try breaking revision into short blocks."}))
        .unwrap();
    assert!(answer.is_public);
    assert!(answer.validate().is_ok());
  }

  #[test]
  fn test_vote_field_mapping() {
    assert_eq!(VoteType::parse("upvote").map(|v| v.field()), Some("upvotes"));
    assert_eq!(VoteType::parse("downvote").map(|v| v.field()), Some("downvotes"));
    assert!(VoteType::parse("sideways").is_none());
  }

  #[test]
  fn test_category_rejects_unknown() {
    let raw = json!({"question": "How do I manage stress?", "category": "sports"});
    assert!(serde_json::from_value::<NewQuestion>(raw).is_err());
  }
}
