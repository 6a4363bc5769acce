use serde::{Deserialize, Serialize};

use super::check_paging;
use crate::types::OrderDirection;
use crate::validation::{FieldError, Validate, Validator};

pub const COLLECTION: &str = "resources";

/// URL prefix under which uploaded files are served.
pub const UPLOADS_PREFIX: &str = "/uploads/";

string_enum! {
  ResourceCategory {
    Articles => "articles",
    Videos => "videos",
    Tips => "tips",
    Guides => "guides",
    Worksheets => "worksheets",
    Meditation => "meditation",
    Exercises => "exercises",
  }
}

string_enum! {
  ResourceType {
    Pdf => "PDF",
    Video => "Video",
    Article => "Article",
    Link => "Link",
    Audio => "Audio",
    Document => "Document",
  }
}

string_enum! {
  Audience {
    Students => "students",
    Counsellors => "counsellors",
    General => "general",
  }
}

string_enum! {
  Difficulty {
    Beginner => "beginner",
    Intermediate => "intermediate",
    Advanced => "advanced",
  }
}

impl Default for Difficulty {
  fn default() -> Self {
    Self::Beginner
  }
}

string_enum! {
  ResourceSort {
    CreatedAt => "createdAt",
    UpdatedAt => "updatedAt",
    Downloads => "downloads",
    Views => "views",
    Rating => "rating",
    Title => "title",
  }
}

/// Links may point at an upload served by this API or at any absolute URI.
fn check_link(v: &mut Validator, field: &str, value: Option<&str>) {
  if let Some(value) = value {
    if !value.starts_with(UPLOADS_PREFIX) {
      v.uri(field, Some(value));
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewResource {
  pub title: String,
  pub description: String,
  pub category: ResourceCategory,
  #[serde(rename = "type")]
  pub kind: ResourceType,
  pub content: Option<String>,
  pub file_url: Option<String>,
  pub external_url: Option<String>,
  pub thumbnail_url: Option<String>,
  pub tags: Option<Vec<String>>,
  pub target_audience: Option<Vec<Audience>>,
  pub difficulty: Option<Difficulty>,
  pub duration: Option<u32>,
  pub is_public: Option<bool>,
  pub is_featured: Option<bool>,
}

impl Validate for NewResource {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    let mut v = Validator::new();
    v.length("title", &self.title, 5, 200)
      .length("description", &self.description, 10, 1000)
      .opt_length("content", self.content.as_deref(), 0, 10000)
      .uri("externalUrl", self.external_url.as_deref())
      .items("tags", self.tags.as_deref(), 10, 50)
      .opt_range("duration", self.duration, 1, u32::MAX);
    check_link(&mut v, "fileUrl", self.file_url.as_deref());
    check_link(&mut v, "thumbnailUrl", self.thumbnail_url.as_deref());
    v.finish()
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
  pub title: String,
  pub description: String,
  pub category: ResourceCategory,
  #[serde(rename = "type")]
  pub kind: ResourceType,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub file_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub external_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub thumbnail_url: Option<String>,
  pub tags: Vec<String>,
  pub target_audience: Vec<Audience>,
  pub difficulty: Difficulty,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration: Option<u32>,
  pub is_public: bool,
  pub is_featured: bool,
  pub downloads: u64,
  pub views: u64,
  pub rating: f64,
  pub rating_count: u64,
  pub created_by: String,
  pub updated_by: String,
  pub created_at: String,
  pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResourceUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<ResourceCategory>,
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub kind: Option<ResourceType>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub file_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub external_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub thumbnail_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tags: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub target_audience: Option<Vec<Audience>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub difficulty: Option<Difficulty>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_public: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_featured: Option<bool>,
}

impl Validate for ResourceUpdate {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    let mut v = Validator::new();
    v.opt_length("title", self.title.as_deref(), 5, 200)
      .opt_length("description", self.description.as_deref(), 10, 1000)
      .opt_length("content", self.content.as_deref(), 0, 10000)
      .uri("externalUrl", self.external_url.as_deref())
      .items("tags", self.tags.as_deref(), 10, 50)
      .opt_range("duration", self.duration, 1, u32::MAX);
    check_link(&mut v, "fileUrl", self.file_url.as_deref());
    check_link(&mut v, "thumbnailUrl", self.thumbnail_url.as_deref());
    v.finish()
  }
}

/// Body of `POST /resources/{id}/rate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rating {
  pub rating: f64,
}

impl Validate for Rating {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    if !(1.0..=5.0).contains(&self.rating) {
      return Err(vec![FieldError::new(
        "rating",
        "Rating must be between 1 and 5",
      )
      .with_value(self.rating)]);
    }
    Ok(())
  }
}

/// Running average after one more rating, rounded to one decimal.
pub fn next_rating(current: f64, count: u64, rating: f64) -> f64 {
  let total = current * count as f64 + rating;
  let average = total / (count + 1) as f64;
  (average * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResourceQuery {
  pub category: Option<ResourceCategory>,
  #[serde(rename = "type")]
  pub kind: Option<ResourceType>,
  pub target_audience: Option<Audience>,
  pub difficulty: Option<Difficulty>,
  pub is_public: Option<bool>,
  pub is_featured: Option<bool>,
  pub created_by: Option<String>,
  pub search: Option<String>,
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub sort_by: Option<ResourceSort>,
  pub sort_order: Option<OrderDirection>,
}

impl Validate for ResourceQuery {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    let mut v = Validator::new();
    v.opt_length("search", self.search.as_deref(), 0, 100);
    check_paging(&mut v, self.page, self.limit);
    v.finish()
  }
}

/// File name behind an `/uploads/...` link, if the link points at local storage.
pub fn upload_name(file_url: &str) -> Option<&str> {
  file_url
    .strip_prefix(UPLOADS_PREFIX)
    .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_next_rating_running_average() {
    assert_eq!(next_rating(0.0, 0, 4.0), 4.0);
    assert_eq!(next_rating(4.0, 1, 5.0), 4.5);
    assert_eq!(next_rating(4.5, 2, 3.0), 4.0);
    assert_eq!(next_rating(4.0, 2, 5.0), 4.3);
  }

  #[test]
  fn test_rating_bounds() {
    assert!(Rating { rating: 1.0 }.validate().is_ok());
    assert!(Rating { rating: 5.0 }.validate().is_ok());
    assert!(Rating { rating: 0.0 }.validate().is_err());
    assert!(Rating { rating: 6.0 }.validate().is_err());
  }

  #[test]
  fn test_file_url_accepts_upload_paths() {
    let resource: NewResource = serde_json::from_value(json!({
      "title": "Breathing basics",
      "description": "A short guide to box breathing.",
      "category": "guides",
      "type": "PDF",
      "fileUrl": "/uploads/resource_breathing_2024.pdf"
    }))
    .unwrap();
    assert!(resource.validate().is_ok());
    assert_eq!(upload_name("/uploads/x.pdf"), Some("x.pdf"));
    assert_eq!(upload_name("https://cdn.example.com/x.pdf"), None);
    assert_eq!(upload_name("/uploads/"), None);
  }
}
