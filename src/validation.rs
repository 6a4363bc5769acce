//! Field validation for request payloads.
//!
//! Enumerations are enforced by serde; everything else (lengths, ranges,
//! patterns) is collected here so a client sees every problem in one response.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use std::sync::OnceLock;

/// One rejected field, as reported in the `errors` array of a 400 response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
  pub field: String,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub value: Option<Value>,
}

impl FieldError {
  pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      field: field.into(),
      message: message.into(),
      value: None,
    }
  }

  pub fn with_value(mut self, value: impl Into<Value>) -> Self {
    self.value = Some(value.into());
    self
  }
}

pub trait Validate {
  fn validate(&self) -> Result<(), Vec<FieldError>>;
}

fn time_pattern() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^([0-1]?[0-9]|2[0-3]):[0-5][0-9]$").expect("valid regex"))
}

fn email_pattern() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"))
}

pub fn is_valid_email(email: &str) -> bool {
  email_pattern().is_match(email)
}

/// Absolute URI with a scheme and host, e.g. `https://meet.example.com/abc`.
pub fn is_valid_uri(value: &str) -> bool {
  match value.parse::<http::Uri>() {
    Ok(uri) => uri.scheme().is_some() && uri.host().is_some(),
    Err(_) => false,
  }
}

/// Accumulates [`FieldError`]s across checks.
#[derive(Debug, Default)]
pub struct Validator {
  errors: Vec<FieldError>,
}

impl Validator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, error: FieldError) -> &mut Self {
    self.errors.push(error);
    self
  }

  /// Character-count bounds, inclusive.
  pub fn length(&mut self, field: &str, value: &str, min: usize, max: usize) -> &mut Self {
    let len = value.chars().count();
    if len < min {
      self.push(
        FieldError::new(
          field,
          format!("\"{}\" length must be at least {} characters long", field, min),
        )
        .with_value(value),
      );
    } else if len > max {
      self.push(
        FieldError::new(
          field,
          format!(
            "\"{}\" length must be less than or equal to {} characters long",
            field, max
          ),
        )
        .with_value(value),
      );
    }
    self
  }

  pub fn opt_length(
    &mut self,
    field: &str,
    value: Option<&str>,
    min: usize,
    max: usize,
  ) -> &mut Self {
    if let Some(value) = value {
      self.length(field, value, min, max);
    }
    self
  }

  pub fn range<T>(&mut self, field: &str, value: T, min: T, max: T) -> &mut Self
  where
    T: PartialOrd + Display + Copy + Into<Value>,
  {
    if value < min {
      self.push(
        FieldError::new(
          field,
          format!("\"{}\" must be greater than or equal to {}", field, min),
        )
        .with_value(value),
      );
    } else if value > max {
      self.push(
        FieldError::new(
          field,
          format!("\"{}\" must be less than or equal to {}", field, max),
        )
        .with_value(value),
      );
    }
    self
  }

  pub fn opt_range<T>(&mut self, field: &str, value: Option<T>, min: T, max: T) -> &mut Self
  where
    T: PartialOrd + Display + Copy + Into<Value>,
  {
    if let Some(value) = value {
      self.range(field, value, min, max);
    }
    self
  }

  pub fn time_of_day(&mut self, field: &str, value: Option<&str>) -> &mut Self {
    if let Some(value) = value {
      if !time_pattern().is_match(value) {
        self.push(
          FieldError::new(
            field,
            format!(
              "\"{}\" with value \"{}\" fails to match the required pattern",
              field, value
            ),
          )
          .with_value(value),
        );
      }
    }
    self
  }

  pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
    if !is_valid_email(value) {
      self.push(
        FieldError::new(field, format!("\"{}\" must be a valid email", field)).with_value(value),
      );
    }
    self
  }

  pub fn uri(&mut self, field: &str, value: Option<&str>) -> &mut Self {
    if let Some(value) = value {
      if !is_valid_uri(value) {
        self.push(
          FieldError::new(field, format!("\"{}\" must be a valid uri", field)).with_value(value),
        );
      }
    }
    self
  }

  /// List size cap plus a per-item length cap.
  pub fn items(
    &mut self,
    field: &str,
    items: Option<&[String]>,
    max_items: usize,
    max_item_len: usize,
  ) -> &mut Self {
    let Some(items) = items else {
      return self;
    };
    if items.len() > max_items {
      self.push(FieldError::new(
        field,
        format!(
          "\"{}\" must contain less than or equal to {} items",
          field, max_items
        ),
      ));
    }
    for (i, item) in items.iter().enumerate() {
      self.length(&format!("{}[{}]", field, i), item, 0, max_item_len);
    }
    self
  }

  pub fn finish(&mut self) -> Result<(), Vec<FieldError>> {
    if self.errors.is_empty() {
      Ok(())
    } else {
      Err(std::mem::take(&mut self.errors))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_length_bounds() {
    let mut v = Validator::new();
    v.length("title", "abc", 5, 200);
    v.length("name", "Jo", 2, 100);
    let errors = v.finish().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "title");
    assert!(errors[0].message.contains("at least 5"));
  }

  #[test]
  fn test_time_of_day() {
    let mut v = Validator::new();
    v.time_of_day("time", Some("09:30"))
      .time_of_day("time", Some("9:05"))
      .time_of_day("time", Some("23:59"));
    assert!(v.finish().is_ok());

    v.time_of_day("time", Some("24:00"));
    v.time_of_day("time", Some("12:60"));
    assert_eq!(v.finish().unwrap_err().len(), 2);
  }

  #[test]
  fn test_range_and_items() {
    let tags = vec!["a".repeat(51), "ok".to_string()];
    let mut v = Validator::new();
    v.range("duration", 10u32, 15, 120);
    v.items("tags", Some(tags.as_slice()), 10, 50);
    let errors = v.finish().unwrap_err();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[1].field, "tags[0]");
  }

  #[test]
  fn test_email_and_uri() {
    assert!(is_valid_email("counsellor@school.edu"));
    assert!(!is_valid_email("not-an-email"));
    assert!(is_valid_uri("https://meet.example.com/room"));
    assert!(!is_valid_uri("/relative/path"));
    assert!(!is_valid_uri("not a uri"));
  }
}
