//! Request and document schemas for each collection.

/// A closed set of string values with a fixed wire spelling.
macro_rules! string_enum {
  ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    pub enum $name {
      $(#[serde(rename = $text)] $variant),+
    }

    impl $name {
      pub const ALL: &'static [$name] = &[$($name::$variant),+];
      pub const NAMES: &'static [&'static str] = &[$($text),+];

      pub fn as_str(&self) -> &'static str {
        match self {
          $($name::$variant => $text),+
        }
      }

      pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.as_str() == s)
      }
    }

    impl std::fmt::Display for $name {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
      }
    }
  };
}

pub mod appointment;
pub mod journal;
pub mod question;
pub mod report;
pub mod resource;
pub mod timestamp;
pub mod user;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::validation::{FieldError, Validate, Validator};

string_enum! {
  /// Urgency shared by appointments, journals and questions.
  Priority {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
  }
}

impl Default for Priority {
  fn default() -> Self {
    Self::Medium
  }
}

impl Priority {
  /// Ordering used when sorting by priority.
  pub fn rank(s: &str) -> Option<u8> {
    Self::parse(s).map(|p| match p {
      Self::Low => 0,
      Self::Medium => 1,
      Self::High => 2,
      Self::Urgent => 3,
    })
  }
}

string_enum! {
  Role {
    Admin => "admin",
    Counsellor => "counsellor",
    Student => "student",
  }
}

impl Default for Role {
  fn default() -> Self {
    Self::Counsellor
  }
}

impl Role {
  /// Admins and counsellors.
  pub fn is_staff(&self) -> bool {
    matches!(self, Self::Admin | Self::Counsellor)
  }
}

/// Paging bounds shared by every list query.
pub(crate) fn check_paging(v: &mut Validator, page: Option<u32>, limit: Option<u32>) {
  v.opt_range("page", page, 1, u32::MAX);
  v.opt_range("limit", limit, 1, 100);
}

/// `dateFrom`/`dateTo` accepted by the stats endpoints; both optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DateWindow {
  #[serde(default, with = "timestamp::option")]
  pub date_from: Option<DateTime<Utc>>,
  #[serde(default, with = "timestamp::option")]
  pub date_to: Option<DateTime<Utc>>,
}

impl Validate for DateWindow {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    match (self.date_from, self.date_to) {
      (Some(from), Some(to)) if to < from => Err(vec![FieldError::new(
        "dateTo",
        "\"dateTo\" must be greater than or equal to \"dateFrom\"",
      )]),
      _ => Ok(()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_string_enum_round_trip_names() {
    assert_eq!(Priority::NAMES, &["low", "medium", "high", "urgent"]);
    assert_eq!(Priority::parse("urgent"), Some(Priority::Urgent));
    assert_eq!(Priority::parse("URGENT"), None);
    assert_eq!(Role::default(), Role::Counsellor);
  }

  #[test]
  fn test_priority_rank_orders_by_urgency() {
    assert!(Priority::rank("low") < Priority::rank("medium"));
    assert!(Priority::rank("high") < Priority::rank("urgent"));
    assert_eq!(Priority::rank("bogus"), None);
  }

  #[test]
  fn test_staff_roles() {
    assert!(Role::Admin.is_staff());
    assert!(Role::Counsellor.is_staff());
    assert!(!Role::Student.is_staff());
  }
}
