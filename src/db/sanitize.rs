//! Name checks for anything spliced into SQL text.
//!
//! Values are always bound as parameters; only collection and field names end
//! up inside the statement, so those are restricted to a safe alphabet.

use thiserror::Error;

pub const MAX_NAME_LENGTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameKind {
  /// `appointments`, `qna`: lowercase ASCII, digits, `_`.
  Collection,
  /// Top-level JSON keys such as `isFlagged` or `createdAt`.
  Field,
}

impl NameKind {
  fn allows(self, c: char) -> bool {
    match self {
      Self::Collection => c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_',
      Self::Field => c.is_ascii_alphanumeric() || c == '_',
    }
  }

  fn label(self) -> &'static str {
    match self {
      Self::Collection => "collection",
      Self::Field => "field",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsafe {kind} name {name:?}: {reason}")]
pub struct UnsafeName {
  kind: &'static str,
  name: String,
  reason: &'static str,
}

fn check_name(kind: NameKind, name: &str) -> Result<(), UnsafeName> {
  let reject = |reason| {
    Err(UnsafeName {
      kind: kind.label(),
      name: name.chars().take(MAX_NAME_LENGTH).collect(),
      reason,
    })
  };

  let Some(first) = name.chars().next() else {
    return reject("empty");
  };
  if name.len() > MAX_NAME_LENGTH {
    return reject("too long");
  }
  if !(first.is_ascii_alphabetic() || first == '_') {
    return reject("must start with a letter or underscore");
  }
  if !name.chars().all(|c| kind.allows(c)) {
    return reject("contains a disallowed character");
  }
  if RESERVED.iter().any(|word| word.eq_ignore_ascii_case(name)) {
    return reject("reserved word");
  }
  Ok(())
}

/// Field names used in store filters.
pub fn validate_identifier(name: &str) -> Result<(), UnsafeName> {
  check_name(NameKind::Field, name)
}

pub fn validate_collection_name(name: &str) -> Result<(), UnsafeName> {
  check_name(NameKind::Collection, name)
}

const RESERVED: &[&str] = &[
  "select", "insert", "update", "delete", "drop", "create", "alter", "table", "from", "where",
  "and", "or", "not", "null", "union", "join", "into", "values", "set", "truncate",
];

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_field_names() {
    for ok in ["createdAt", "isFlagged", "rating_count", "_internal"] {
      assert!(validate_identifier(ok).is_ok(), "{}", ok);
    }
    for bad in ["", "9lives", "preferences.theme", "target-audience", "Select"] {
      assert!(validate_identifier(bad).is_err(), "{}", bad);
    }
    assert!(validate_identifier(&"a".repeat(MAX_NAME_LENGTH + 1)).is_err());
  }

  #[test]
  fn test_collection_names() {
    assert!(validate_collection_name("journals").is_ok());
    assert!(validate_collection_name("qna").is_ok());
    assert!(validate_collection_name("Journals").is_err());
    assert!(validate_collection_name("qna;").is_err());
  }

  #[test]
  fn test_injection_shapes_rejected() {
    assert!(validate_identifier("status') OR 1=1 --").is_err());
    assert!(validate_identifier("x\" = \"x").is_err());
    assert!(validate_collection_name("users; DROP TABLE documents").is_err());
  }

  #[test]
  fn test_error_names_the_offender() {
    let err = validate_identifier("is-flagged").unwrap_err();
    assert_eq!(
      err.to_string(),
      "unsafe field name \"is-flagged\": contains a disallowed character"
    );
  }
}
