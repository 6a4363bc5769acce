use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison applied by a [`FieldFilter`] against a top-level document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
  Eq,
  Gte,
  Lte,
  /// The field is an array holding the value.
  ArrayContains,
}

/// A store-side `where` clause. Range operators compare stored values as text,
/// which is correct for the fixed-width timestamps the API writes.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
  pub field: String,
  pub op: FilterOp,
  pub value: Value,
}

impl FieldFilter {
  pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
    Self {
      field: field.into(),
      op,
      value: value.into(),
    }
  }

  pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
    Self::new(field, FilterOp::Eq, value)
  }

  pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
    Self::new(field, FilterOp::Gte, value)
  }

  pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
    Self::new(field, FilterOp::Lte, value)
  }

  pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
    Self::new(field, FilterOp::ArrayContains, value)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
  #[default]
  Asc,
  Desc,
}
