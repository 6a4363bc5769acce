//! Success envelopes.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::models::timestamp;

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
  pub page: u32,
  pub limit: u32,
  pub total: usize,
  pub pages: usize,
  pub has_next: bool,
  pub has_prev: bool,
}

impl Pagination {
  pub fn new(page: Option<u32>, limit: Option<u32>, total: usize) -> Self {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let pages = total.div_ceil(limit as usize);
    Self {
      page,
      limit,
      total,
      pages,
      has_next: (page as usize) < pages,
      has_prev: page > 1,
    }
  }

  pub fn offset(&self) -> usize {
    (self.page as usize - 1) * self.limit as usize
  }
}

/// `200 {success, message, data, timestamp}`
pub fn ok(message: &str, data: impl Serialize) -> Result<Response, super::ApiError> {
  envelope(StatusCode::OK, message, serde_json::to_value(data)?, None)
}

/// Same envelope with `201 Created`.
pub fn created(message: &str, data: impl Serialize) -> Result<Response, super::ApiError> {
  envelope(StatusCode::CREATED, message, serde_json::to_value(data)?, None)
}

pub fn paginated(
  message: &str,
  data: Vec<Value>,
  pagination: Pagination,
) -> Result<Response, super::ApiError> {
  envelope(StatusCode::OK, message, Value::Array(data), Some(pagination))
}

fn envelope(
  status: StatusCode,
  message: &str,
  data: Value,
  pagination: Option<Pagination>,
) -> Result<Response, super::ApiError> {
  let mut body = json!({
    "success": true,
    "message": message,
    "data": data,
    "timestamp": timestamp::now(),
  });
  if let Some(pagination) = pagination {
    body["pagination"] = serde_json::to_value(pagination)?;
  }
  Ok((status, Json(body)).into_response())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_pagination_defaults_and_clamping() {
    let p = Pagination::new(None, None, 25);
    assert_eq!((p.page, p.limit, p.pages), (1, 10, 3));
    assert!(p.has_next);
    assert!(!p.has_prev);

    let p = Pagination::new(Some(0), Some(500), 25);
    assert_eq!((p.page, p.limit, p.pages), (1, 100, 1));

    let p = Pagination::new(Some(3), Some(0), 2);
    assert_eq!(p.limit, 1);
    assert_eq!(p.offset(), 2);
  }

  #[test]
  fn test_pagination_boundaries() {
    let last = Pagination::new(Some(3), Some(10), 25);
    assert!(!last.has_next);
    assert!(last.has_prev);
    assert_eq!(last.offset(), 20);

    let empty = Pagination::new(Some(1), Some(10), 0);
    assert_eq!(empty.pages, 0);
    assert!(!empty.has_next);
    assert!(!empty.has_prev);
  }
}
