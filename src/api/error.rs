use axum::{
  http::{header, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;

use crate::models::timestamp;
use crate::storage::UploadError;
use crate::validation::FieldError;

/// Every failure a handler can return. Rendered with the same envelope as
/// successful responses, with `success: false`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  #[error("Validation failed")]
  Validation(Vec<FieldError>),
  #[error("{0}")]
  BadRequest(String),
  #[error("{0}")]
  Unauthorized(String),
  #[error("{0}")]
  Forbidden(String),
  #[error("{0}")]
  NotFound(String),
  #[error("{0}")]
  Conflict(String),
  #[error("{0}")]
  PayloadTooLarge(String),
  #[error("Too many requests, please try again later")]
  RateLimited { retry_after_secs: u64 },
  #[error("Service unavailable")]
  Unavailable,
  /// Details are logged, never sent to the client.
  #[error("Internal server error")]
  Internal(anyhow::Error),
}

impl ApiError {
  pub fn bad_request(msg: impl Into<String>) -> Self {
    Self::BadRequest(msg.into())
  }

  pub fn unauthorized(msg: impl Into<String>) -> Self {
    Self::Unauthorized(msg.into())
  }

  pub fn forbidden(msg: impl Into<String>) -> Self {
    Self::Forbidden(msg.into())
  }

  pub fn not_found(msg: impl Into<String>) -> Self {
    Self::NotFound(msg.into())
  }

  /// 403 used when a caller may not touch a particular document.
  pub fn access_denied() -> Self {
    Self::Forbidden("Access denied".into())
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      Self::Forbidden(_) => StatusCode::FORBIDDEN,
      Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::Conflict(_) => StatusCode::CONFLICT,
      Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
      Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
      Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
      Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<anyhow::Error> for ApiError {
  fn from(e: anyhow::Error) -> Self {
    Self::Internal(e)
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(e: serde_json::Error) -> Self {
    Self::Internal(e.into())
  }
}

impl From<UploadError> for ApiError {
  fn from(e: UploadError) -> Self {
    match e {
      UploadError::TooLarge { .. } => Self::PayloadTooLarge(e.to_string()),
      UploadError::InvalidType(_) | UploadError::InvalidName => Self::BadRequest(e.to_string()),
      UploadError::NotFound => Self::NotFound(e.to_string()),
      UploadError::Io(e) => Self::Internal(e.into()),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let mut body = json!({
      "success": false,
      "message": self.to_string(),
      "timestamp": timestamp::now(),
    });

    match &self {
      Self::Validation(errors) => {
        body["errors"] = json!(errors);
      }
      Self::Internal(e) => {
        tracing::error!(error = ?e, "request failed");
      }
      _ => {}
    }

    let mut response = (status, Json(body)).into_response();
    if let Self::RateLimited { retry_after_secs } = self {
      response
        .headers_mut()
        .insert(header::RETRY_AFTER, retry_after_secs.into());
    }
    response
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_mapping() {
    assert_eq!(
      ApiError::Validation(vec![]).status(),
      StatusCode::BAD_REQUEST
    );
    assert_eq!(ApiError::access_denied().status(), StatusCode::FORBIDDEN);
    assert_eq!(
      ApiError::from(UploadError::TooLarge { limit: 1 }).status(),
      StatusCode::PAYLOAD_TOO_LARGE
    );
    assert_eq!(
      ApiError::from(UploadError::InvalidType("x.exe".into())).status(),
      StatusCode::BAD_REQUEST
    );
  }

  #[test]
  fn test_internal_error_hides_details() {
    let err = ApiError::from(anyhow::anyhow!("connection refused"));
    assert_eq!(err.to_string(), "Internal server error");
  }

  #[test]
  fn test_rate_limited_sets_retry_after() {
    let response = ApiError::RateLimited {
      retry_after_secs: 3,
    }
    .into_response();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "3");
  }
}
