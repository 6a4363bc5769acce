//! Extractors that deserialize and validate in one step.

use axum::{
  body::Bytes,
  extract::{FromRequest, FromRequestParts, Query, Request},
  http::request::Parts,
};
use serde::de::DeserializeOwned;

use super::ApiError;
use crate::validation::{FieldError, Validate};

/// JSON body that has passed [`Validate`]. An empty body is read as `{}` so
/// endpoints whose fields are all optional accept a bare request.
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
  S: Send + Sync,
  T: DeserializeOwned + Validate,
{
  type Rejection = ApiError;

  async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
    let bytes = Bytes::from_request(req, state)
      .await
      .map_err(|e| ApiError::bad_request(e.body_text()))?;
    let value = parse_json::<T>(&bytes)?;
    value.validate().map_err(ApiError::Validation)?;
    Ok(Self(value))
  }
}

/// Query string that has passed [`Validate`].
#[derive(Debug, Clone)]
pub struct ValidQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
  S: Send + Sync,
  T: DeserializeOwned + Validate,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let Query(value) = Query::<T>::try_from_uri(&parts.uri).map_err(|e| {
      ApiError::Validation(vec![FieldError::new("query", e.body_text())])
    })?;
    value.validate().map_err(ApiError::Validation)?;
    Ok(Self(value))
  }
}

pub(crate) fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
  let bytes: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
    b"{}"
  } else {
    bytes
  };
  let mut de = serde_json::Deserializer::from_slice(bytes);
  serde_path_to_error::deserialize(&mut de).map_err(|err| {
    let inner = err.inner();
    if inner.is_syntax() || inner.is_eof() {
      return ApiError::bad_request("Invalid JSON payload");
    }
    let path = err.path().to_string();
    ApiError::Validation(vec![describe(&path, inner)])
  })
}

/// Turns a serde data error into a field error with a readable message.
fn describe(path: &str, err: &serde_json::Error) -> FieldError {
  let raw = err.to_string();
  let message = match raw.find(" at line ") {
    Some(i) => &raw[..i],
    None => raw.as_str(),
  };
  let prefix = if path == "." { "" } else { path };
  let join = |name: &str| {
    if prefix.is_empty() {
      name.to_string()
    } else if prefix == name || prefix.ends_with(&format!(".{}", name)) {
      prefix.to_string()
    } else {
      format!("{}.{}", prefix, name)
    }
  };

  if let Some(name) = backticked(message, "missing field `") {
    let field = join(name);
    return FieldError::new(&field, format!("\"{}\" is required", field));
  }
  if let Some(name) = backticked(message, "unknown field `") {
    let field = join(name);
    return FieldError::new(&field, format!("\"{}\" is not allowed", field));
  }
  let field = if prefix.is_empty() { "body" } else { prefix };
  FieldError::new(field, format!("\"{}\" {}", field, message))
}

fn backticked<'a>(message: &'a str, prefix: &str) -> Option<&'a str> {
  let rest = message.strip_prefix(prefix)?;
  rest.split('`').next()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::Deserialize;

  #[derive(Debug, Deserialize)]
  #[serde(deny_unknown_fields)]
  struct Body {
    title: String,
    #[serde(default)]
    mood: Option<Mood>,
  }

  #[derive(Debug, Deserialize)]
  #[serde(rename_all = "lowercase")]
  enum Mood {
    Calm,
  }

  fn errors(result: Result<Body, ApiError>) -> Vec<FieldError> {
    match result {
      Err(ApiError::Validation(errors)) => errors,
      other => panic!("expected validation error, got {:?}", other),
    }
  }

  #[test]
  fn test_missing_and_unknown_fields() {
    let missing = errors(parse_json(br#"{"mood": "calm"}"#));
    assert_eq!(missing[0].field, "title");
    assert_eq!(missing[0].message, "\"title\" is required");

    let unknown = errors(parse_json(br#"{"title": "x", "isAdmin": true}"#));
    assert_eq!(unknown[0].field, "isAdmin");
    assert_eq!(unknown[0].message, "\"isAdmin\" is not allowed");
  }

  #[test]
  fn test_bad_enum_names_the_field() {
    let bad = errors(parse_json(br#"{"title": "x", "mood": "angry"}"#));
    assert_eq!(bad[0].field, "mood");
    assert!(bad[0].message.contains("unknown variant"));
  }

  #[test]
  fn test_malformed_json_is_bad_request() {
    let result: Result<Body, _> = parse_json(br#"{"title": "#);
    assert!(matches!(result, Err(ApiError::BadRequest(_))));
  }

  #[test]
  fn test_empty_body_reads_as_empty_object() {
    #[derive(Debug, Deserialize)]
    struct AllOptional {
      #[serde(default)]
      reason: Option<String>,
    }
    let parsed: AllOptional = parse_json(b"  ").unwrap();
    assert!(parsed.reason.is_none());
  }
}
